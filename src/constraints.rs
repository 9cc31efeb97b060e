use crate::constants;
use crate::size_limit::SizeLimit;

/// Tunables of the transfer engine: where uploads arrive, how chunks are
/// sized, and how much a client is allowed to send.
///
/// # Examples
///
/// ```
/// use flashdrop::{Constraints, SizeLimit};
///
/// let constraints = Constraints::new()
///     .upload_path("/upload")
///     .allowed_fields(vec!["filename"])
///     .size_limit(SizeLimit::new().whole_stream(2 * 1024 * 1024));
/// # drop(constraints);
/// ```
#[derive(Debug, Clone)]
pub struct Constraints {
    pub(crate) upload_path: String,
    pub(crate) download_prefix: String,
    pub(crate) link_overhead: usize,
    pub(crate) fallback_chunk_size: usize,
    pub(crate) max_header_size: usize,
    pub(crate) size_limit: SizeLimit,
    pub(crate) allowed_fields: Option<Vec<String>>,
    pub(crate) sanitize_file_names: bool,
}

impl Constraints {
    /// Creates a set of constraints with the defaults of the device firmware.
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Request paths starting with `path` are routed to the upload sink.
    pub fn upload_path<P: Into<String>>(mut self, path: P) -> Constraints {
        self.upload_path = path.into();
        self
    }

    /// Prefix of download requests; the file name follows it.
    pub fn download_prefix<P: Into<String>>(mut self, prefix: P) -> Constraints {
        self.download_prefix = prefix.into();
        self
    }

    /// Lower-layer framing bytes subtracted from the link MTU.
    pub fn link_overhead(mut self, bytes: usize) -> Constraints {
        self.link_overhead = bytes;
        self
    }

    /// Chunk size used when the link MTU is unknown or too small. Zero is
    /// bumped to one.
    pub fn fallback_chunk_size(mut self, bytes: usize) -> Constraints {
        self.fallback_chunk_size = bytes.max(1);
        self
    }

    /// Upper bound for one part's header block.
    pub fn max_header_size(mut self, bytes: usize) -> Constraints {
        self.max_header_size = bytes;
        self
    }

    /// Applies size limits on the body and on individual parts.
    pub fn size_limit(mut self, size_limit: SizeLimit) -> Constraints {
        self.size_limit = size_limit;
        self
    }

    /// Only accept parts whose field name is in `allowed_fields`.
    pub fn allowed_fields<N: Into<String>>(mut self, allowed_fields: Vec<N>) -> Constraints {
        let allowed_fields = allowed_fields.into_iter().map(|item| item.into()).collect();
        self.allowed_fields = Some(allowed_fields);
        self
    }

    /// Strip directory components from uploaded file names before they reach
    /// storage. Off by default: names are used verbatim.
    pub fn sanitize_file_names(mut self, enabled: bool) -> Constraints {
        self.sanitize_file_names = enabled;
        self
    }

    pub(crate) fn is_it_allowed(&self, field: Option<&str>) -> bool {
        if let Some(ref allowed_fields) = self.allowed_fields {
            field
                .map(|field| allowed_fields.iter().any(|item| item == field))
                .unwrap_or(false)
        } else {
            true
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            upload_path: constants::DEFAULT_UPLOAD_PATH.to_owned(),
            download_prefix: constants::DEFAULT_DOWNLOAD_PATH.to_owned(),
            link_overhead: constants::DEFAULT_LINK_OVERHEAD,
            fallback_chunk_size: constants::DEFAULT_FALLBACK_CHUNK_SIZE,
            max_header_size: constants::DEFAULT_MAX_HEADER_SIZE,
            size_limit: SizeLimit::default(),
            allowed_fields: None,
            sanitize_file_names: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_fields() {
        let constraints = Constraints::new();
        assert!(constraints.is_it_allowed(None));
        assert!(constraints.is_it_allowed(Some("anything")));

        let constraints = Constraints::new().allowed_fields(vec!["filename"]);
        assert!(constraints.is_it_allowed(Some("filename")));
        assert!(!constraints.is_it_allowed(Some("other")));
        assert!(!constraints.is_it_allowed(None));
    }

    #[test]
    fn test_fallback_is_never_zero() {
        let constraints = Constraints::new().fallback_chunk_size(0);
        assert_eq!(constraints.fallback_chunk_size, 1);
    }
}
