use std::fmt::{self, Debug, Display, Formatter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn field_or_unknown(field_name: &Option<String>) -> &str {
    field_name.as_deref().unwrap_or("<unknown>")
}

/// A set of errors that can occur while decoding a multipart body or moving
/// bytes between storage and the network.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An unknown field is detected when an allow-list is configured via
    /// [`Constraints::allowed_fields`](crate::Constraints::allowed_fields).
    #[error("unknown field received: {}", field_or_unknown(.field_name))]
    UnknownField { field_name: Option<String> },

    /// The body ended before the current part's data was terminated by a
    /// boundary.
    #[error("field '{}' received with incomplete data", field_or_unknown(.field_name))]
    IncompleteFieldData { field_name: Option<String> },

    /// The body ended inside a part's header block.
    #[error("failed to read field complete headers")]
    IncompleteHeaders,

    /// A part's header block grew beyond the configured limit without a
    /// terminating blank line.
    #[error("field headers exceeded the maximum size limit: {limit} bytes")]
    HeadersTooLarge { limit: usize },

    /// Failed to read headers.
    #[error("failed to read headers: {0}")]
    ReadHeaderFailed(#[source] httparse::Error),

    /// Failed to decode the part's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[error("failed to decode field's raw header name: {name:?} {cause}")]
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode the part's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[error("failed to decode field's raw header value: {cause}")]
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// A boundary delimiter was not followed by a line break or the closing
    /// `--` marker.
    #[error("malformed multipart boundary line")]
    MalformedBoundary,

    /// Multipart body is incomplete.
    #[error("incomplete multipart stream")]
    IncompleteStream,

    /// The decoder hit an error earlier and refuses further input.
    #[error("multipart decoder stopped after an earlier error")]
    DecoderStopped,

    /// The incoming part size exceeded the maximum limit.
    #[error(
        "field '{}' exceeded the maximum size limit: {} bytes",
        field_or_unknown(.field_name),
        .limit
    )]
    FieldSizeExceeded { limit: u64, field_name: Option<String> },

    /// The incoming body size exceeded the maximum limit.
    #[error("stream size exceeded the maximum limit: {limit} bytes")]
    StreamSizeExceeded { limit: u64 },

    /// Reading from the body stream failed.
    #[error("stream read failed: {0}")]
    StreamReadFailed(BoxError),

    /// A storage operation (open, read, write, remove, list) failed.
    #[error("storage operation on '{name}' failed: {source}")]
    Storage {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The `Content-Type` header is not `multipart/form-data`.
    #[error("Content-Type is not multipart/form-data")]
    NoMultipart,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[error("Failed to convert Content-Type to `mime::Mime` type: {0}")]
    DecodeContentType(#[source] mime::FromStrError),

    /// No boundary found in `Content-Type` header.
    #[error("multipart boundary not found in Content-Type")]
    NoBoundary,

    /// The boundary contains characters or a length RFC 2046 forbids.
    #[error("multipart boundary is not RFC 2046 compliant")]
    InvalidBoundary,

    /// Failed to render transfer statistics as `JSON`.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    #[error("failed to encode transfer statistics as JSON: {0}")]
    EncodeJson(#[source] serde_json::Error),
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

impl Error {
    pub(crate) fn storage(name: &str, source: std::io::Error) -> Self {
        Error::Storage {
            name: name.to_owned(),
            source,
        }
    }

    /// Whether this error came out of the multipart decoder (as opposed to
    /// storage or configuration).
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::IncompleteFieldData { .. }
                | Error::IncompleteHeaders
                | Error::HeadersTooLarge { .. }
                | Error::ReadHeaderFailed(_)
                | Error::DecodeHeaderName { .. }
                | Error::DecodeHeaderValue { .. }
                | Error::MalformedBoundary
                | Error::IncompleteStream
                | Error::DecoderStopped
                | Error::FieldSizeExceeded { .. }
                | Error::StreamSizeExceeded { .. }
                | Error::UnknownField { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_field_name() {
        let err = Error::FieldSizeExceeded {
            limit: 10,
            field_name: Some("filename".to_owned()),
        };
        assert_eq!(err.to_string(), "field 'filename' exceeded the maximum size limit: 10 bytes");

        let err = Error::UnknownField { field_name: None };
        assert_eq!(err.to_string(), "unknown field received: <unknown>");
    }

    #[test]
    fn test_decode_error_classification() {
        assert!(Error::IncompleteHeaders.is_decode_error());
        assert!(Error::MalformedBoundary.is_decode_error());
        assert!(!Error::NoBoundary.is_decode_error());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!Error::storage("a.txt", io).is_decode_error());
    }

    #[test]
    fn test_storage_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::storage("a.txt", io);

        assert_eq!(err.to_string(), "storage operation on 'a.txt' failed: gone");
        assert_eq!(err.source().map(|cause| cause.to_string()), Some("gone".to_owned()));
        assert!(Error::NoBoundary.source().is_none());
    }
}
