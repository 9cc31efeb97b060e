use crate::content_disposition::ContentDisposition;
use http::header::{self, HeaderMap};

/// One part of a `multipart/form-data` body, as announced by
/// [`Event::PartStarted`](crate::Event::PartStarted).
///
/// The descriptor lives from the moment its header block is decoded until the
/// next part starts or the message ends.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    file_name: Option<String>,
    content_type: Option<mime::Mime>,
    headers: HeaderMap,
    idx: usize,
}

impl Part {
    pub(crate) fn new(headers: HeaderMap, idx: usize, content_disposition: ContentDisposition) -> Self {
        let content_type = Self::sniff_content_type(&headers);

        Part {
            name: content_disposition.field_name.unwrap_or_default(),
            file_name: content_disposition.file_name,
            content_type,
            headers,
            idx,
        }
    }

    // Only the media families the device knows how to store are recognized;
    // anything else leaves the content type unset.
    fn sniff_content_type(headers: &HeaderMap) -> Option<mime::Mime> {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.trim().parse::<mime::Mime>().ok())
            .filter(|mime| {
                let type_ = mime.type_();
                type_ == mime::APPLICATION || type_ == mime::TEXT || type_ == mime::IMAGE
            })
    }

    /// The form field name, empty when the `Content-Disposition` header had
    /// none.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file name from the `Content-Disposition` header, present only for
    /// file parts.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// The part's content type if it is an `application/*`, `text/*` or
    /// `image/*` type; `None` means unset.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.content_type.as_ref()
    }

    /// `true` iff the disposition header carried a file name.
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }

    /// All headers of this part.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Zero-based position of this part within the body.
    pub fn index(&self) -> usize {
        self.idx
    }
}
