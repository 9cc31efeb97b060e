use lazy_static::lazy_static;
use regex::bytes::Regex;

pub(crate) const DEFAULT_WHOLE_STREAM_SIZE_LIMIT: u64 = u64::MAX;
pub(crate) const DEFAULT_PER_FIELD_SIZE_LIMIT: u64 = u64::MAX;

pub(crate) const DEFAULT_UPLOAD_PATH: &str = "/handleupload";
pub(crate) const DEFAULT_DOWNLOAD_PATH: &str = "/downloadhandler~/";

/// Ethernet (14) + IPv4 (20) + TCP with timestamps (32) header bytes.
pub(crate) const DEFAULT_LINK_OVERHEAD: usize = 66;
pub(crate) const DEFAULT_FALLBACK_CHUNK_SIZE: usize = 128;
pub(crate) const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

/// Characters permitted in a boundary by RFC 2046, besides alphanumerics.
pub(crate) const BOUNDARY_SPECIALS: &[u8] = b"'()+_,-./:=? ";
pub(crate) const MAX_BOUNDARY_LEN: usize = 70;

// Parameters must follow a `;` so that `name` never matches inside `filename`.
// Group 1 is a quoted value, group 2 a bare token.
lazy_static! {
    pub(crate) static ref CONTENT_DISPOSITION_FIELD_NAME_RE: Regex =
        Regex::new(r#"(?i-u)(?:^|;)\s*name\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]*))"#).unwrap();
    pub(crate) static ref CONTENT_DISPOSITION_FILE_NAME_RE: Regex =
        Regex::new(r#"(?i-u)(?:^|;)\s*filename\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]*))"#).unwrap();
    pub(crate) static ref CONTENT_DISPOSITION_EXT_FILE_NAME_RE: Regex =
        Regex::new(r#"(?i-u)(?:^|;)\s*filename\*\s*=\s*"?([^'";\s]*)'([^'";\s]*)'([^";\s]*)"#).unwrap();
    pub(crate) static ref QUOTED_PAIR_RE: Regex = Regex::new(r#"(?-u)\\(.)"#).unwrap();
    pub(crate) static ref PERCENT_ENCODED_RE: Regex = Regex::new(r#"(?-u)%([0-9A-Fa-f]{2})"#).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_crlf_is_two_crlf() {
        assert_eq!(CRLF_CRLF, format!("{}{}", CRLF, CRLF));
        assert_eq!(CRLF.as_bytes(), &[CR, LF]);
    }

    #[test]
    fn test_field_name_re_skips_filename() {
        let val = br#"form-data; filename="a.txt"; name="upload""#;
        let cap = CONTENT_DISPOSITION_FIELD_NAME_RE.captures(val).unwrap();
        assert_eq!(cap.get(1).unwrap().as_bytes(), b"upload");

        let val = b"form-data; name=plain ; filename=x";
        let cap = CONTENT_DISPOSITION_FIELD_NAME_RE.captures(val).unwrap();
        assert!(cap.get(1).is_none());
        assert_eq!(cap.get(2).unwrap().as_bytes(), b"plain");
    }

    #[test]
    fn test_file_name_re_ignores_ext_parameter() {
        let val = b"form-data; filename*=UTF-8''a%20b.txt";
        assert!(CONTENT_DISPOSITION_FILE_NAME_RE.captures(val).is_none());

        let cap = CONTENT_DISPOSITION_EXT_FILE_NAME_RE.captures(val).unwrap();
        assert_eq!(cap.get(1).unwrap().as_bytes(), b"UTF-8");
        assert_eq!(cap.get(2).unwrap().as_bytes(), b"");
        assert_eq!(cap.get(3).unwrap().as_bytes(), b"a%20b.txt");
    }
}
