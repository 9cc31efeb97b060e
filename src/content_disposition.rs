use crate::constants;
use encoding_rs::{Encoding, UTF_8};
use http::header::{self, HeaderMap};
use regex::bytes::{Captures, Regex};

pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    pub fn parse(headers: &HeaderMap) -> ContentDisposition {
        let content_disposition = headers.get(header::CONTENT_DISPOSITION).map(|val| val.as_bytes());

        let field_name =
            content_disposition.and_then(|val| capture_param(&constants::CONTENT_DISPOSITION_FIELD_NAME_RE, val));

        let file_name = content_disposition
            .and_then(decode_ext_value)
            .or_else(|| content_disposition.and_then(|val| capture_param(&constants::CONTENT_DISPOSITION_FILE_NAME_RE, val)));

        ContentDisposition { field_name, file_name }
    }
}

fn capture_param(re: &Regex, val: &[u8]) -> Option<String> {
    let cap = re.captures(val)?;

    if let Some(quoted) = cap.get(1) {
        let unescaped = constants::QUOTED_PAIR_RE.replace_all(quoted.as_bytes(), &b"$1"[..]);
        Some(decode_utf8(&unescaped))
    } else {
        cap.get(2).map(|token| decode_utf8(token.as_bytes()))
    }
}

// Browsers send raw UTF-8 in quoted strings even though the header grammar is
// ASCII, so the bytes are decoded rather than run through `to_str`.
fn decode_utf8(raw: &[u8]) -> String {
    let (text, _) = UTF_8.decode_without_bom_handling(raw);
    text.into_owned()
}

/// Decodes an RFC 5987 `filename*=charset'language'pct-encoded` parameter.
fn decode_ext_value(val: &[u8]) -> Option<String> {
    let cap = constants::CONTENT_DISPOSITION_EXT_FILE_NAME_RE.captures(val)?;
    let encoding = Encoding::for_label(cap.get(1)?.as_bytes())?;

    let bytes = constants::PERCENT_ENCODED_RE.replace_all(cap.get(3)?.as_bytes(), |hex: &Captures<'_>| {
        let byte = std::str::from_utf8(&hex[1])
            .ok()
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .unwrap_or(b'%');
        vec![byte]
    });

    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn parse(value: &[u8]) -> ContentDisposition {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_bytes(value).unwrap());
        ContentDisposition::parse(&headers)
    }

    #[test]
    fn test_content_disposition_field_name() {
        let cd = parse(br#"form-data; name="my_field""#);
        assert_eq!(cd.field_name.as_deref(), Some("my_field"));
        assert_eq!(cd.file_name, None);

        let cd = parse(br#"form-data; name="my field"; filename="file abc.txt""#);
        assert_eq!(cd.field_name.as_deref(), Some("my field"));
        assert_eq!(cd.file_name.as_deref(), Some("file abc.txt"));

        let cd = parse("form-data; name=\"কখগ\"; filename=\"你好.txt\"".as_bytes());
        assert_eq!(cd.field_name.as_deref(), Some("কখগ"));
        assert_eq!(cd.file_name.as_deref(), Some("你好.txt"));
    }

    #[test]
    fn test_content_disposition_file_name_only() {
        let cd = parse(br#"form-data; filename="file-name.txt""#);
        assert_eq!(cd.field_name, None);
        assert_eq!(cd.file_name.as_deref(), Some("file-name.txt"));
    }

    #[test]
    fn test_filename_is_not_mistaken_for_name() {
        let cd = parse(br#"form-data; filename="a.txt"; name="upload""#);
        assert_eq!(cd.field_name.as_deref(), Some("upload"));
        assert_eq!(cd.file_name.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_unquoted_and_escaped_values() {
        let cd = parse(b"form-data; name=plain ; filename=\"we\\\"ird;name.txt\"");
        assert_eq!(cd.field_name.as_deref(), Some("plain"));
        assert_eq!(cd.file_name.as_deref(), Some("we\"ird;name.txt"));
    }

    #[test]
    fn test_ext_file_name_wins() {
        let cd = parse(b"form-data; name=\"f\"; filename=\"fallback.txt\"; filename*=UTF-8''%E2%82%AC%20rates.txt");
        assert_eq!(cd.file_name.as_deref(), Some("\u{20ac} rates.txt"));

        let cd = parse(b"form-data; filename*=iso-8859-1'en'caf%E9.txt");
        assert_eq!(cd.file_name.as_deref(), Some("caf\u{e9}.txt"));

        let cd = parse(b"form-data; filename=\"ok.txt\"; filename*=bogus''x");
        assert_eq!(cd.file_name.as_deref(), Some("ok.txt"));
    }

    #[test]
    fn test_empty_filename_is_present() {
        let cd = parse(br#"form-data; name="filename"; filename="""#);
        assert_eq!(cd.file_name.as_deref(), Some(""));
    }
}
