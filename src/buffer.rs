use crate::constants;
use bytes::{Bytes, BytesMut};
use memchr::memmem;

/// Carries partially matched delimiters and header blocks across feed calls.
///
/// Part data never goes through this buffer: bytes that cannot belong to a
/// delimiter are handed straight back to the caller as slices of its input.
/// The only part bytes held back are a trailing prefix of the delimiter, and
/// since the delimiter is known those need no storage, just a length.
#[derive(Debug)]
pub(crate) struct StreamBuffer {
    delimiter: Vec<u8>,
    finder: memmem::Finder<'static>,
    matched: usize,
    headers: BytesMut,
}

impl StreamBuffer {
    pub fn new(boundary: &str) -> Self {
        let delimiter = format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary).into_bytes();
        let finder = memmem::Finder::new(&delimiter).into_owned();

        StreamBuffer {
            delimiter,
            finder,
            // The opening delimiter may sit at the very start of the body
            // without a preceding line break, so pretend one was already seen.
            matched: constants::CRLF.len(),
            headers: BytesMut::new(),
        }
    }

    /// Number of delimiter bytes matched at the tail of earlier input.
    pub fn pending(&self) -> usize {
        self.matched
    }

    /// Scans `data` for the next delimiter.
    ///
    /// Bytes in front of the delimiter are passed to `emit`, in order and
    /// without copying where possible. Returns the count of bytes consumed and
    /// whether the delimiter was completed; the delimiter itself is consumed
    /// but never emitted.
    pub fn read_until_delimiter<F>(&mut self, data: &[u8], mut emit: F) -> crate::Result<(usize, bool)>
    where
        F: FnMut(&[u8]) -> crate::Result<()>,
    {
        let d_len = self.delimiter.len();

        if self.matched > 0 {
            let avail = (d_len - self.matched).min(data.len());

            if data[..avail] == self.delimiter[self.matched..self.matched + avail] {
                self.matched += avail;

                if self.matched == d_len {
                    self.matched = 0;
                    return Ok((avail, true));
                }

                return Ok((avail, false));
            }

            // The held back bytes turned out to be data. The delimiter only
            // contains CR at its first position, so none of its proper
            // suffixes can start a new match.
            let held = self.matched;
            self.matched = 0;
            emit(&self.delimiter[..held])?;
        }

        if let Some(idx) = self.finder.find(data) {
            if idx > 0 {
                emit(&data[..idx])?;
            }
            return Ok((idx + d_len, true));
        }

        let tail_start = data.len().saturating_sub(d_len - 1);
        let split = memchr::memchr_iter(constants::CR, &data[tail_start..])
            .map(|rel| tail_start + rel)
            .find(|&idx| self.delimiter.starts_with(&data[idx..]))
            .unwrap_or(data.len());

        if split > 0 {
            emit(&data[..split])?;
        }
        self.matched = data.len() - split;

        Ok((data.len(), false))
    }

    /// Starts collecting a header block right after a boundary line.
    ///
    /// The boundary line's CRLF is kept in the buffer so that an empty header
    /// block is found by the same `CRLF CRLF` search as a populated one.
    pub fn begin_headers(&mut self) {
        self.headers.clear();
        self.headers.extend_from_slice(constants::CRLF.as_bytes());
    }

    /// Collects header bytes until the blank line closing the block.
    ///
    /// Returns the count of bytes consumed and, once complete, the raw header
    /// block ending in the blank line.
    pub fn read_headers(&mut self, data: &[u8], limit: usize) -> crate::Result<(usize, Option<Bytes>)> {
        let prev = self.headers.len();
        let room = (limit + constants::CRLF_CRLF.len()).saturating_sub(prev);
        let take = data.len().min(room);

        if take == 0 {
            return Err(crate::Error::HeadersTooLarge { limit });
        }

        self.headers.extend_from_slice(&data[..take]);

        let search_from = prev.saturating_sub(constants::CRLF_CRLF.len() - 1);
        match memmem::find(&self.headers[search_from..], constants::CRLF_CRLF.as_bytes()) {
            Some(rel) => {
                let end = search_from + rel + constants::CRLF_CRLF.len();
                self.headers.truncate(end);

                let mut block = self.headers.split();
                let block = block.split_off(constants::CRLF.len()).freeze();

                Ok((end - prev, Some(block)))
            }
            None if take < data.len() => Err(crate::Error::HeadersTooLarge { limit }),
            None => Ok((take, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(buf: &mut StreamBuffer, data: &[u8], out: &mut Vec<u8>) -> (usize, bool) {
        buf.read_until_delimiter(data, |bytes| {
            out.extend_from_slice(bytes);
            Ok(())
        })
        .unwrap()
    }

    fn in_body(boundary: &str) -> StreamBuffer {
        let mut buf = StreamBuffer::new(boundary);
        buf.matched = 0;
        buf
    }

    #[test]
    fn test_opening_delimiter_without_leading_crlf() {
        let mut buf = StreamBuffer::new("XYZ");
        let mut out = Vec::new();
        assert_eq!(scan(&mut buf, b"--XYZ\r\n", &mut out), (5, true));
        assert!(out.is_empty());
    }

    #[test]
    fn test_preamble_before_delimiter() {
        let mut buf = StreamBuffer::new("XYZ");
        let mut out = Vec::new();
        assert_eq!(scan(&mut buf, b"junk\r\n--XYZ\r\n", &mut out), (11, true));
        assert_eq!(out, b"\r\njunk");
    }

    #[test]
    fn test_delimiter_found_in_one_slice() {
        let mut buf = in_body("XYZ");
        let mut out = Vec::new();
        assert_eq!(scan(&mut buf, b"hello\r\n--XYZ--", &mut out), (12, true));
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_delimiter_split_across_slices() {
        let mut buf = in_body("XYZ");
        let mut out = Vec::new();

        assert_eq!(scan(&mut buf, b"hello\r\n-", &mut out), (8, false));
        assert_eq!(out, b"hello");
        assert_eq!(buf.pending(), 3);

        assert_eq!(scan(&mut buf, b"-X", &mut out), (2, false));
        assert_eq!(out, b"hello");

        assert_eq!(scan(&mut buf, b"YZ\r\n", &mut out), (2, true));
        assert_eq!(out, b"hello");
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_false_partial_match_is_released() {
        let mut buf = in_body("XYZ");
        let mut out = Vec::new();

        assert_eq!(scan(&mut buf, b"ab\r\n--X", &mut out), (7, false));
        assert_eq!(out, b"ab");

        assert_eq!(scan(&mut buf, b"Q\r", &mut out), (2, false));
        assert_eq!(out, b"ab\r\n--XQ");
        assert_eq!(buf.pending(), 1);

        assert_eq!(scan(&mut buf, b"\rz", &mut out), (2, false));
        assert_eq!(out, b"ab\r\n--XQ\r\rz");
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_bare_cr_inside_data() {
        let mut buf = in_body("XYZ");
        let mut out = Vec::new();
        assert_eq!(scan(&mut buf, b"a\rb\r\nc\r\n--XYW", &mut out), (13, false));
        assert_eq!(out, b"a\rb\r\nc\r\n--XYW");
    }

    #[test]
    fn test_headers_split_across_slices() {
        let mut buf = in_body("XYZ");
        buf.begin_headers();

        assert_eq!(buf.read_headers(b"Content-Type: text/plain\r", 64).unwrap(), (25, None));
        assert_eq!(buf.read_headers(b"\n\r", 64).unwrap(), (2, None));

        let (consumed, block) = buf.read_headers(b"\nbody", 64).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(&block.unwrap()[..], b"Content-Type: text/plain\r\n\r\n");
    }

    #[test]
    fn test_empty_header_block() {
        let mut buf = in_body("XYZ");
        buf.begin_headers();

        let (consumed, block) = buf.read_headers(b"\r\nbody", 64).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(&block.unwrap()[..], b"\r\n");
    }

    #[test]
    fn test_headers_too_large() {
        let mut buf = in_body("XYZ");
        buf.begin_headers();

        let err = buf.read_headers(&[b'a'; 64], 16).unwrap_err();
        assert_eq!(err, crate::Error::HeadersTooLarge { limit: 16 });
    }
}
