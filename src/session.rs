//! Per-request routing and the transfer engine tying decoder, sink and pump
//! together.

use crate::chunk::{self, Link};
use crate::constraints::Constraints;
use crate::decoder::Decoder;
use crate::helpers;
use crate::pump::{self, Transfer};
use crate::sink::{PartReport, RoutingMode, UploadSink};
use crate::storage::{Entry, Storage};
use http::header::{self, HeaderValue};
use http::Response;
use std::io::Write;
use std::time::{Duration, Instant};

/// State of one in-flight upload: the decoder of its body and the sink its
/// parts are written to.
///
/// Dropping a session closes any file it still holds open.
#[derive(Debug)]
pub struct TransferSession<W> {
    decoder: Decoder,
    sink: UploadSink<W>,
    started: Instant,
}

impl<W: Write> TransferSession<W> {
    /// Starts an upload of a body delimited by `boundary`.
    pub fn new<B: Into<String>>(boundary: B, constraints: Constraints) -> crate::Result<Self> {
        let sanitize = constraints.sanitize_file_names;
        let decoder = Decoder::with_constraints(boundary, constraints)?;

        Ok(TransferSession {
            decoder,
            sink: UploadSink::new(RoutingMode::AcceptingUpload).with_sanitized_names(sanitize),
            started: Instant::now(),
        })
    }

    pub fn boundary(&self) -> &str {
        self.decoder.boundary()
    }

    pub fn mode(&self) -> RoutingMode {
        self.sink.mode()
    }

    /// `true` once the closing boundary was decoded.
    pub fn is_complete(&self) -> bool {
        self.decoder.is_complete()
    }

    /// Decodes one chunk of the body, writing part payloads through
    /// `storage`. A decode error abandons the session.
    pub fn on_body_chunk<S>(&mut self, storage: &S, data: &[u8]) -> crate::Result<()>
    where
        S: Storage<Writer = W>,
    {
        let result = self.decoder.feed_all(data, &mut self.sink.attach(storage));
        if result.is_err() {
            self.sink.abandon();
        }
        result
    }

    /// Signals the end of the body. Fails, and abandons the session, if the
    /// closing boundary was never seen.
    pub fn finish(&mut self) -> crate::Result<()> {
        let result = self.decoder.finish();
        if result.is_err() {
            self.sink.abandon();
        }
        result
    }

    /// Closes an open part, reporting it as incomplete.
    pub fn abandon(&mut self) {
        self.sink.abandon();
    }

    pub fn into_summary(mut self) -> UploadSummary {
        self.sink.abandon();

        UploadSummary {
            complete: self.decoder.is_complete(),
            bytes: self.decoder.bytes_consumed(),
            elapsed: self.started.elapsed(),
            parts: self.sink.into_reports(),
        }
    }
}

/// What one upload request stored.
#[derive(Debug)]
pub struct UploadSummary {
    complete: bool,
    bytes: u64,
    elapsed: Duration,
    parts: Vec<PartReport>,
}

impl UploadSummary {
    /// `true` if the closing boundary was decoded.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Body bytes consumed, boundaries and headers included.
    pub fn body_bytes(&self) -> u64 {
        self.bytes
    }

    /// Payload bytes written to storage across all parts.
    pub fn stored_bytes(&self) -> u64 {
        self.parts.iter().map(PartReport::bytes).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn parts(&self) -> &[PartReport] {
        &self.parts
    }
}

/// Size and duration of one finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransferSample {
    pub bytes: u64,
    pub millis: u64,
    pub bytes_per_second: u64,
}

impl TransferSample {
    fn new(bytes: u64, elapsed: Duration) -> Self {
        let millis = elapsed.as_millis() as u64;

        TransferSample {
            bytes,
            millis,
            bytes_per_second: bytes.saturating_mul(1000) / millis.max(1),
        }
    }
}

/// The most recent upload and download, as shown on the status page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransferStats {
    pub last_upload: Option<TransferSample>,
    pub last_download: Option<TransferSample>,
}

impl TransferStats {
    /// Renders the statistics as a `JSON` object.
    #[cfg(feature = "json")]
    #[cfg_attr(nightly, doc(cfg(feature = "json")))]
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(crate::Error::EncodeJson)
    }
}

/// The transfer engine of one device: its storage, its configuration, and the
/// upload currently being received, if any.
///
/// The HTTP layer reports each request's headers through
/// [`on_request_headers_complete`](TransferEngine::on_request_headers_complete)
/// before handing over any body bytes, so the routing decision is always made
/// before decoding starts.
///
/// # Examples
///
/// ```
/// use flashdrop::{MemStorage, RoutingMode, TransferEngine};
///
/// # fn run() -> flashdrop::Result<()> {
/// let mut engine = TransferEngine::new(MemStorage::new());
///
/// let mode = engine.on_request_headers_complete("/handleupload", Some("multipart/form-data; boundary=XYZ"))?;
/// assert_eq!(mode, RoutingMode::AcceptingUpload);
///
/// let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nhello\r\n--XYZ--\r\n";
/// for chunk in body.chunks(64) {
///     engine.on_body_chunk(chunk)?;
/// }
/// engine.on_request_complete()?;
///
/// let mut socket: Vec<u8> = Vec::new();
/// let transfer = engine.download("a.txt", &mut socket, &Some(1500usize))?;
/// assert_eq!(transfer.bytes(), 5);
/// assert_eq!(socket, b"hello");
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
pub struct TransferEngine<S: Storage> {
    storage: S,
    constraints: Constraints,
    session: Option<TransferSession<S::Writer>>,
    last_upload: Option<UploadSummary>,
    stats: TransferStats,
}

impl<S: Storage> TransferEngine<S> {
    pub fn new(storage: S) -> Self {
        TransferEngine::with_constraints(storage, Constraints::default())
    }

    pub fn with_constraints(storage: S, constraints: Constraints) -> Self {
        TransferEngine {
            storage,
            constraints,
            session: None,
            last_upload: None,
            stats: TransferStats::default(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Where body bytes of the current request go.
    pub fn mode(&self) -> RoutingMode {
        self.session
            .as_ref()
            .map(TransferSession::mode)
            .unwrap_or(RoutingMode::Idle)
    }

    /// The session of the upload being received, if any.
    pub fn session(&self) -> Option<&TransferSession<S::Writer>> {
        self.session.as_ref()
    }

    /// Summary of the most recently ended upload.
    pub fn last_upload(&self) -> Option<&UploadSummary> {
        self.last_upload.as_ref()
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Routes a new request. Any upload still in progress is abandoned first.
    ///
    /// Requests under the upload path switch to
    /// [`RoutingMode::AcceptingUpload`] when their body is multipart with a
    /// usable boundary; anything else leaves the engine idle. An upload
    /// request whose content type is missing or unusable is an error and
    /// leaves the engine idle as well.
    pub fn on_request_headers_complete(&mut self, path: &str, content_type: Option<&str>) -> crate::Result<RoutingMode> {
        self.abandon();

        if !path.starts_with(self.constraints.upload_path.as_str()) {
            trace!("{} is not an upload, staying idle", path);
            return Ok(RoutingMode::Idle);
        }

        let boundary = crate::parse_boundary(content_type.ok_or(crate::Error::NoMultipart)?)?;
        let session = TransferSession::new(boundary, self.constraints.clone())?;

        debug!("accepting upload on {} with boundary {:?}", path, session.boundary());
        self.session = Some(session);

        Ok(RoutingMode::AcceptingUpload)
    }

    /// Feeds one chunk of the current request's body. Ignored while idle.
    ///
    /// On a decode error the upload is abandoned and the error returned; the
    /// rest of the body is then ignored.
    pub fn on_body_chunk(&mut self, data: &[u8]) -> crate::Result<()> {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Ok(()),
        };

        let result = session.on_body_chunk(&self.storage, data);
        let ended = result.is_err() || session.is_complete();

        if ended {
            self.close_session();
        }
        result
    }

    /// Signals the end of the current request's body.
    ///
    /// Fails if an upload was in progress and its body ended before the
    /// closing boundary.
    pub fn on_request_complete(&mut self) -> crate::Result<()> {
        let result = match self.session.as_mut() {
            Some(session) => session.finish(),
            None => return Ok(()),
        };

        self.close_session();
        result
    }

    /// Drops the upload in progress, closing its open file.
    pub fn abandon(&mut self) {
        if let Some(session) = self.session.as_mut() {
            warn!("abandoning upload with boundary {:?}", session.boundary());
            session.abandon();
            self.close_session();
        }
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            let summary = session.into_summary();
            debug!(
                "upload ended: complete={} parts={} stored={} bytes",
                summary.is_complete(),
                summary.parts().len(),
                summary.stored_bytes()
            );

            self.stats.last_upload = Some(TransferSample::new(summary.stored_bytes(), summary.elapsed()));
            self.last_upload = Some(summary);
        }
    }

    /// Extracts the requested file name from a download path, e.g.
    /// `/downloadhandler~/a.txt` yields `a.txt`. Only the last path segment
    /// is kept and a query string is ignored.
    pub fn download_target<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.constraints.download_prefix.as_str())?;
        let rest = match rest.find('?') {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        let name = helpers::strip_directories(rest);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Streams the stored file `name` into `socket` in chunks sized for
    /// `link`.
    ///
    /// Failing to open the file is an error; a failure while streaming is
    /// reported in the returned [`Transfer`].
    pub fn download<W, L>(&mut self, name: &str, socket: &mut W, link: &L) -> crate::Result<Transfer>
    where
        W: Write + ?Sized,
        L: Link + ?Sized,
    {
        let (mut file, size) = self
            .storage
            .open(name)
            .map_err(|err| crate::Error::storage(name, err))?;

        let chunk_size = chunk::compute_chunk_size(
            link.mtu(),
            self.constraints.link_overhead,
            self.constraints.fallback_chunk_size,
        );
        debug!("sending {:?} ({} bytes) in chunks of {}", name, size, chunk_size);

        let transfer = pump::stream_file(&mut file, socket, chunk_size, Some(size));
        self.stats.last_download = Some(TransferSample::new(transfer.bytes(), transfer.elapsed()));

        Ok(transfer)
    }

    /// Lists the stored files.
    pub fn list(&self) -> crate::Result<Vec<Entry>> {
        self.storage.list().map_err(|err| crate::Error::storage("/", err))
    }

    /// Deletes the stored file `name`.
    pub fn remove(&self, name: &str) -> crate::Result<()> {
        self.storage.remove(name).map_err(|err| crate::Error::storage(name, err))?;
        debug!("removed {:?}", name);
        Ok(())
    }
}

/// Builds the response head of a download of `name`, `size` bytes long.
///
/// Quotes and backslashes in the name are escaped and control characters are
/// replaced by `_`.
pub fn download_response(name: &str, size: u64) -> crate::Result<Response<()>> {
    let mut quoted = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            ch if ch.is_control() => quoted.push('_'),
            ch => quoted.push(ch),
        }
    }

    let disposition = format!("attachment; filename=\"{}\"", quoted);
    let disposition = HeaderValue::from_bytes(disposition.as_bytes()).map_err(|err| crate::Error::DecodeHeaderValue {
        value: disposition.clone().into_bytes(),
        cause: err.into(),
    })?;

    let mut response = Response::new(());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use crate::{Error, SizeLimit};

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=XYZ";
    const BODY: &[u8] = b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--XYZ--\r\n";

    fn upload(engine: &mut TransferEngine<MemStorage>, body: &[u8], chunk: usize) -> crate::Result<()> {
        engine.on_request_headers_complete("/handleupload", Some(CONTENT_TYPE))?;
        for piece in body.chunks(chunk) {
            engine.on_body_chunk(piece)?;
        }
        engine.on_request_complete()
    }

    #[test]
    fn test_upload_routes_and_stores() {
        let mut engine = TransferEngine::new(MemStorage::new());
        assert_eq!(engine.mode(), RoutingMode::Idle);

        upload(&mut engine, BODY, 64).unwrap();

        assert_eq!(engine.mode(), RoutingMode::Idle);
        assert_eq!(engine.storage().contents("a.txt").unwrap(), b"hello");

        let summary = engine.last_upload().unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.stored_bytes(), 5);
        assert_eq!(summary.body_bytes(), BODY.len() as u64);
        assert_eq!(summary.parts().len(), 1);
        assert_eq!(engine.stats().last_upload.unwrap().bytes, 5);
    }

    #[test]
    fn test_mode_is_set_before_body() {
        let mut engine = TransferEngine::new(MemStorage::new());
        let mode = engine
            .on_request_headers_complete("/handleupload?x=1", Some(CONTENT_TYPE))
            .unwrap();

        assert_eq!(mode, RoutingMode::AcceptingUpload);
        assert_eq!(engine.mode(), RoutingMode::AcceptingUpload);
        assert_eq!(engine.session().unwrap().boundary(), "XYZ");
    }

    #[test]
    fn test_other_paths_stay_idle() {
        let mut engine = TransferEngine::new(MemStorage::new());

        let mode = engine.on_request_headers_complete("/index.html", Some(CONTENT_TYPE)).unwrap();
        assert_eq!(mode, RoutingMode::Idle);

        engine.on_body_chunk(BODY).unwrap();
        engine.on_request_complete().unwrap();
        assert!(engine.storage().list().unwrap().is_empty());
        assert!(engine.last_upload().is_none());
    }

    #[test]
    fn test_upload_without_multipart_content_type() {
        let mut engine = TransferEngine::new(MemStorage::new());

        let err = engine.on_request_headers_complete("/handleupload", None).unwrap_err();
        assert_eq!(err, Error::NoMultipart);
        assert_eq!(engine.mode(), RoutingMode::Idle);

        let err = engine
            .on_request_headers_complete("/handleupload", Some("text/plain"))
            .unwrap_err();
        assert_eq!(err, Error::NoMultipart);

        let err = engine
            .on_request_headers_complete("/handleupload", Some("multipart/form-data"))
            .unwrap_err();
        assert_eq!(err, Error::NoBoundary);
        assert_eq!(engine.mode(), RoutingMode::Idle);
    }

    #[test]
    fn test_new_request_abandons_upload() {
        let mut engine = TransferEngine::new(MemStorage::new());
        engine.on_request_headers_complete("/handleupload", Some(CONTENT_TYPE)).unwrap();

        let cut = BODY.windows(5).position(|w| w == b"hello").unwrap() + 2;
        engine.on_body_chunk(&BODY[..cut]).unwrap();
        assert_eq!(engine.mode(), RoutingMode::AcceptingUpload);

        engine.on_request_headers_complete("/", None).unwrap();

        assert_eq!(engine.mode(), RoutingMode::Idle);
        assert_eq!(engine.storage().contents("a.txt").unwrap(), b"he");

        let summary = engine.last_upload().unwrap();
        assert!(!summary.is_complete());
        assert!(!summary.parts()[0].is_complete());
    }

    #[test]
    fn test_truncated_body_fails_on_complete() {
        let mut engine = TransferEngine::new(MemStorage::new());

        let err = upload(&mut engine, &BODY[..BODY.len() - 12], 16).unwrap_err();

        assert_eq!(err, Error::IncompleteFieldData { field_name: Some("file".to_owned()) });
        assert_eq!(engine.mode(), RoutingMode::Idle);
        assert!(!engine.last_upload().unwrap().is_complete());
    }

    #[test]
    fn test_decode_error_abandons_upload() {
        let constraints = Constraints::new().size_limit(SizeLimit::new().per_field(3));
        let mut engine = TransferEngine::with_constraints(MemStorage::new(), constraints);

        let err = upload(&mut engine, BODY, 8).unwrap_err();

        assert!(err.is_decode_error());
        assert_eq!(engine.mode(), RoutingMode::Idle);
        assert!(!engine.last_upload().unwrap().is_complete());
    }

    #[test]
    fn test_epilogue_after_message_end_is_ignored() {
        let mut engine = TransferEngine::new(MemStorage::new());
        let mut body = BODY.to_vec();
        body.extend_from_slice(b"trailing garbage");

        upload(&mut engine, &body, 7).unwrap();

        assert!(engine.last_upload().unwrap().is_complete());
        assert_eq!(engine.storage().contents("a.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_download_round_trip() {
        let mut engine = TransferEngine::new(MemStorage::new());
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        engine.storage().insert("big.bin", data.clone());

        let mut socket = Vec::new();
        let transfer = engine.download("big.bin", &mut socket, &Some(1500usize)).unwrap();

        assert!(transfer.is_success());
        assert_eq!(transfer.bytes(), 3000);
        // 1434-byte chunks: two full reads and a short one.
        assert_eq!(transfer.reads(), 3);
        assert_eq!(socket, data);
        assert_eq!(engine.stats().last_download.unwrap().bytes, 3000);
    }

    #[test]
    fn test_download_uses_fallback_chunk() {
        let mut engine = TransferEngine::new(MemStorage::new());
        engine.storage().insert("a.txt", vec![7u8; 300]);

        let mut socket: Vec<u8> = Vec::new();
        let transfer = engine.download("a.txt", &mut socket, &None::<usize>).unwrap();

        assert_eq!(transfer.reads(), 3);
        assert_eq!(socket.len(), 300);
    }

    #[test]
    fn test_download_missing_file() {
        let mut engine = TransferEngine::new(MemStorage::new());
        let err = engine.download("nope", &mut Vec::<u8>::new(), &Some(1500usize)).unwrap_err();

        assert!(matches!(err, Error::Storage { ref name, .. } if name == "nope"));
        assert!(engine.stats().last_download.is_none());
    }

    #[test]
    fn test_download_target() {
        let engine = TransferEngine::new(MemStorage::new());

        assert_eq!(engine.download_target("/downloadhandler~/a.txt"), Some("a.txt"));
        assert_eq!(engine.download_target("/downloadhandler~/dir/b.bin?x=1"), Some("b.bin"));
        assert_eq!(engine.download_target("/downloadhandler~/"), None);
        assert_eq!(engine.download_target("/elsewhere/a.txt"), None);
    }

    #[test]
    fn test_download_response() {
        let response = download_response("a \"b\".txt", 5).unwrap();
        let headers = response.headers();

        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"a \\\"b\\\".txt\""
        );

        let response = download_response("x\ny", 0).unwrap();
        assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"x_y\"");
    }

    #[test]
    fn test_list_and_remove() {
        let engine = TransferEngine::new(MemStorage::new());
        engine.storage().insert("a.txt", &b"x"[..]);

        assert_eq!(engine.list().unwrap().len(), 1);
        engine.remove("a.txt").unwrap();
        assert!(engine.list().unwrap().is_empty());
        assert!(matches!(engine.remove("a.txt"), Err(Error::Storage { .. })));
    }

    #[test]
    fn test_sample_rate() {
        let sample = TransferSample::new(5000, Duration::from_millis(500));
        assert_eq!(sample.bytes_per_second, 10_000);

        let sample = TransferSample::new(10, Duration::from_millis(0));
        assert_eq!(sample.millis, 0);
        assert_eq!(sample.bytes_per_second, 10_000);
    }
}
