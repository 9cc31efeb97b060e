#![cfg_attr(nightly, feature(doc_cfg))]

//! The streaming transfer engine of a small flash-backed HTTP file server.
//!
//! Uploads arrive as `multipart/form-data` bodies in whatever chunks the
//! network delivers them; [`Decoder`] turns them into part events without
//! ever holding a whole part in memory, and [`UploadSink`] writes each part
//! into [`Storage`]. Downloads go the other way through [`stream_file`], one
//! chunk at a time, with the chunk sized to the active link by
//! [`compute_chunk_size`]. [`TransferEngine`] ties both directions to the
//! request lifecycle of the HTTP layer.
//!
//! # Examples
//!
//! ```
//! use flashdrop::{Constraints, MemStorage, RoutingMode, TransferEngine};
//!
//! # fn run() -> flashdrop::Result<()> {
//! let constraints = Constraints::new().upload_path("/upload");
//! let mut engine = TransferEngine::with_constraints(MemStorage::new(), constraints);
//!
//! let content_type = "multipart/form-data; boundary=X-BOUNDARY";
//! let mode = engine.on_request_headers_complete("/upload", Some(content_type))?;
//! assert_eq!(mode, RoutingMode::AcceptingUpload);
//!
//! let body = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\r\nremember the milk\r\n--X-BOUNDARY--\r\n";
//! for byte in body.as_bytes().chunks(1) {
//!     engine.on_body_chunk(byte)?;
//! }
//! engine.on_request_complete()?;
//!
//! assert_eq!(engine.mode(), RoutingMode::Idle);
//! assert_eq!(engine.storage().contents("notes.txt").unwrap(), b"remember the milk");
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Optional features
//!
//! * `log`: emit decoder, storage and pump events through the `log` crate.
//! * `json`: render [`TransferStats`] as `JSON` with `TransferStats::to_json`.
//!   It turns on `serde`, which also derives `Serialize` for listing entries
//!   and [`RoutingMode`].
//! * `tokio-io`: feed a `tokio::io::AsyncRead` body with
//!   `TransferEngine::on_body_reader`.

#[macro_use]
mod macros;

pub use bytes;
pub use chunk::{compute_chunk_size, Link};
pub use constraints::Constraints;
pub use decoder::{Decoder, Event, Handler};
pub use error::Error;
pub use part::Part;
pub use pump::{stream_file, Outcome, Transfer};
pub use session::{download_response, TransferEngine, TransferSample, TransferSession, TransferStats, UploadSummary};
pub use sink::{Attached, PartReport, RoutingMode, UploadSink};
pub use size_limit::SizeLimit;
pub use storage::{DirStorage, Entry, EntryKind, MemFile, MemStorage, Storage};

mod buffer;
mod chunk;
mod constants;
mod constraints;
mod content_disposition;
mod decoder;
mod error;
mod helpers;
mod part;
mod pump;
mod session;
mod sink;
mod size_limit;
mod state;
mod storage;
mod stream;

/// A Result type often returned from methods that can have `flashdrop` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// # Examples
///
/// ```
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
///
/// assert_eq!(flashdrop::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA) {
        return Err(Error::NoMultipart);
    }

    let boundary = m
        .get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)?;

    decoder::validate_boundary(&boundary)?;
    Ok(boundary)
}
