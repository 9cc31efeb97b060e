//! Decoder event consumer that writes uploaded parts to storage.

use crate::decoder::{Event, Handler};
use crate::helpers;
use crate::storage::Storage;
use std::io::Write;
use std::time::{Duration, Instant};

/// Whether the body currently being decoded belongs to an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RoutingMode {
    Idle,
    AcceptingUpload,
}

/// What happened to one uploaded part.
#[derive(Debug)]
pub struct PartReport {
    field_name: String,
    file_name: String,
    bytes: u64,
    elapsed: Duration,
    complete: bool,
    error: Option<crate::Error>,
}

impl PartReport {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The name the part was stored under (after sanitizing, if enabled).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Bytes written to storage.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// `false` when the request was abandoned before the part ended.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The storage error that made the sink drop this part's data, if any.
    pub fn error(&self) -> Option<&crate::Error> {
        self.error.as_ref()
    }

    /// Stored completely and without a storage error.
    pub fn is_stored(&self) -> bool {
        self.complete && self.error.is_none()
    }
}

/// Writes each part of an upload to a file named after the part.
///
/// Storage failures never stop decoding: the affected part's remaining data
/// is dropped and the failure lands in its [`PartReport`].
#[derive(Debug)]
pub struct UploadSink<W> {
    mode: RoutingMode,
    sanitize_file_names: bool,
    file: Option<W>,
    current: Option<PartReport>,
    started: Option<Instant>,
    reports: Vec<PartReport>,
}

impl<W: Write> UploadSink<W> {
    pub fn new(mode: RoutingMode) -> Self {
        UploadSink {
            mode,
            sanitize_file_names: false,
            file: None,
            current: None,
            started: None,
            reports: Vec::new(),
        }
    }

    /// Strip directory components from file names before creating files.
    pub fn with_sanitized_names(mut self, enabled: bool) -> Self {
        self.sanitize_file_names = enabled;
        self
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Reports of the parts that ended so far, in body order.
    pub fn reports(&self) -> &[PartReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<PartReport> {
        self.reports
    }

    /// Returns a [`Handler`] writing through `storage`.
    pub fn attach<'a, S>(&'a mut self, storage: &'a S) -> Attached<'a, S>
    where
        S: Storage<Writer = W>,
    {
        Attached { sink: self, storage }
    }

    /// Handles one decoder event.
    pub fn on_event<S>(&mut self, storage: &S, event: Event<'_>)
    where
        S: Storage<Writer = W>,
    {
        if self.mode != RoutingMode::AcceptingUpload {
            trace!("sink idle, ignoring {:?}", event);
            return;
        }

        match event {
            Event::PartStarted(part) => {
                if self.current.is_some() {
                    warn!("part started while another was open, closing it");
                    self.close(false);
                }

                let raw_name = part.file_name().unwrap_or("");
                let file_name = if self.sanitize_file_names {
                    helpers::strip_directories(raw_name)
                } else {
                    raw_name
                };

                let mut report = PartReport {
                    field_name: part.name().to_owned(),
                    file_name: file_name.to_owned(),
                    bytes: 0,
                    elapsed: Duration::default(),
                    complete: false,
                    error: None,
                };

                match storage.create(file_name) {
                    Ok(file) => self.file = Some(file),
                    Err(err) => {
                        warn!("cannot open {:?} for upload, dropping its data: {}", file_name, err);
                        report.error = Some(crate::Error::storage(file_name, err));
                    }
                }

                self.current = Some(report);
                self.started = Some(Instant::now());
            }
            Event::PartData(bytes) => {
                let (file, report) = match (self.file.as_mut(), self.current.as_mut()) {
                    (Some(file), Some(report)) => (file, report),
                    _ => return,
                };

                if let Err(err) = file.write_all(bytes) {
                    warn!("write to {:?} failed, dropping the rest: {}", report.file_name, err);
                    report.error = Some(crate::Error::storage(&report.file_name, err));
                    self.file = None;
                } else {
                    report.bytes += bytes.len() as u64;
                }
            }
            Event::PartEnded => self.close(true),
            Event::MessageEnded => {
                debug!("upload complete, {} parts", self.reports.len());
                self.mode = RoutingMode::Idle;
            }
        }
    }

    /// Closes a file left open by an interrupted body. The part is reported as
    /// incomplete.
    pub fn abandon(&mut self) {
        if self.current.is_some() {
            warn!("upload abandoned with a part still open");
            self.close(false);
        }
        self.mode = RoutingMode::Idle;
    }

    fn close(&mut self, complete: bool) {
        let mut report = match self.current.take() {
            Some(report) => report,
            None => return,
        };

        if let Some(mut file) = self.file.take() {
            if let Err(err) = file.flush() {
                report.error = Some(crate::Error::storage(&report.file_name, err));
            }
        }

        report.elapsed = self.started.take().map(|started| started.elapsed()).unwrap_or_default();
        report.complete = complete;
        trace!("part {:?} closed: {} bytes", report.file_name, report.bytes);

        self.reports.push(report);
    }
}

/// An [`UploadSink`] paired with the storage it writes to.
pub struct Attached<'a, S: Storage> {
    sink: &'a mut UploadSink<S::Writer>,
    storage: &'a S,
}

impl<'a, S: Storage> Handler for Attached<'a, S> {
    fn on_event(&mut self, event: Event<'_>) {
        self.sink.on_event(self.storage, event)
    }
}
