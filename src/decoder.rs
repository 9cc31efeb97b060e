use crate::buffer::StreamBuffer;
use crate::constants;
use crate::constraints::Constraints;
use crate::content_disposition::ContentDisposition;
use crate::helpers;
use crate::part::Part;
use crate::state::{DecoderState, StreamingStage};

/// Something the [`Decoder`] recognized in the body.
///
/// Per part the order is always `PartStarted`, zero or more `PartData`,
/// `PartEnded`; `MessageEnded` follows the last part.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A part's header block was decoded.
    PartStarted(&'a Part),
    /// A run of the current part's payload. A part's payload may arrive in
    /// any number of slices, split wherever the input was split.
    PartData(&'a [u8]),
    /// The current part's payload is complete.
    PartEnded,
    /// The closing boundary was seen.
    MessageEnded,
}

/// Consumer of decoder [`Event`]s.
///
/// Closures taking an `Event` implement this trait.
pub trait Handler {
    fn on_event(&mut self, event: Event<'_>);
}

impl<F> Handler for F
where
    F: FnMut(Event<'_>),
{
    fn on_event(&mut self, event: Event<'_>) {
        self(event)
    }
}

/// Incremental `multipart/form-data` decoder.
///
/// Bytes are fed in whatever chunks they arrive in; boundaries and header
/// blocks may be split anywhere. Memory use is bounded by the header block
/// limit: part payloads are passed through as slices of the fed input.
///
/// # Examples
///
/// ```
/// use flashdrop::{Decoder, Event};
///
/// # fn run() -> flashdrop::Result<()> {
/// let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nhello\r\n--XYZ--\r\n";
/// let mut decoder = Decoder::new("XYZ")?;
/// let mut stored = Vec::new();
///
/// for chunk in body.chunks(7) {
///     decoder.feed_all(chunk, &mut |event: Event<'_>| {
///         if let Event::PartData(bytes) = event {
///             stored.extend_from_slice(bytes);
///         }
///     })?;
/// }
/// decoder.finish()?;
///
/// assert_eq!(stored, b"hello");
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Debug)]
pub struct Decoder {
    state: DecoderState,
    boundary: String,
    constraints: Constraints,
}

impl Decoder {
    /// Creates a decoder for bodies delimited by `boundary`.
    pub fn new<B: Into<String>>(boundary: B) -> crate::Result<Decoder> {
        Decoder::with_constraints(boundary, Constraints::default())
    }

    /// Creates a decoder that enforces the header and size limits of
    /// `constraints`.
    pub fn with_constraints<B: Into<String>>(boundary: B, constraints: Constraints) -> crate::Result<Decoder> {
        let boundary = boundary.into();
        validate_boundary(&boundary)?;

        let state = DecoderState {
            buffer: StreamBuffer::new(&boundary),
            stage: StreamingStage::Preamble,
            next_field_idx: 0,
            curr_part: None,
            curr_field_size_limit: constraints.size_limit.per_field,
            curr_field_size_counter: 0,
            stream_size_counter: 0,
        };

        Ok(Decoder {
            state,
            boundary,
            constraints,
        })
    }

    /// The boundary token this decoder looks for.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The part whose payload is being decoded, if any.
    pub fn current_part(&self) -> Option<&Part> {
        self.state.curr_part.as_ref()
    }

    /// `true` once the decoder refuses more input, either after an error or
    /// after [`finish`](Decoder::finish).
    pub fn is_stopped(&self) -> bool {
        self.state.stage.is_stopped()
    }

    /// `true` once the closing boundary was seen.
    pub fn is_complete(&self) -> bool {
        matches!(self.state.stage, StreamingStage::Epilogue | StreamingStage::Done)
    }

    /// Total body bytes consumed so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.state.stream_size_counter
    }

    /// Feeds a slice of the body and returns how many bytes were consumed.
    ///
    /// A call stops early right after the closing boundary, leaving the
    /// epilogue for the next call, so callers should re-invoke with the
    /// remainder until everything is consumed or the decoder is stopped;
    /// [`feed_all`](Decoder::feed_all) does exactly that. After an error the
    /// decoder emits nothing further.
    pub fn feed<H: Handler>(&mut self, data: &[u8], handler: &mut H) -> crate::Result<usize> {
        match self.state.stage {
            StreamingStage::Failed => return Err(crate::Error::DecoderStopped),
            StreamingStage::Done => return Ok(0),
            _ => {}
        }

        let limit = self.constraints.size_limit.whole_stream;
        if self.state.stream_size_counter.saturating_add(data.len() as u64) > limit {
            self.state.stage = StreamingStage::Failed;
            return Err(crate::Error::StreamSizeExceeded { limit });
        }

        let mut consumed = 0;
        while consumed < data.len() {
            let was_complete = self.is_complete();

            match self.step(&data[consumed..], handler) {
                Ok(n) => consumed += n,
                Err(err) => {
                    warn!("multipart decoding failed after {} bytes: {}", consumed, err);
                    self.state.stage = StreamingStage::Failed;
                    self.state.stream_size_counter += consumed as u64;
                    return Err(err);
                }
            }

            if !was_complete && self.is_complete() {
                break;
            }
        }

        self.state.stream_size_counter += consumed as u64;
        Ok(consumed)
    }

    /// Feeds `data` until it is fully consumed or the decoder stops.
    pub fn feed_all<H: Handler>(&mut self, data: &[u8], handler: &mut H) -> crate::Result<()> {
        let mut fed = 0;

        while fed < data.len() && !self.is_stopped() {
            fed += self.feed(&data[fed..], handler)?;
        }

        Ok(())
    }

    /// Signals the end of the body.
    ///
    /// Succeeds only if the closing boundary was seen; a body that ends inside
    /// a header block yields [`Error::IncompleteHeaders`](crate::Error::IncompleteHeaders).
    pub fn finish(&mut self) -> crate::Result<()> {
        trace!(
            "end of body in {:?}, {} delimiter bytes pending",
            self.state.stage,
            self.state.buffer.pending()
        );

        let result = match self.state.stage {
            StreamingStage::Epilogue | StreamingStage::Done => Ok(()),
            StreamingStage::Failed => return Err(crate::Error::DecoderStopped),
            StreamingStage::ReadingFieldHeaders => Err(crate::Error::IncompleteHeaders),
            StreamingStage::ReadingFieldData => Err(crate::Error::IncompleteFieldData {
                field_name: self.current_field_name(),
            }),
            StreamingStage::Preamble
            | StreamingStage::BoundaryFound
            | StreamingStage::ReadingClosingMarker
            | StreamingStage::ReadingBoundaryLineEnd => Err(crate::Error::IncompleteStream),
        };

        self.state.stage = match result {
            Ok(()) => StreamingStage::Done,
            Err(_) => StreamingStage::Failed,
        };

        result
    }

    fn current_field_name(&self) -> Option<String> {
        self.state
            .curr_part
            .as_ref()
            .map(|part| part.name())
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
    }

    // Consumes at least one byte of non-empty `data`.
    fn step<H: Handler>(&mut self, data: &[u8], handler: &mut H) -> crate::Result<usize> {
        match self.state.stage {
            StreamingStage::Preamble => {
                let (consumed, found) = self.state.buffer.read_until_delimiter(data, |_| Ok(()))?;
                if found {
                    self.state.stage = StreamingStage::BoundaryFound;
                }
                Ok(consumed)
            }
            StreamingStage::BoundaryFound => {
                self.state.stage = match data[0] {
                    b'-' => StreamingStage::ReadingClosingMarker,
                    b' ' | b'\t' => StreamingStage::BoundaryFound,
                    constants::CR => StreamingStage::ReadingBoundaryLineEnd,
                    _ => return Err(crate::Error::MalformedBoundary),
                };
                Ok(1)
            }
            StreamingStage::ReadingClosingMarker => {
                if data[0] != b'-' {
                    return Err(crate::Error::MalformedBoundary);
                }

                trace!("closing boundary after {} parts", self.state.next_field_idx);
                self.state.stage = StreamingStage::Epilogue;
                self.state.curr_part = None;
                handler.on_event(Event::MessageEnded);
                Ok(1)
            }
            StreamingStage::ReadingBoundaryLineEnd => {
                if data[0] != constants::LF {
                    return Err(crate::Error::MalformedBoundary);
                }

                self.state.buffer.begin_headers();
                self.state.stage = StreamingStage::ReadingFieldHeaders;
                Ok(1)
            }
            StreamingStage::ReadingFieldHeaders => {
                let (consumed, block) = self
                    .state
                    .buffer
                    .read_headers(data, self.constraints.max_header_size)?;

                if let Some(block) = block {
                    self.start_part(&block, handler)?;
                }
                Ok(consumed)
            }
            StreamingStage::ReadingFieldData => self.read_field_data(data, handler),
            StreamingStage::Epilogue | StreamingStage::Done | StreamingStage::Failed => Ok(data.len()),
        }
    }

    fn start_part<H: Handler>(&mut self, block: &[u8], handler: &mut H) -> crate::Result<()> {
        let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

        let headers = match httparse::parse_headers(block, &mut headers) {
            Ok(httparse::Status::Complete((_, raw_headers))) => helpers::convert_raw_headers_to_header_map(raw_headers)?,
            Ok(httparse::Status::Partial) => return Err(crate::Error::IncompleteHeaders),
            Err(err) => return Err(crate::Error::ReadHeaderFailed(err)),
        };

        let content_disposition = ContentDisposition::parse(&headers);
        let field_name = content_disposition.field_name.as_deref();

        if !self.constraints.is_it_allowed(field_name) {
            return Err(crate::Error::UnknownField {
                field_name: content_disposition.field_name,
            });
        }

        let state = &mut self.state;
        state.curr_field_size_limit = self.constraints.size_limit.extract_size_limit_for(field_name);
        state.curr_field_size_counter = 0;
        state.stage = StreamingStage::ReadingFieldData;

        let idx = state.next_field_idx;
        state.next_field_idx += 1;

        let part = state.curr_part.insert(Part::new(headers, idx, content_disposition));
        debug!(
            "part {} started: name={:?} file_name={:?}",
            idx,
            part.name(),
            part.file_name()
        );
        handler.on_event(Event::PartStarted(part));

        Ok(())
    }

    fn read_field_data<H: Handler>(&mut self, data: &[u8], handler: &mut H) -> crate::Result<usize> {
        let state = &mut self.state;
        let limit = state.curr_field_size_limit;
        let counter = &mut state.curr_field_size_counter;
        let part = &state.curr_part;

        let (consumed, found) = state.buffer.read_until_delimiter(data, |bytes| {
            *counter += bytes.len() as u64;

            if *counter > limit {
                return Err(crate::Error::FieldSizeExceeded {
                    limit,
                    field_name: part.as_ref().map(|part| part.name().to_owned()).filter(|name| !name.is_empty()),
                });
            }

            handler.on_event(Event::PartData(bytes));
            Ok(())
        })?;

        if found {
            trace!("part ended after {} bytes", state.curr_field_size_counter);
            state.stage = StreamingStage::BoundaryFound;
            handler.on_event(Event::PartEnded);
        }

        Ok(consumed)
    }
}

/// Checks a boundary against RFC 2046: 1 to 70 characters from a restricted
/// set, not ending in a space.
pub(crate) fn validate_boundary(boundary: &str) -> crate::Result<()> {
    let bytes = boundary.as_bytes();

    let valid_len = !bytes.is_empty() && bytes.len() <= constants::MAX_BOUNDARY_LEN;
    let valid_chars = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || constants::BOUNDARY_SPECIALS.contains(b));
    let valid_end = bytes.last() != Some(&b' ');

    if valid_len && valid_chars && valid_end {
        Ok(())
    } else {
        Err(crate::Error::InvalidBoundary)
    }
}
