use crate::buffer::StreamBuffer;
use crate::part::Part;

#[derive(Debug)]
pub(crate) struct DecoderState {
    pub(crate) buffer: StreamBuffer,
    pub(crate) stage: StreamingStage,
    pub(crate) next_field_idx: usize,
    pub(crate) curr_part: Option<Part>,
    pub(crate) curr_field_size_limit: u64,
    pub(crate) curr_field_size_counter: u64,
    pub(crate) stream_size_counter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    Preamble,
    BoundaryFound,
    ReadingClosingMarker,
    ReadingBoundaryLineEnd,
    ReadingFieldHeaders,
    ReadingFieldData,
    Epilogue,
    Done,
    Failed,
}

impl StreamingStage {
    pub(crate) fn is_stopped(self) -> bool {
        matches!(self, StreamingStage::Done | StreamingStage::Failed)
    }
}
