//! Demultiplexing pipeline contract.
//!
//! The pipeline that actually parses the container is an external
//! collaborator. The adapter drives it through a narrow surface:
//!
//! - [`DemuxBackend`]: opens a pipeline instance over a byte-stream cursor
//! - [`DemuxPipeline`]: lifecycle commands and per-stream sample pulls
//! - [`PipelineSink`]: the callback surface the pipeline delivers
//!   [`PipelineEvent`]s to, on its own worker threads
//!
//! Events are a closed sum type dispatched by pattern matching; each
//! variant carries its own typed payload.

pub mod testing;

use std::sync::Arc;

use crate::bytestream::ByteStreamCursor;
use crate::descriptor::StreamId;
use crate::error::Result;
use crate::format::MediaType;
use crate::sample::Sample;

/// Lifecycle states the adapter drives the pipeline through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Torn down; all pipeline resources released.
    Null,
    /// Constructed and linked but not producing.
    Ready,
    /// Producing samples.
    Playing,
}

/// Callback events delivered by the pipeline.
#[derive(Debug)]
pub enum PipelineEvent {
    /// A new elementary stream was discovered.
    StreamAdded {
        /// Stable identifier of the stream.
        id: StreamId,
        /// Type the pipeline negotiated for the stream.
        media_type: MediaType,
    },
    /// An elementary stream's output went away (it may be re-added later).
    StreamRemoved {
        /// Stable identifier of the stream.
        id: StreamId,
    },
    /// No further streams will be discovered.
    AllStreamsAdded,
    /// One sample is ready to be pulled for a stream.
    SampleProduced {
        /// Stream the sample belongs to.
        id: StreamId,
    },
    /// A stream will produce no further samples.
    EndOfStream {
        /// Stream that ended.
        id: StreamId,
    },
    /// The pipeline failed. Fatal during discovery.
    Error {
        /// Pipeline-provided description of the failure.
        message: String,
    },
}

impl PipelineEvent {
    /// Get a human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamAdded { .. } => "stream-added",
            Self::StreamRemoved { .. } => "stream-removed",
            Self::AllStreamsAdded => "all-streams-added",
            Self::SampleProduced { .. } => "sample-produced",
            Self::EndOfStream { .. } => "end-of-stream",
            Self::Error { .. } => "error",
        }
    }
}

/// Receiver for pipeline callback events.
///
/// Implementations must tolerate events arriving on arbitrary
/// pipeline-owned threads, concurrently with consumer calls.
pub trait PipelineSink: Send + Sync {
    /// Handle one pipeline event.
    fn handle_event(&self, event: PipelineEvent);
}

/// A running demultiplexing pipeline instance.
pub trait DemuxPipeline: Send + Sync {
    /// Change the pipeline's lifecycle state.
    fn set_state(&self, state: PipelineState) -> Result<()>;

    /// Pull one produced sample for a stream.
    ///
    /// Must be non-blocking and must not deliver events reentrantly; the
    /// adapter calls this with per-stream dispatch state locked. Returns
    /// `None` when nothing is queued for the stream.
    fn pull_sample(&self, id: StreamId) -> Option<Sample>;

    /// Connect a stream's output so samples flow for it.
    fn link_stream(&self, id: StreamId) -> Result<()>;

    /// Disconnect a stream's output.
    fn unlink_stream(&self, id: StreamId);
}

/// Factory for pipeline instances handling one container format.
pub trait DemuxBackend: Send + Sync {
    /// Identifier of the container format this backend demultiplexes.
    fn name(&self) -> &str;

    /// Create a pipeline reading through `cursor`, delivering events to
    /// `sink`. The returned pipeline starts in [`PipelineState::Null`].
    fn open(
        &self,
        cursor: Arc<ByteStreamCursor>,
        sink: Arc<dyn PipelineSink>,
    ) -> Result<Arc<dyn DemuxPipeline>>;
}
