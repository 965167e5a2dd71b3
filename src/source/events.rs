//! Events the adapter delivers to the consumer.
//!
//! The source and every stream each own an internally synchronized event
//! queue; the consumer drains them with `get_event` and friends. Events are
//! closed sum types so consumers dispatch by pattern matching.

use crate::sample::Sample;
use crate::source::Stream;

/// Events queued on the source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A stream was selected for the first time. Carries the stream handle
    /// the consumer requests samples through.
    NewStream(Stream),
    /// An already-active stream stayed selected across a start call.
    UpdatedStream(Stream),
    /// The source transitioned to running.
    Started,
    /// Every stream in the presentation has reached end-of-stream.
    EndOfPresentation,
}

impl SourceEvent {
    /// Get a human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewStream(_) => "new-stream",
            Self::UpdatedStream(_) => "updated-stream",
            Self::Started => "started",
            Self::EndOfPresentation => "end-of-presentation",
        }
    }
}

/// Events queued on an individual stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// The stream was selected and started.
    Started,
    /// A sample is ready; carries the request's token if one was supplied.
    SampleReady(Sample),
    /// The stream delivered its last sample.
    EndOfStream,
}

impl StreamEvent {
    /// Get a human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::SampleReady(_) => "sample-ready",
            Self::EndOfStream => "end-of-stream",
        }
    }
}
