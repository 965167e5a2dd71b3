//! Media source: container-level state machine and stream discovery.
//!
//! A [`Source`] exposes one opened container. Construction wires the
//! byte-stream bridge into a freshly created pipeline, starts it, and
//! blocks until the pipeline has reported every elementary stream — the one
//! intentional synchronous wait in the adapter, bounded by the pipeline
//! reporting discovery complete or failing. From then on every operation
//! either completes synchronously or hands state to a callback-driven
//! dispatch.

mod events;
mod stream;

pub use events::{SourceEvent, StreamEvent};
pub use stream::{Stream, StreamState};

pub(crate) use stream::StreamInner;

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::bytestream::{ByteStorage, ByteStreamCursor};
use crate::descriptor::{PresentationDescriptor, StreamDescriptor, StreamId};
use crate::error::{Error, Result};
use crate::format::MediaType;
use crate::pipeline::{DemuxBackend, DemuxPipeline, PipelineEvent, PipelineSink, PipelineState};

// ============================================================================
// States and start parameters
// ============================================================================

/// Source state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    /// Construction in progress; discovery has not completed.
    Opening,
    /// Discovery complete, ready to start.
    Stopped,
    /// Started, then paused.
    Paused,
    /// Producing samples for selected streams.
    Running,
    /// Torn down. Terminal.
    Shutdown,
}

/// Time format selector for [`Source::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// The default presentation time format. The only supported value.
    #[default]
    Default,
    /// A registered custom format. Not supported.
    Custom(u32),
}

/// Start position for [`Source::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Start from the current position. The only supported value.
    #[default]
    Current,
    /// Start from an absolute presentation time. Not supported.
    At(Duration),
}

// ============================================================================
// One-shot completion signal
// ============================================================================

struct CompletionState {
    completed: bool,
    outcome: Option<Result<()>>,
}

/// Bounded synchronous wait for discovery: a condition variable, not a
/// busy poll. Only the first completion is kept.
struct Completion {
    state: Mutex<CompletionState>,
    done: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            state: Mutex::new(CompletionState {
                completed: false,
                outcome: None,
            }),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: Result<()>) {
        let mut state = self.state.lock().unwrap();
        if state.completed {
            return;
        }
        state.completed = true;
        state.outcome = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        while !state.completed {
            state = self.done.wait(state).unwrap();
        }
        state.outcome.take().unwrap_or(Ok(()))
    }
}

// ============================================================================
// Source internals
// ============================================================================

struct StreamSet {
    list: Vec<Arc<StreamInner>>,
    /// Latched once the end-of-presentation event has been emitted.
    presentation_ended: bool,
}

pub(crate) struct SourceInner {
    state: Mutex<SourceState>,
    events: crate::runtime::EventQueue<SourceEvent>,
    streams: Mutex<StreamSet>,
    pres_desc: Mutex<Option<PresentationDescriptor>>,
    pipeline: Mutex<Option<Arc<dyn DemuxPipeline>>>,
    cursor: Mutex<Option<Arc<ByteStreamCursor>>>,
    init: Completion,
}

impl SourceInner {
    fn with_state(state: SourceState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            events: crate::runtime::EventQueue::new(),
            streams: Mutex::new(StreamSet {
                list: Vec::new(),
                presentation_ended: false,
            }),
            pres_desc: Mutex::new(None),
            pipeline: Mutex::new(None),
            cursor: Mutex::new(None),
            init: Completion::new(),
        })
    }

    fn state(&self) -> SourceState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn pipeline(&self) -> Option<Arc<dyn DemuxPipeline>> {
        self.pipeline.lock().unwrap().clone()
    }

    // ------------------------------------------------------------------
    // Discovery callbacks (pipeline threads)
    // ------------------------------------------------------------------

    fn handle_stream_added(this: &Arc<Self>, id: StreamId, media_type: MediaType) {
        let mut set = this.streams.lock().unwrap();

        if let Some(existing) = set.list.iter().find(|s| s.id() == id) {
            // The pipeline removed and re-added this elementary stream;
            // relink it rather than constructing a duplicate.
            existing.set_attached(true);
            if existing.state() != StreamState::Inactive {
                if let Some(pipeline) = this.pipeline() {
                    if let Err(err) = pipeline.link_stream(id) {
                        tracing::error!(stream = %id, error = %err, "failed to relink stream output");
                    }
                }
            }
            return;
        }

        let descriptor = StreamDescriptor::new(id, media_type);
        set.list.push(StreamInner::new(this, descriptor));
    }

    fn handle_stream_removed(&self, id: StreamId) {
        let stream = {
            let set = self.streams.lock().unwrap();
            set.list.iter().find(|s| s.id() == id).cloned()
        };
        let Some(stream) = stream else {
            tracing::warn!(stream = %id, "removal reported for an unknown stream");
            return;
        };
        if stream.is_attached() && stream.state() != StreamState::Inactive {
            if let Some(pipeline) = self.pipeline() {
                pipeline.unlink_stream(id);
            }
        }
        stream.set_attached(false);
    }

    fn handle_all_streams_added(&self) {
        let set = self.streams.lock().unwrap();
        if self.state() != SourceState::Opening {
            // Re-entry after discovery completed once.
            return;
        }
        let descriptors: Vec<StreamDescriptor> =
            set.list.iter().map(|s| s.descriptor().clone()).collect();
        *self.pres_desc.lock().unwrap() = Some(PresentationDescriptor::new(descriptors));
        drop(set);
        self.init.complete(Ok(()));
    }

    fn handle_pipeline_error(&self, message: String) {
        tracing::error!(error = %message, "pipeline reported an error");
        // Fatal while opening; afterwards the log is all there is.
        self.init.complete(Err(Error::Pipeline(message)));
    }

    fn with_stream(&self, id: StreamId, f: impl FnOnce(&StreamInner)) {
        let stream = {
            let set = self.streams.lock().unwrap();
            set.list.iter().find(|s| s.id() == id).cloned()
        };
        match stream {
            Some(stream) => f(&stream),
            None => tracing::warn!(stream = %id, "pipeline event for an unknown stream"),
        }
    }

    /// A stream reached end-of-stream; emit end-of-presentation exactly
    /// once when every stream has.
    pub(crate) fn notify_stream_ended(&self) {
        let mut set = self.streams.lock().unwrap();
        if set.presentation_ended {
            return;
        }
        if set.list.iter().all(|stream| stream.eos_reached()) {
            set.presentation_ended = true;
            self.events.push(SourceEvent::EndOfPresentation);
        }
    }

    // ------------------------------------------------------------------
    // Consumer operations
    // ------------------------------------------------------------------

    fn start(
        &self,
        descriptor: &PresentationDescriptor,
        time_format: TimeFormat,
        start_position: StartPosition,
    ) -> Result<()> {
        if self.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }

        let list = self.streams.lock().unwrap().list.clone();

        for index in 0..descriptor.stream_count() {
            let Some((selected, wanted)) = descriptor.stream(index) else {
                continue;
            };
            for stream in &list {
                if stream.id() != wanted.id() {
                    continue;
                }
                let was_active = stream.state() != StreamState::Inactive;
                stream.set_state(if selected {
                    StreamState::Running
                } else {
                    StreamState::Inactive
                });
                if selected {
                    let handle = Stream {
                        inner: Arc::clone(stream),
                    };
                    self.events.push(if was_active {
                        SourceEvent::UpdatedStream(handle)
                    } else {
                        SourceEvent::NewStream(handle)
                    });
                    stream.notify_started();
                    // Requests may have queued while the stream was paused.
                    stream.run_dispatch();
                }
            }
        }

        // The activation side effects above are already committed when this
        // check fails; callers observe the stream events either way.
        if time_format != TimeFormat::Default || start_position != StartPosition::Current {
            tracing::warn!(?time_format, ?start_position, "ignoring start position");
            return Err(Error::UnsupportedTimeFormat);
        }

        *self.state.lock().unwrap() = SourceState::Running;
        if let Some(pipeline) = self.pipeline() {
            pipeline.set_state(PipelineState::Playing)?;
        }
        self.events.push(SourceEvent::Started);

        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SourceState::Shutdown {
                return Err(Error::Shutdown);
            }
            *state = SourceState::Shutdown;
        }
        self.teardown();
        Ok(())
    }

    /// Release everything. Runs at most once; callers flip the state to
    /// [`SourceState::Shutdown`] first.
    fn teardown(&self) {
        if let Some(pipeline) = self.pipeline() {
            if let Err(err) = pipeline.set_state(PipelineState::Null) {
                tracing::warn!(error = %err, "failed to stop pipeline during teardown");
            }
        }

        *self.pres_desc.lock().unwrap() = None;
        self.events.shutdown();

        let streams = {
            let mut set = self.streams.lock().unwrap();
            std::mem::take(&mut set.list)
        };
        for stream in &streams {
            stream.teardown();
        }

        *self.pipeline.lock().unwrap() = None;
        *self.cursor.lock().unwrap() = None;
    }

    fn abort_open(&self) {
        *self.state.lock().unwrap() = SourceState::Shutdown;
        self.teardown();
    }
}

impl Drop for SourceInner {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap();
        if state != SourceState::Shutdown {
            tracing::error!("media source released without shutdown");
        }
    }
}

// ============================================================================
// Pipeline sink
// ============================================================================

/// Adapter between the pipeline's callback surface and the source. Holds a
/// weak reference so in-flight callbacks never extend the source's life.
struct SourceSink {
    source: std::sync::Weak<SourceInner>,
}

impl PipelineSink for SourceSink {
    fn handle_event(&self, event: PipelineEvent) {
        let Some(source) = self.source.upgrade() else {
            tracing::warn!(event = event.name(), "pipeline event after the source was released");
            return;
        };
        match event {
            PipelineEvent::StreamAdded { id, media_type } => {
                SourceInner::handle_stream_added(&source, id, media_type);
            }
            PipelineEvent::StreamRemoved { id } => source.handle_stream_removed(id),
            PipelineEvent::AllStreamsAdded => source.handle_all_streams_added(),
            PipelineEvent::SampleProduced { id } => {
                source.with_stream(id, StreamInner::notify_sample_produced);
            }
            PipelineEvent::EndOfStream { id } => {
                source.with_stream(id, StreamInner::notify_end_of_stream);
            }
            PipelineEvent::Error { message } => source.handle_pipeline_error(message),
        }
    }
}

// ============================================================================
// Public handle
// ============================================================================

/// Consumer handle to an opened container.
///
/// Cloning shares the underlying source. The source must be explicitly
/// [shut down](Source::shutdown); dropping the last handle without doing so
/// is a usage error and is logged as such.
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

impl Source {
    /// Open a container.
    ///
    /// Wires the byte-stream bridge over `storage` into a pipeline created
    /// by `backend`, starts it, and blocks the calling thread until the
    /// pipeline reports that no more streams will be added — or that it
    /// failed. Any failure fully unwinds partially created state before
    /// returning.
    pub fn open(storage: Box<dyn ByteStorage>, backend: &dyn DemuxBackend) -> Result<Source> {
        let cursor = Arc::new(ByteStreamCursor::new(storage));
        let inner = SourceInner::with_state(SourceState::Opening);
        *inner.cursor.lock().unwrap() = Some(Arc::clone(&cursor));

        let sink: Arc<dyn PipelineSink> = Arc::new(SourceSink {
            source: Arc::downgrade(&inner),
        });
        let pipeline = match backend.open(cursor, sink) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                inner.abort_open();
                return Err(err);
            }
        };
        *inner.pipeline.lock().unwrap() = Some(Arc::clone(&pipeline));

        if let Err(err) = pipeline.set_state(PipelineState::Playing) {
            inner.abort_open();
            return Err(err);
        }

        if let Err(err) = inner.init.wait() {
            inner.abort_open();
            return Err(err);
        }

        // Discovery is done; idle the pipeline until start.
        if let Err(err) = pipeline.set_state(PipelineState::Ready) {
            inner.abort_open();
            return Err(err);
        }

        if inner.pres_desc.lock().unwrap().is_none() {
            inner.abort_open();
            return Err(Error::Pipeline(
                "discovery completed without a presentation descriptor".into(),
            ));
        }

        *inner.state.lock().unwrap() = SourceState::Stopped;
        Ok(Source { inner })
    }

    /// Get the source's current state.
    pub fn state(&self) -> SourceState {
        self.inner.state()
    }

    /// Get a clone of the presentation descriptor.
    ///
    /// Fails with [`Error::NotInitialized`] if discovery never completed.
    /// The clone is independent; selecting streams on it does not touch the
    /// source's own copy.
    pub fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        match &*self.inner.pres_desc.lock().unwrap() {
            Some(descriptor) => Ok(descriptor.clone()),
            None => Err(Error::NotInitialized),
        }
    }

    /// Get handles to every discovered stream, in discovery order.
    pub fn streams(&self) -> Result<Vec<Stream>> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        let set = self.inner.streams.lock().unwrap();
        Ok(set
            .list
            .iter()
            .map(|inner| Stream {
                inner: Arc::clone(inner),
            })
            .collect())
    }

    /// Start the presentation.
    ///
    /// Streams marked selected in `descriptor` flip to running (emitting
    /// `NewStream`/`UpdatedStream` on the source and `Started` on the
    /// stream); deselected ones flip to inactive. Only
    /// [`TimeFormat::Default`] and [`StartPosition::Current`] are accepted;
    /// anything else fails with [`Error::UnsupportedTimeFormat`] — after
    /// the stream activation side effects have been committed, which
    /// mirrors the behavior this adapter was specified against.
    pub fn start(
        &self,
        descriptor: &PresentationDescriptor,
        time_format: TimeFormat,
        start_position: StartPosition,
    ) -> Result<()> {
        self.inner.start(descriptor, time_format, start_position)
    }

    /// Stop the presentation. Not implemented.
    pub fn stop(&self) -> Result<()> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        Err(Error::NotImplemented)
    }

    /// Pause the presentation. Not implemented.
    pub fn pause(&self) -> Result<()> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        Err(Error::NotImplemented)
    }

    /// Shut the source down, releasing the pipeline, every stream, and the
    /// storage handle.
    ///
    /// Must be called exactly once; a second call is a caller error and
    /// fails with [`Error::Shutdown`] without a second teardown pass.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown()
    }

    /// Wait for the next source event.
    pub fn get_event(&self) -> Result<SourceEvent> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        self.inner.events.next()
    }

    /// Wait for the next source event, giving up after `timeout`.
    pub fn get_event_timeout(&self, timeout: Duration) -> Result<Option<SourceEvent>> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        self.inner.events.next_timeout(timeout)
    }

    /// Take the next source event without blocking.
    pub fn try_get_event(&self) -> Result<Option<SourceEvent>> {
        if self.inner.state() == SourceState::Shutdown {
            return Err(Error::Shutdown);
        }
        self.inner.events.try_next()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("state", &self.inner.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_descriptor_before_discovery() {
        let inner = SourceInner::with_state(SourceState::Stopped);
        let source = Source { inner };
        assert!(matches!(
            source.create_presentation_descriptor(),
            Err(Error::NotInitialized)
        ));
        // Clean up so the drop path is the shutdown one.
        source.shutdown().unwrap();
    }

    #[test]
    fn test_completion_keeps_first_outcome() {
        let completion = Completion::new();
        completion.complete(Err(Error::Pipeline("first".into())));
        completion.complete(Ok(()));
        assert!(matches!(completion.wait(), Err(Error::Pipeline(_))));
    }

    #[test]
    fn test_completion_wakes_waiter() {
        let completion = Arc::new(Completion::new());
        let signal = Arc::clone(&completion);
        let waiter = std::thread::spawn(move || completion.wait());
        std::thread::sleep(Duration::from_millis(20));
        signal.complete(Ok(()));
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_second_shutdown_is_an_error() {
        let inner = SourceInner::with_state(SourceState::Stopped);
        let source = Source { inner };
        source.shutdown().unwrap();
        assert!(matches!(source.shutdown(), Err(Error::Shutdown)));
    }
}
