//! Scripted pipeline backend for tests.
//!
//! [`ScriptedDemux`] stands in for a real demultiplexing pipeline: the
//! streams it "discovers" are configured up front, and tests drive sample
//! production, end-of-stream, removal/re-add, and failures by hand through
//! the [`ScriptedPipeline`] handle. Events are delivered synchronously on
//! the calling thread unless threaded discovery is enabled, which is a
//! legal pipeline behavior (callbacks arrive on unspecified threads).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::bytestream::ByteStreamCursor;
use crate::descriptor::StreamId;
use crate::error::{Error, Result};
use crate::format::MediaType;
use crate::pipeline::{DemuxBackend, DemuxPipeline, PipelineEvent, PipelineSink, PipelineState};
use crate::sample::Sample;

/// Configurable backend producing [`ScriptedPipeline`] instances.
pub struct ScriptedDemux {
    streams: Vec<(StreamId, MediaType)>,
    discovery_error: Option<String>,
    open_failure: bool,
    threaded_discovery: bool,
    pipeline: Mutex<Option<Arc<ScriptedPipeline>>>,
}

impl ScriptedDemux {
    /// Create a backend that discovers no streams.
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            discovery_error: None,
            open_failure: false,
            threaded_discovery: false,
            pipeline: Mutex::new(None),
        }
    }

    /// Add a stream to discover, in call order.
    pub fn with_stream(mut self, id: StreamId, media_type: MediaType) -> Self {
        self.streams.push((id, media_type));
        self
    }

    /// Report an error instead of discovery completion.
    pub fn with_discovery_error(mut self, message: impl Into<String>) -> Self {
        self.discovery_error = Some(message.into());
        self
    }

    /// Fail `open` outright (pipeline creation failure).
    pub fn with_open_failure(mut self) -> Self {
        self.open_failure = true;
        self
    }

    /// Deliver discovery events from a separate thread after a short delay.
    pub fn with_threaded_discovery(mut self) -> Self {
        self.threaded_discovery = true;
        self
    }

    /// Get the most recently opened pipeline, for driving it from tests.
    pub fn pipeline(&self) -> Option<Arc<ScriptedPipeline>> {
        self.pipeline.lock().unwrap().clone()
    }
}

impl Default for ScriptedDemux {
    fn default() -> Self {
        Self::new()
    }
}

impl DemuxBackend for ScriptedDemux {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(
        &self,
        cursor: Arc<ByteStreamCursor>,
        sink: Arc<dyn PipelineSink>,
    ) -> Result<Arc<dyn DemuxPipeline>> {
        if self.open_failure {
            return Err(Error::Pipeline("scripted open failure".into()));
        }
        let pipeline = Arc::new(ScriptedPipeline {
            cursor,
            sink,
            streams: self.streams.clone(),
            discovery_error: self.discovery_error.clone(),
            threaded_discovery: self.threaded_discovery,
            state: Mutex::new(PipelineState::Null),
            state_log: Mutex::new(Vec::new()),
            discovered: Mutex::new(false),
            queues: Mutex::new(HashMap::new()),
            link_log: Mutex::new(Vec::new()),
        });
        *self.pipeline.lock().unwrap() = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }
}

/// Hand-driven pipeline instance created by [`ScriptedDemux`].
pub struct ScriptedPipeline {
    cursor: Arc<ByteStreamCursor>,
    sink: Arc<dyn PipelineSink>,
    streams: Vec<(StreamId, MediaType)>,
    discovery_error: Option<String>,
    threaded_discovery: bool,
    state: Mutex<PipelineState>,
    state_log: Mutex<Vec<PipelineState>>,
    discovered: Mutex<bool>,
    queues: Mutex<HashMap<StreamId, VecDeque<Sample>>>,
    link_log: Mutex<Vec<(StreamId, bool)>>,
}

impl ScriptedPipeline {
    fn run_discovery(&self) {
        {
            let mut discovered = self.discovered.lock().unwrap();
            if *discovered {
                return;
            }
            *discovered = true;
        }

        if self.threaded_discovery {
            let sink = Arc::clone(&self.sink);
            let streams = self.streams.clone();
            let error = self.discovery_error.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                Self::announce(&*sink, &streams, error.as_deref());
            });
        } else {
            // Probe the container head the way a real parser would.
            let _ = self.cursor.pull(Some(0), 16);
            Self::announce(&*self.sink, &self.streams, self.discovery_error.as_deref());
        }
    }

    fn announce(
        sink: &dyn PipelineSink,
        streams: &[(StreamId, MediaType)],
        error: Option<&str>,
    ) {
        for (id, media_type) in streams {
            sink.handle_event(PipelineEvent::StreamAdded {
                id: *id,
                media_type: media_type.clone(),
            });
        }
        match error {
            Some(message) => sink.handle_event(PipelineEvent::Error {
                message: message.to_owned(),
            }),
            None => sink.handle_event(PipelineEvent::AllStreamsAdded),
        }
    }

    /// Queue a sample and announce its production.
    pub fn push_sample(&self, sample: Sample) {
        let id = sample.stream_id();
        self.queues
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(sample);
        self.sink.handle_event(PipelineEvent::SampleProduced { id });
    }

    /// Announce a produced sample without queueing one (misbehaving
    /// pipeline; exercises the adapter's pull-failure path).
    pub fn announce_phantom_sample(&self, id: StreamId) {
        self.sink.handle_event(PipelineEvent::SampleProduced { id });
    }

    /// Signal end-of-stream for one stream.
    pub fn finish_stream(&self, id: StreamId) {
        self.sink.handle_event(PipelineEvent::EndOfStream { id });
    }

    /// Announce removal of a stream's output.
    pub fn remove_stream(&self, id: StreamId) {
        self.sink.handle_event(PipelineEvent::StreamRemoved { id });
    }

    /// Re-announce a stream (relink-after-remove path).
    pub fn re_add_stream(&self, id: StreamId, media_type: MediaType) {
        self.sink
            .handle_event(PipelineEvent::StreamAdded { id, media_type });
    }

    /// Report a pipeline failure.
    pub fn fail(&self, message: impl Into<String>) {
        self.sink.handle_event(PipelineEvent::Error {
            message: message.into(),
        });
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap()
    }

    /// Every state the pipeline was driven through, in order.
    pub fn state_log(&self) -> Vec<PipelineState> {
        self.state_log.lock().unwrap().clone()
    }

    /// Link/unlink operations observed, in order (`true` = link).
    pub fn link_log(&self) -> Vec<(StreamId, bool)> {
        self.link_log.lock().unwrap().clone()
    }

    /// Number of queued-but-unpulled samples for a stream.
    pub fn queued(&self, id: StreamId) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(&id)
            .map_or(0, VecDeque::len)
    }
}

impl DemuxPipeline for ScriptedPipeline {
    fn set_state(&self, state: PipelineState) -> Result<()> {
        *self.state.lock().unwrap() = state;
        self.state_log.lock().unwrap().push(state);
        if state == PipelineState::Playing {
            self.run_discovery();
        }
        Ok(())
    }

    fn pull_sample(&self, id: StreamId) -> Option<Sample> {
        self.queues
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
    }

    fn link_stream(&self, id: StreamId) -> Result<()> {
        self.link_log.lock().unwrap().push((id, true));
        Ok(())
    }

    fn unlink_stream(&self, id: StreamId) {
        self.link_log.lock().unwrap().push((id, false));
    }
}
