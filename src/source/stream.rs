//! Per-elementary-stream state machine and sample-request dispatch.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::descriptor::{StreamDescriptor, StreamId};
use crate::error::{Error, Result};
use crate::pipeline::DemuxPipeline;
use crate::runtime::EventQueue;
use crate::sample::Token;
use crate::source::events::StreamEvent;
use crate::source::SourceInner;

/// Stream state. Mirrors the source state for selected streams; unselected
/// streams stay [`StreamState::Inactive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Not selected; sample requests are rejected.
    Inactive,
    /// Selected but the source has not started it.
    Enabled,
    /// Selected and paused; requests queue but do not dispatch.
    Paused,
    /// Selected and running; requests dispatch as samples arrive.
    Running,
    /// Torn down. Terminal.
    Shutdown,
}

struct SampleRequest {
    token: Option<Token>,
}

struct DispatchState {
    state: StreamState,
    eos: bool,
    eos_notified: bool,
    pending_produced: usize,
    requests: VecDeque<SampleRequest>,
}

pub(crate) struct StreamInner {
    source: Weak<SourceInner>,
    descriptor: StreamDescriptor,
    events: EventQueue<StreamEvent>,
    dispatch: Mutex<DispatchState>,
    /// Whether the pipeline output for this stream is currently attached.
    /// Cleared when the pipeline removes the stream, restored on re-add.
    attached: AtomicBool,
}

impl StreamInner {
    pub(crate) fn new(source: &Arc<SourceInner>, descriptor: StreamDescriptor) -> Arc<Self> {
        Arc::new(Self {
            source: Arc::downgrade(source),
            descriptor,
            events: EventQueue::new(),
            dispatch: Mutex::new(DispatchState {
                state: StreamState::Inactive,
                eos: false,
                eos_notified: false,
                pending_produced: 0,
                requests: VecDeque::new(),
            }),
            attached: AtomicBool::new(true),
        })
    }

    pub(crate) fn id(&self) -> StreamId {
        self.descriptor.id()
    }

    pub(crate) fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub(crate) fn state(&self) -> StreamState {
        self.dispatch.lock().unwrap().state
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        self.dispatch.lock().unwrap().state = state;
    }

    /// Whether the pipeline has signaled end-of-stream. Read under the
    /// stream lock so the source-level end-of-presentation scan sees a
    /// consistent snapshot.
    pub(crate) fn eos_reached(&self) -> bool {
        self.dispatch.lock().unwrap().eos
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }

    pub(crate) fn notify_started(&self) {
        self.events.push(StreamEvent::Started);
    }

    fn pipeline(&self) -> Option<Arc<dyn DemuxPipeline>> {
        self.source.upgrade().and_then(|source| source.pipeline())
    }

    /// Enqueue a sample request and attempt dispatch inline.
    pub(crate) fn request_sample(&self, token: Option<Token>) -> Result<()> {
        let notify = {
            let mut st = self.dispatch.lock().unwrap();
            match st.state {
                StreamState::Shutdown => return Err(Error::Shutdown),
                StreamState::Inactive | StreamState::Enabled => {
                    tracing::warn!(stream = %self.id(), "sample requested on a stream that is not active");
                    return Err(Error::WrongState);
                }
                StreamState::Paused | StreamState::Running => {}
            }
            if st.eos && st.pending_produced == 0 {
                // The token passed in is dropped here: released without a
                // sample, as for any request that can never be satisfied.
                return Err(Error::EndOfStream);
            }
            st.requests.push_back(SampleRequest { token });
            self.dispatch_locked(&mut st)
        };
        self.notify_source_if(notify);
        Ok(())
    }

    /// Pipeline produced a sample (pipeline thread).
    pub(crate) fn notify_sample_produced(&self) {
        let notify = {
            let mut st = self.dispatch.lock().unwrap();
            if st.state == StreamState::Inactive {
                tracing::error!(stream = %self.id(), "sample produced on an inactive stream");
            }
            st.pending_produced += 1;
            self.dispatch_locked(&mut st)
        };
        self.notify_source_if(notify);
    }

    /// Pipeline signaled end-of-stream (pipeline thread).
    pub(crate) fn notify_end_of_stream(&self) {
        let notify = {
            let mut st = self.dispatch.lock().unwrap();
            st.eos = true;
            self.dispatch_locked(&mut st)
        };
        self.notify_source_if(notify);
    }

    /// Re-run dispatch, e.g. after the stream was flipped to running.
    pub(crate) fn run_dispatch(&self) {
        let notify = {
            let mut st = self.dispatch.lock().unwrap();
            self.dispatch_locked(&mut st)
        };
        self.notify_source_if(notify);
    }

    /// Walk the request queue in FIFO order, pairing each request with one
    /// produced sample. Returns whether the source must be told this stream
    /// just reached end-of-stream (delivered outside the lock).
    fn dispatch_locked(&self, st: &mut DispatchState) -> bool {
        if st.state != StreamState::Running && st.state != StreamState::Shutdown {
            return false;
        }

        while !st.requests.is_empty() {
            if st.state == StreamState::Shutdown || (st.eos && st.pending_produced == 0) {
                // Shutdown drains without delivering; exhausted EOS means no
                // sample will ever come. Either way the request's token is
                // released here.
                st.requests.pop_front();
                continue;
            }

            if st.pending_produced == 0 {
                break;
            }

            let Some(pipeline) = self.pipeline() else {
                break;
            };
            let Some(mut sample) = pipeline.pull_sample(self.id()) else {
                tracing::error!(stream = %self.id(), "pipeline claims a pending sample but none could be pulled");
                break;
            };
            let Some(request) = st.requests.pop_front() else {
                break;
            };

            if let Some(token) = request.token {
                sample.attach_token(token);
            }
            st.pending_produced -= 1;
            self.events.push(StreamEvent::SampleReady(sample));
        }

        if st.eos
            && st.pending_produced == 0
            && st.state == StreamState::Running
            && !st.eos_notified
        {
            st.eos_notified = true;
            self.events.push(StreamEvent::EndOfStream);
            return true;
        }
        false
    }

    fn notify_source_if(&self, stream_ended: bool) {
        if stream_ended {
            if let Some(source) = self.source.upgrade() {
                source.notify_stream_ended();
            }
        }
    }

    /// Tear the stream down. The state flip happens before unlinking so a
    /// late production callback cannot pull from an element that is gone.
    pub(crate) fn teardown(&self) {
        {
            let mut st = self.dispatch.lock().unwrap();
            if st.state == StreamState::Shutdown {
                return;
            }
            st.state = StreamState::Shutdown;
        }
        if self.attached.swap(false, Ordering::AcqRel) {
            if let Some(pipeline) = self.pipeline() {
                pipeline.unlink_stream(self.id());
            }
        }
        // Drains queued requests now that the state is terminal.
        self.run_dispatch();
        self.events.shutdown();
    }
}

/// Consumer handle to one elementary stream.
///
/// Cloning shares the underlying stream. The handle stays valid after the
/// source shuts down; operations then fail with [`Error::Shutdown`].
#[derive(Clone)]
pub struct Stream {
    pub(crate) inner: Arc<StreamInner>,
}

impl Stream {
    /// Get the stream's stable identifier.
    pub fn id(&self) -> StreamId {
        self.inner.id()
    }

    /// Get the stream's current state.
    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    /// Get a copy of the stream's descriptor.
    pub fn descriptor(&self) -> Result<StreamDescriptor> {
        if self.inner.state() == StreamState::Shutdown {
            return Err(Error::Shutdown);
        }
        Ok(self.inner.descriptor().clone())
    }

    /// Request the next sample.
    ///
    /// `token` travels with the request and comes back attached to the
    /// delivered sample; it is dropped if the request is discarded at
    /// shutdown or end-of-stream. Delivery may happen synchronously before
    /// this call returns.
    pub fn request_sample(&self, token: Option<Token>) -> Result<()> {
        self.inner.request_sample(token)
    }

    /// Wait for the next stream event.
    pub fn get_event(&self) -> Result<StreamEvent> {
        if self.inner.state() == StreamState::Shutdown {
            return Err(Error::Shutdown);
        }
        self.inner.events.next()
    }

    /// Wait for the next stream event, giving up after `timeout`.
    pub fn get_event_timeout(&self, timeout: Duration) -> Result<Option<StreamEvent>> {
        if self.inner.state() == StreamState::Shutdown {
            return Err(Error::Shutdown);
        }
        self.inner.events.next_timeout(timeout)
    }

    /// Take the next stream event without blocking.
    pub fn try_get_event(&self) -> Result<Option<StreamEvent>> {
        if self.inner.state() == StreamState::Shutdown {
            return Err(Error::Shutdown);
        }
        self.inner.events.try_next()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id())
            .field("state", &self.inner.state())
            .finish()
    }
}
