//! Event-queue and work-queue runtime primitives.
//!
//! [`EventQueue`] delivers typed notifications to the consumer: producers
//! push from any thread, the consumer pulls (blocking, with timeout, or
//! non-blocking). The queue is internally synchronized, so it is safe to
//! push while holding other locks; it never calls back into the pusher.
//!
//! [`WorkQueue`] is a single background worker that runs queued closures in
//! submission order, used for out-of-band object construction.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Event Queue
// ============================================================================

struct QueueState<T> {
    queue: VecDeque<T>,
    shut_down: bool,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

/// FIFO notification queue with a terminal shutdown state.
///
/// After [`EventQueue::shutdown`] all pending events are discarded, waiters
/// wake with [`Error::Shutdown`], and further pushes are dropped.
pub struct EventQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> EventQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    shut_down: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Queue an event.
    ///
    /// Returns `false` if the queue has been shut down (the event is
    /// dropped).
    pub fn push(&self, event: T) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if state.shut_down {
            return false;
        }
        state.queue.push_back(event);
        self.inner.available.notify_one();
        true
    }

    /// Wait for the next event.
    pub fn next(&self) -> Result<T> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if state.shut_down {
                return Err(Error::Shutdown);
            }
            if let Some(event) = state.queue.pop_front() {
                return Ok(event);
            }
            state = self.inner.available.wait(state).unwrap();
        }
    }

    /// Wait for the next event, giving up after `timeout`.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if state.shut_down {
                return Err(Error::Shutdown);
            }
            if let Some(event) = state.queue.pop_front() {
                return Ok(Some(event));
            }
            let (next, wait) = self.inner.available.wait_timeout(state, timeout).unwrap();
            state = next;
            if wait.timed_out() {
                if state.shut_down {
                    return Err(Error::Shutdown);
                }
                return Ok(state.queue.pop_front());
            }
        }
    }

    /// Take the next event without blocking.
    pub fn try_next(&self) -> Result<Option<T>> {
        let mut state = self.inner.state.lock().unwrap();
        if state.shut_down {
            return Err(Error::Shutdown);
        }
        Ok(state.queue.pop_front())
    }

    /// Shut the queue down: discard pending events and wake all waiters.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.shut_down = true;
        state.queue.clear();
        self.inner.available.notify_all();
    }

    /// Check whether the queue has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().unwrap().shut_down
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Work Queue
// ============================================================================

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded background work queue.
///
/// Jobs run in submission order on a dedicated worker thread. Dropping the
/// queue stops accepting jobs, drains what was already queued, and joins
/// the worker.
pub struct WorkQueue {
    sender: Option<kanal::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl WorkQueue {
    /// Spawn the worker thread.
    pub fn new(name: &str) -> io::Result<Self> {
        let (sender, receiver) = kanal::unbounded::<Job>();
        let worker = thread::Builder::new().name(name.to_owned()).spawn(move || {
            while let Ok(job) = receiver.recv() {
                job();
            }
        })?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue a job for the worker.
    ///
    /// Returns `false` if the queue is no longer accepting work.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Stop accepting jobs and wait for the worker to drain and exit.
    pub fn join(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.join();
    }
}
