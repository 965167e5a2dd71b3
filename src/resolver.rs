//! Asynchronous source creation: the begin/end object-creation bridge.
//!
//! Opening a container blocks on pipeline discovery, so the resolver moves
//! that work off the caller's thread: `begin_create_object` captures the
//! request, schedules construction on a background work queue, and returns
//! a [`CreationTicket`]. When the completion callback fires, the caller
//! retrieves the result exactly once with `end_create_object`, or cancels
//! with `cancel_object_creation` — a result produced after cancellation is
//! released, never delivered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::bytestream::ByteStorage;
use crate::error::{Error, Result};
use crate::pipeline::DemuxBackend;
use crate::runtime::WorkQueue;
use crate::source::Source;

// ============================================================================
// Request surface
// ============================================================================

/// Correlation ticket for an in-flight creation request. Doubles as the
/// cancel cookie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CreationTicket(u64);

/// Kind tag of a created object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// A media source.
    MediaSource,
}

/// A successfully created object.
#[derive(Debug)]
pub enum CreatedObject {
    /// A media source over the supplied storage.
    MediaSource(Source),
}

/// What the caller wants resolved from the storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveFlags {
    /// Resolve a media source. The only implemented resolution.
    pub media_source: bool,
}

impl ResolveFlags {
    /// Flags requesting media source resolution.
    pub fn media_source() -> Self {
        Self { media_source: true }
    }
}

/// Value in a creation request's property bag.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

/// Opaque configuration properties passed along with a creation request.
pub type PropertyBag = Vec<(String, PropertyValue)>;

/// Callback invoked once a creation request has an outcome stored.
pub type CompletionCallback = Box<dyn FnOnce(CreationTicket) + Send>;

type Outcome = Result<(ObjectKind, CreatedObject)>;

enum Slot {
    Pending,
    Ready(Outcome),
    Cancelled,
}

// ============================================================================
// Resolver
// ============================================================================

struct SlotTable {
    next_ticket: u64,
    entries: HashMap<u64, Slot>,
}

struct ResolverInner {
    backend: Arc<dyn DemuxBackend>,
    slots: Mutex<SlotTable>,
}

/// Asynchronous factory turning byte storage into media sources.
pub struct SourceResolver {
    inner: Arc<ResolverInner>,
    queue: WorkQueue,
}

impl SourceResolver {
    /// Create a resolver constructing sources over `backend`.
    pub fn new(backend: Arc<dyn DemuxBackend>) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(ResolverInner {
                backend,
                slots: Mutex::new(SlotTable {
                    next_ticket: 1,
                    entries: HashMap::new(),
                }),
            }),
            queue: WorkQueue::new("aperture-resolver")?,
        })
    }

    /// Begin asynchronous object creation.
    ///
    /// The request context is captured immutably; construction runs on the
    /// resolver's background worker. `on_complete` fires once the outcome
    /// is stored. The returned ticket retrieves or cancels the request.
    pub fn begin_create_object(
        &self,
        storage: Box<dyn ByteStorage>,
        url: Option<&str>,
        flags: ResolveFlags,
        properties: PropertyBag,
        on_complete: CompletionCallback,
    ) -> Result<CreationTicket> {
        let ticket = {
            let mut slots = self.inner.slots.lock().unwrap();
            let id = slots.next_ticket;
            slots.next_ticket += 1;
            slots.entries.insert(id, Slot::Pending);
            CreationTicket(id)
        };

        let inner = Arc::clone(&self.inner);
        let url = url.map(str::to_owned);
        let dispatched = self.queue.dispatch(move || {
            let outcome = inner.create_object(storage, url.as_deref(), flags, &properties);
            inner.complete(ticket, outcome, on_complete);
        });

        if !dispatched {
            self.inner.slots.lock().unwrap().entries.remove(&ticket.0);
            return Err(Error::Shutdown);
        }
        Ok(ticket)
    }

    /// Retrieve a completed creation result. Each result can be retrieved
    /// exactly once.
    pub fn end_create_object(&self, ticket: CreationTicket) -> Outcome {
        let mut slots = self.inner.slots.lock().unwrap();
        match slots.entries.get(&ticket.0) {
            None | Some(Slot::Cancelled) => Err(Error::UnknownTicket),
            Some(Slot::Pending) => Err(Error::CreationPending),
            Some(Slot::Ready(_)) => match slots.entries.remove(&ticket.0) {
                Some(Slot::Ready(outcome)) => outcome,
                _ => Err(Error::UnknownTicket),
            },
        }
    }

    /// Cancel a creation request by ticket.
    ///
    /// A result that has already been produced is released; one produced
    /// later is released as soon as the worker stores it. Either way it is
    /// never delivered to the caller.
    pub fn cancel_object_creation(&self, ticket: CreationTicket) -> Result<()> {
        let ready = {
            let mut slots = self.inner.slots.lock().unwrap();
            match slots.entries.get_mut(&ticket.0) {
                None | Some(Slot::Cancelled) => return Err(Error::UnknownTicket),
                Some(slot @ Slot::Pending) => {
                    *slot = Slot::Cancelled;
                    None
                }
                Some(Slot::Ready(_)) => match slots.entries.remove(&ticket.0) {
                    Some(Slot::Ready(outcome)) => Some(outcome),
                    _ => None,
                },
            }
        };
        if let Some(outcome) = ready {
            ResolverInner::release(outcome);
        }
        Ok(())
    }
}

impl Drop for SourceResolver {
    fn drop(&mut self) {
        // Let in-flight construction finish, then release anything the
        // caller never retrieved.
        self.queue.join();
        let entries = std::mem::take(&mut self.inner.slots.lock().unwrap().entries);
        for (_, slot) in entries {
            if let Slot::Ready(outcome) = slot {
                ResolverInner::release(outcome);
            }
        }
    }
}

impl ResolverInner {
    fn create_object(
        &self,
        storage: Box<dyn ByteStorage>,
        url: Option<&str>,
        flags: ResolveFlags,
        _properties: &PropertyBag,
    ) -> Outcome {
        if !flags.media_source {
            tracing::warn!(?flags, "only media source resolution is implemented");
            return Err(Error::NotImplemented);
        }
        if let Some(url) = url {
            tracing::debug!(url, demuxer = self.backend.name(), "resolving media source");
        }
        let source = Source::open(storage, self.backend.as_ref())?;
        Ok((ObjectKind::MediaSource, CreatedObject::MediaSource(source)))
    }

    /// Store the outcome for `ticket` and notify the caller — unless the
    /// request was cancelled in the meantime, in which case the outcome is
    /// released here.
    fn complete(&self, ticket: CreationTicket, outcome: Outcome, on_complete: CompletionCallback) {
        let mut slots = self.slots.lock().unwrap();
        match slots.entries.get_mut(&ticket.0) {
            Some(slot @ Slot::Pending) => {
                *slot = Slot::Ready(outcome);
                drop(slots);
                on_complete(ticket);
            }
            Some(Slot::Cancelled) => {
                slots.entries.remove(&ticket.0);
                drop(slots);
                Self::release(outcome);
            }
            _ => {
                drop(slots);
                tracing::warn!(ticket = ticket.0, "completion for an unknown ticket");
                Self::release(outcome);
            }
        }
    }

    /// Release an outcome that will never reach the caller. A constructed
    /// source still has a live pipeline; shut it down before dropping.
    fn release(outcome: Outcome) {
        if let Ok((_, CreatedObject::MediaSource(source))) = outcome {
            if let Err(err) = source.shutdown() {
                tracing::warn!(error = %err, "failed to shut down undelivered source");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_flags() {
        assert!(ResolveFlags::media_source().media_source);
        assert!(!ResolveFlags::default().media_source);
    }

    #[test]
    fn test_end_unknown_ticket() {
        let backend = Arc::new(crate::pipeline::testing::ScriptedDemux::new());
        let resolver = SourceResolver::new(backend).unwrap();
        assert!(matches!(
            resolver.end_create_object(CreationTicket(99)),
            Err(Error::UnknownTicket)
        ));
    }

    #[test]
    fn test_cancel_unknown_ticket() {
        let backend = Arc::new(crate::pipeline::testing::ScriptedDemux::new());
        let resolver = SourceResolver::new(backend).unwrap();
        assert!(matches!(
            resolver.cancel_object_creation(CreationTicket(7)),
            Err(Error::UnknownTicket)
        ));
    }
}
