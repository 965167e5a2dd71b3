//! Consumer-facing capability traits.
//!
//! The playback client consumes the adapter through two small capability
//! sets, [`MediaSource`] and [`MediaStream`], implemented by the concrete
//! [`Source`] and [`Stream`] against the same underlying state. Code that
//! only needs the protocol can stay generic over these traits.

use std::time::Duration;

use crate::descriptor::{PresentationDescriptor, StreamDescriptor};
use crate::error::Result;
use crate::sample::Token;
use crate::source::{Source, SourceEvent, StartPosition, Stream, StreamEvent, TimeFormat};

/// Capability set of an opened media source.
pub trait MediaSource: Send + Sync {
    /// Get a clone of the presentation descriptor.
    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor>;

    /// Start the presentation with the given stream selection.
    fn start(
        &self,
        descriptor: &PresentationDescriptor,
        time_format: TimeFormat,
        start_position: StartPosition,
    ) -> Result<()>;

    /// Stop the presentation.
    fn stop(&self) -> Result<()>;

    /// Pause the presentation.
    fn pause(&self) -> Result<()>;

    /// Shut the source down, releasing all resources.
    fn shutdown(&self) -> Result<()>;

    /// Wait for the next source event.
    fn get_event(&self) -> Result<SourceEvent>;

    /// Wait for the next source event, giving up after `timeout`.
    fn get_event_timeout(&self, timeout: Duration) -> Result<Option<SourceEvent>>;

    /// Take the next source event without blocking.
    fn try_get_event(&self) -> Result<Option<SourceEvent>>;
}

/// Capability set of one elementary stream.
pub trait MediaStream: Send + Sync {
    /// Get a copy of the stream's descriptor.
    fn descriptor(&self) -> Result<StreamDescriptor>;

    /// Request the next sample, with an optional correlation token.
    fn request_sample(&self, token: Option<Token>) -> Result<()>;

    /// Wait for the next stream event.
    fn get_event(&self) -> Result<StreamEvent>;

    /// Wait for the next stream event, giving up after `timeout`.
    fn get_event_timeout(&self, timeout: Duration) -> Result<Option<StreamEvent>>;

    /// Take the next stream event without blocking.
    fn try_get_event(&self) -> Result<Option<StreamEvent>>;
}

impl MediaSource for Source {
    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor> {
        Source::create_presentation_descriptor(self)
    }

    fn start(
        &self,
        descriptor: &PresentationDescriptor,
        time_format: TimeFormat,
        start_position: StartPosition,
    ) -> Result<()> {
        Source::start(self, descriptor, time_format, start_position)
    }

    fn stop(&self) -> Result<()> {
        Source::stop(self)
    }

    fn pause(&self) -> Result<()> {
        Source::pause(self)
    }

    fn shutdown(&self) -> Result<()> {
        Source::shutdown(self)
    }

    fn get_event(&self) -> Result<SourceEvent> {
        Source::get_event(self)
    }

    fn get_event_timeout(&self, timeout: Duration) -> Result<Option<SourceEvent>> {
        Source::get_event_timeout(self, timeout)
    }

    fn try_get_event(&self) -> Result<Option<SourceEvent>> {
        Source::try_get_event(self)
    }
}

impl MediaStream for Stream {
    fn descriptor(&self) -> Result<StreamDescriptor> {
        Stream::descriptor(self)
    }

    fn request_sample(&self, token: Option<Token>) -> Result<()> {
        Stream::request_sample(self, token)
    }

    fn get_event(&self) -> Result<StreamEvent> {
        Stream::get_event(self)
    }

    fn get_event_timeout(&self, timeout: Duration) -> Result<Option<StreamEvent>> {
        Stream::get_event_timeout(self, timeout)
    }

    fn try_get_event(&self) -> Result<Option<StreamEvent>> {
        Stream::try_get_event(self)
    }
}
