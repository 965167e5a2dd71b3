//! # Aperture
//!
//! An asynchronous media source adapter: exposes a demultiplexed media
//! container through a pull-style, per-stream sample-request protocol.
//!
//! An external pipeline parses the container and produces samples on its
//! own worker threads whenever capacity allows; the playback client
//! requests samples one at a time from its own thread and expects strictly
//! ordered, exactly-once delivery. Aperture sits between the two and
//! reconciles their flow-control models, with shutdown, pause, and
//! dynamically appearing streams handled correctly.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aperture::prelude::*;
//!
//! let storage = Box::new(FileStorage::open("movie.mkv")?);
//! let source = Source::open(storage, &backend)?;
//!
//! let mut selection = source.create_presentation_descriptor()?;
//! selection.select_stream(0)?;
//! source.start(&selection, TimeFormat::Default, StartPosition::Current)?;
//!
//! // Streams arrive as events; request samples one at a time.
//! if let SourceEvent::NewStream(stream) = source.get_event()? {
//!     stream.request_sample(Some(Token::new(1u32)))?;
//!     match stream.get_event()? {
//!         StreamEvent::SampleReady(sample) => println!("{} bytes", sample.len()),
//!         other => println!("{}", other.name()),
//!     }
//! }
//!
//! source.shutdown()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bytestream;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
pub mod sample;
pub mod source;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::api::{MediaSource, MediaStream};
    pub use crate::bytestream::{ByteStorage, FileStorage, MemoryStorage};
    pub use crate::descriptor::{PresentationDescriptor, StreamDescriptor, StreamId};
    pub use crate::error::{Error, Result};
    pub use crate::format::{AudioCodec, MediaFormat, MediaType, VideoCodec};
    pub use crate::sample::{Sample, Token};
    pub use crate::source::{
        Source, SourceEvent, StartPosition, Stream, StreamEvent, TimeFormat,
    };
}

pub use error::{Error, Result};
