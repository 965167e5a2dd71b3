//! Error types for Aperture.

use thiserror::Error;

/// Result type alias using Aperture's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Aperture operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The source or stream has been shut down. Also returned by a second
    /// call to shutdown, which is a caller error.
    #[error("object has been shut down")]
    Shutdown,

    /// Stream discovery has not completed for this source.
    #[error("source is not initialized")]
    NotInitialized,

    /// The operation is not valid in the object's current state.
    #[error("stream is not active")]
    WrongState,

    /// The stream has ended and no produced samples remain.
    #[error("end of stream")]
    EndOfStream,

    /// Only the default time format and start position are supported.
    #[error("unsupported time format")]
    UnsupportedTimeFormat,

    /// The requested operation is not implemented.
    #[error("not implemented")]
    NotImplemented,

    /// A stream index outside the presentation descriptor's range.
    #[error("stream index {0} out of range")]
    InvalidStreamIndex(usize),

    /// No creation request matches the given ticket, or its result was
    /// already retrieved or cancelled.
    #[error("no creation result matches the given ticket")]
    UnknownTicket,

    /// The background creation work has not completed yet.
    #[error("object creation has not completed")]
    CreationPending,

    /// A query the byte-stream bridge cannot answer.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(&'static str),

    /// Failure reported by the demultiplexing pipeline.
    #[error("pipeline failure: {0}")]
    Pipeline(String),

    /// I/O error from the backing storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
