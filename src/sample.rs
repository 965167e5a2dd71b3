//! Sample and request-token types.
//!
//! A [`Sample`] is one unit of demultiplexed (still compressed) media data
//! plus its timing metadata. A [`Token`] is the opaque correlation value a
//! consumer attaches to a sample request; it travels with the request and is
//! returned unchanged on the delivered sample, or dropped when the request
//! is discarded. Ownership guarantees it is released exactly once.

use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::time::Duration;

use crate::descriptor::StreamId;

// ============================================================================
// Token
// ============================================================================

/// Opaque caller-supplied correlation value for a sample request.
pub struct Token(Box<dyn Any + Send>);

impl Token {
    /// Wrap an arbitrary value as a request token.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Recover the wrapped value, returning the token unchanged if the type
    /// does not match.
    pub fn downcast<T: Any>(self) -> std::result::Result<Box<T>, Token> {
        self.0.downcast::<T>().map_err(Token)
    }

    /// Borrow the wrapped value if it has the given type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

// ============================================================================
// Sample
// ============================================================================

/// One demultiplexed media sample with timing metadata.
#[derive(Debug)]
pub struct Sample {
    stream_id: StreamId,
    data: Bytes,
    pts: Option<Duration>,
    dts: Option<Duration>,
    duration: Option<Duration>,
    sequence: u64,
    sync_point: bool,
    token: Option<Token>,
}

impl Sample {
    /// Create a sample for a stream from a payload.
    pub fn new(stream_id: StreamId, data: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            data: data.into(),
            pts: None,
            dts: None,
            duration: None,
            sequence: 0,
            sync_point: false,
            token: None,
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the decode timestamp.
    pub fn with_dts(mut self, dts: Duration) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Set the sample duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the monotonic sequence number within the stream.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Mark this sample as a sync point (keyframe equivalent).
    pub fn with_sync_point(mut self, sync_point: bool) -> Self {
        self.sync_point = sync_point;
        self
    }

    /// Get the stream this sample belongs to.
    #[inline]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Get the payload.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Get the payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the presentation timestamp.
    #[inline]
    pub fn pts(&self) -> Option<Duration> {
        self.pts
    }

    /// Get the decode timestamp.
    #[inline]
    pub fn dts(&self) -> Option<Duration> {
        self.dts
    }

    /// Get the sample duration.
    #[inline]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Get the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Check whether this sample is a sync point.
    #[inline]
    pub fn is_sync_point(&self) -> bool {
        self.sync_point
    }

    /// Attach a request token to this sample.
    pub fn attach_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// Borrow the attached token, if any.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Take the attached token out of the sample.
    pub fn take_token(&mut self) -> Option<Token> {
        self.token.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_builders() {
        let sample = Sample::new(StreamId(3), vec![1u8, 2, 3])
            .with_pts(Duration::from_millis(40))
            .with_duration(Duration::from_millis(20))
            .with_sequence(7)
            .with_sync_point(true);

        assert_eq!(sample.stream_id(), StreamId(3));
        assert_eq!(sample.len(), 3);
        assert_eq!(sample.pts(), Some(Duration::from_millis(40)));
        assert_eq!(sample.dts(), None);
        assert_eq!(sample.sequence(), 7);
        assert!(sample.is_sync_point());
    }

    #[test]
    fn test_token_roundtrip() {
        let token = Token::new(42u32);
        assert_eq!(token.downcast_ref::<u32>(), Some(&42));
        assert!(token.downcast_ref::<String>().is_none());

        let value = token.downcast::<u32>().unwrap();
        assert_eq!(*value, 42);
    }

    #[test]
    fn test_token_downcast_wrong_type_returns_token() {
        let token = Token::new("tag");
        let token = token.downcast::<u64>().unwrap_err();
        assert_eq!(token.downcast_ref::<&str>(), Some(&"tag"));
    }

    #[test]
    fn test_attach_and_take_token() {
        let mut sample = Sample::new(StreamId(0), Bytes::new());
        assert!(sample.token().is_none());

        sample.attach_token(Token::new(9u8));
        assert!(sample.token().is_some());

        let token = sample.take_token().unwrap();
        assert_eq!(*token.downcast::<u8>().unwrap(), 9);
        assert!(sample.token().is_none());
    }
}
