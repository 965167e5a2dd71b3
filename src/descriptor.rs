//! Stream and presentation descriptors.
//!
//! A [`StreamDescriptor`] is the immutable identity + type of one discovered
//! elementary stream. A [`PresentationDescriptor`] is the snapshot of all of
//! them, built once when discovery completes; the consumer clones it, marks
//! streams selected, and hands it back to start playback.

use smallvec::SmallVec;
use std::fmt;

use crate::error::{Error, Result};
use crate::format::MediaType;

// ============================================================================
// Stream Identity
// ============================================================================

/// Stable elementary-stream identifier assigned by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Create a new stream ID.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<StreamId> for u32 {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Stream Descriptor
// ============================================================================

/// Identity and media type of one elementary stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
    id: StreamId,
    media_type: MediaType,
}

impl StreamDescriptor {
    /// Create a descriptor for a stream.
    pub fn new(id: StreamId, media_type: MediaType) -> Self {
        Self { id, media_type }
    }

    /// Get the stream identifier.
    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get the stream's media type.
    #[inline]
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }
}

// ============================================================================
// Presentation Descriptor
// ============================================================================

#[derive(Clone, Debug)]
struct PresentationEntry {
    selected: bool,
    descriptor: StreamDescriptor,
}

/// Immutable snapshot of every discovered stream, with per-stream selection.
///
/// Entries keep discovery order. Cloning yields an independent copy; the
/// selection flags of a clone never affect the source's own descriptor.
/// Streams start deselected.
#[derive(Clone, Debug)]
pub struct PresentationDescriptor {
    entries: SmallVec<[PresentationEntry; 2]>,
}

impl PresentationDescriptor {
    /// Build a descriptor from stream descriptors in discovery order.
    pub fn new(descriptors: impl IntoIterator<Item = StreamDescriptor>) -> Self {
        Self {
            entries: descriptors
                .into_iter()
                .map(|descriptor| PresentationEntry {
                    selected: false,
                    descriptor,
                })
                .collect(),
        }
    }

    /// Number of streams in the presentation.
    #[inline]
    pub fn stream_count(&self) -> usize {
        self.entries.len()
    }

    /// Check if the presentation has no streams.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a stream's selection flag and descriptor by index.
    pub fn stream(&self, index: usize) -> Option<(bool, &StreamDescriptor)> {
        self.entries
            .get(index)
            .map(|entry| (entry.selected, &entry.descriptor))
    }

    /// Mark the stream at `index` selected.
    pub fn select_stream(&mut self, index: usize) -> Result<()> {
        self.set_selected(index, true)
    }

    /// Mark the stream at `index` deselected.
    pub fn deselect_stream(&mut self, index: usize) -> Result<()> {
        self.set_selected(index, false)
    }

    fn set_selected(&mut self, index: usize, selected: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(Error::InvalidStreamIndex(index))?;
        entry.selected = selected;
        Ok(())
    }

    /// Iterate over `(selected, descriptor)` pairs in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (bool, &StreamDescriptor)> {
        self.entries
            .iter()
            .map(|entry| (entry.selected, &entry.descriptor))
    }

    /// Iterate over the descriptors of selected streams only.
    pub fn selected_streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.entries
            .iter()
            .filter(|entry| entry.selected)
            .map(|entry| &entry.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioCodec, VideoCodec};

    fn two_streams() -> PresentationDescriptor {
        PresentationDescriptor::new([
            StreamDescriptor::new(StreamId(1), MediaType::video(VideoCodec::H264)),
            StreamDescriptor::new(StreamId(2), MediaType::audio(AudioCodec::Aac)),
        ])
    }

    #[test]
    fn test_streams_start_deselected() {
        let pd = two_streams();
        assert_eq!(pd.stream_count(), 2);
        assert!(pd.iter().all(|(selected, _)| !selected));
        assert_eq!(pd.selected_streams().count(), 0);
    }

    #[test]
    fn test_select_and_deselect() {
        let mut pd = two_streams();
        pd.select_stream(0).unwrap();
        assert!(pd.stream(0).unwrap().0);
        assert!(!pd.stream(1).unwrap().0);
        assert_eq!(pd.selected_streams().count(), 1);

        pd.deselect_stream(0).unwrap();
        assert_eq!(pd.selected_streams().count(), 0);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut pd = two_streams();
        assert!(matches!(
            pd.select_stream(5),
            Err(Error::InvalidStreamIndex(5))
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let pd = two_streams();
        let mut copy = pd.clone();
        copy.select_stream(1).unwrap();

        assert_eq!(copy.selected_streams().count(), 1);
        assert_eq!(pd.selected_streams().count(), 0);
    }

    #[test]
    fn test_discovery_order_preserved() {
        let pd = two_streams();
        let ids: Vec<StreamId> = pd.iter().map(|(_, d)| d.id()).collect();
        assert_eq!(ids, vec![StreamId(1), StreamId(2)]);
    }
}
