//! Media type descriptions for demultiplexed elementary streams.
//!
//! The demultiplexing pipeline reports a [`MediaType`] for every elementary
//! stream it discovers. The adapter never inspects payloads itself; these
//! types only describe what the pipeline said a stream contains so the
//! consumer can decide which streams to select.

use std::fmt;

// ============================================================================
// Media Format
// ============================================================================

/// Format of an elementary stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    /// Encoded video (compressed).
    Video(VideoCodec),
    /// Encoded audio (compressed).
    Audio(AudioCodec),
    /// Subtitle / timed-text track.
    Subtitle(SubtitleFormat),
    /// Raw bytes (format unknown to the pipeline).
    Bytes,
}

impl MediaFormat {
    /// Check whether this is a video format.
    #[inline]
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    /// Check whether this is an audio format.
    #[inline]
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    /// Get a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Video(codec) => codec.name(),
            Self::Audio(codec) => codec.name(),
            Self::Subtitle(format) => format.name(),
            Self::Bytes => "bytes",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Video codecs a demuxed stream can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// VP8.
    Vp8,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
    /// MPEG-2 video.
    Mpeg2,
}

impl VideoCodec {
    /// Get a human-readable name for this codec.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Mpeg2 => "mpeg2",
        }
    }
}

/// Audio codecs a demuxed stream can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// AAC.
    Aac,
    /// MP3.
    Mp3,
    /// Opus.
    Opus,
    /// Vorbis.
    Vorbis,
    /// FLAC.
    Flac,
    /// AC-3 / Dolby Digital.
    Ac3,
}

impl AudioCodec {
    /// Get a human-readable name for this codec.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Flac => "flac",
            Self::Ac3 => "ac3",
        }
    }
}

/// Subtitle track formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubtitleFormat {
    /// Plain timed text.
    Text,
    /// SubStation Alpha / ASS.
    Ssa,
    /// DVD / PGS bitmap subtitles.
    Bitmap,
}

impl SubtitleFormat {
    /// Get a human-readable name for this format.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Ssa => "ssa",
            Self::Bitmap => "bitmap",
        }
    }
}

// ============================================================================
// Codec Data
// ============================================================================

/// Out-of-band codec initialization data (e.g., SPS/PPS for H.264).
///
/// Stored as an immutable boxed slice since it never changes after the
/// pipeline reports it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CodecData(Box<[u8]>);

impl CodecData {
    /// Create new codec data from bytes.
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        Self(data.into())
    }

    /// Get the data as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Get the length of the codec data.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CodecData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for CodecData {
    fn from(v: Vec<u8>) -> Self {
        Self(v.into_boxed_slice())
    }
}

impl From<&[u8]> for CodecData {
    fn from(s: &[u8]) -> Self {
        Self(s.into())
    }
}

impl fmt::Debug for CodecData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecData({} bytes)", self.0.len())
    }
}

// ============================================================================
// Media Type
// ============================================================================

/// Complete type description of one elementary stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaType {
    format: MediaFormat,
    codec_data: Option<CodecData>,
}

impl MediaType {
    /// Create a media type from a format.
    pub fn new(format: MediaFormat) -> Self {
        Self {
            format,
            codec_data: None,
        }
    }

    /// Create a video media type.
    pub fn video(codec: VideoCodec) -> Self {
        Self::new(MediaFormat::Video(codec))
    }

    /// Create an audio media type.
    pub fn audio(codec: AudioCodec) -> Self {
        Self::new(MediaFormat::Audio(codec))
    }

    /// Create a subtitle media type.
    pub fn subtitle(format: SubtitleFormat) -> Self {
        Self::new(MediaFormat::Subtitle(format))
    }

    /// Attach out-of-band codec data.
    pub fn with_codec_data(mut self, data: impl Into<CodecData>) -> Self {
        self.codec_data = Some(data.into());
        self
    }

    /// Get the stream format.
    #[inline]
    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    /// Get the codec data, if any.
    #[inline]
    pub fn codec_data(&self) -> Option<&CodecData> {
        self.codec_data.as_ref()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_kind_checks() {
        assert!(MediaFormat::Video(VideoCodec::H264).is_video());
        assert!(!MediaFormat::Video(VideoCodec::H264).is_audio());
        assert!(MediaFormat::Audio(AudioCodec::Aac).is_audio());
        assert!(!MediaFormat::Bytes.is_video());
    }

    #[test]
    fn test_media_type_builders() {
        let ty = MediaType::video(VideoCodec::H264).with_codec_data(vec![0x67, 0x42]);
        assert_eq!(ty.format(), &MediaFormat::Video(VideoCodec::H264));
        assert_eq!(ty.codec_data().unwrap().as_slice(), &[0x67, 0x42]);

        let ty = MediaType::audio(AudioCodec::Opus);
        assert!(ty.codec_data().is_none());
        assert_eq!(format!("{}", ty), "opus");
    }

    #[test]
    fn test_codec_data_debug_hides_contents() {
        let data = CodecData::from(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", data), "CodecData(3 bytes)");
        assert_eq!(data.len(), 3);
        assert!(!data.is_empty());
    }
}
