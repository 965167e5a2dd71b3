//! Integration tests for the source/stream state machines.
//!
//! These drive a [`ScriptedDemux`] backend by hand: discovery, sample
//! production, end-of-stream, removal/re-add, and failure delivery all
//! happen exactly when the test says so, which makes the request/dispatch
//! interleavings deterministic.

use aperture::api::{MediaSource, MediaStream};
use aperture::bytestream::MemoryStorage;
use aperture::descriptor::StreamId;
use aperture::error::Error;
use aperture::format::{AudioCodec, MediaType, VideoCodec};
use aperture::pipeline::testing::{ScriptedDemux, ScriptedPipeline};
use aperture::pipeline::PipelineState;
use aperture::sample::{Sample, Token};
use aperture::source::{
    Source, SourceEvent, SourceState, StartPosition, Stream, StreamEvent, StreamState, TimeFormat,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn storage() -> Box<MemoryStorage> {
    Box::new(MemoryStorage::new(vec![0u8; 256]))
}

fn av_backend() -> ScriptedDemux {
    ScriptedDemux::new()
        .with_stream(StreamId(1), MediaType::video(VideoCodec::H264))
        .with_stream(StreamId(2), MediaType::audio(AudioCodec::Aac))
}

fn open_av_source() -> (Source, Arc<ScriptedPipeline>) {
    let backend = av_backend();
    let source = Source::open(storage(), &backend).unwrap();
    let pipeline = backend.pipeline().unwrap();
    (source, pipeline)
}

/// Select every stream and start; returns the activated stream handles in
/// event order after draining the `Started` event from each.
fn start_all(source: &Source) -> Vec<Stream> {
    let mut descriptor = source.create_presentation_descriptor().unwrap();
    for index in 0..descriptor.stream_count() {
        descriptor.select_stream(index).unwrap();
    }
    source
        .start(&descriptor, TimeFormat::Default, StartPosition::Current)
        .unwrap();
    collect_activated(source)
}

fn collect_activated(source: &Source) -> Vec<Stream> {
    let mut streams = Vec::new();
    loop {
        match source.try_get_event().unwrap() {
            Some(SourceEvent::NewStream(stream)) | Some(SourceEvent::UpdatedStream(stream)) => {
                streams.push(stream);
            }
            Some(SourceEvent::Started) | None => break,
            Some(_) => {}
        }
    }
    for stream in &streams {
        assert!(matches!(
            stream.try_get_event().unwrap(),
            Some(StreamEvent::Started)
        ));
    }
    streams
}

fn sample_for(id: StreamId, sequence: u64) -> Sample {
    Sample::new(id, vec![0u8; 32]).with_sequence(sequence)
}

/// Token payload that counts its own drops, for exactly-once accounting.
struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn tracked_token(drops: &Arc<AtomicUsize>) -> Token {
    Token::new(Tracked(Arc::clone(drops)))
}

// ============================================================================
// Construction and discovery
// ============================================================================

#[test]
fn test_discovery_builds_presentation() {
    let (source, pipeline) = open_av_source();

    assert_eq!(source.state(), SourceState::Stopped);
    let descriptor = source.create_presentation_descriptor().unwrap();
    assert_eq!(descriptor.stream_count(), 2);

    let ids: Vec<StreamId> = descriptor.iter().map(|(_, d)| d.id()).collect();
    assert_eq!(ids, vec![StreamId(1), StreamId(2)]);

    // Discovery ran the pipeline, then idled it until start.
    assert_eq!(
        pipeline.state_log(),
        vec![PipelineState::Playing, PipelineState::Ready]
    );

    source.shutdown().unwrap();
}

#[test]
fn test_presentation_clone_is_independent_of_source_copy() {
    let (source, _pipeline) = open_av_source();

    let mut first = source.create_presentation_descriptor().unwrap();
    first.select_stream(0).unwrap();

    let second = source.create_presentation_descriptor().unwrap();
    assert_eq!(second.selected_streams().count(), 0);

    source.shutdown().unwrap();
}

#[test]
fn test_threaded_discovery_blocks_constructor() {
    let backend = ScriptedDemux::new()
        .with_stream(StreamId(7), MediaType::audio(AudioCodec::Opus))
        .with_threaded_discovery();

    // open returns only after the discovery thread has reported.
    let source = Source::open(storage(), &backend).unwrap();
    let descriptor = source.create_presentation_descriptor().unwrap();
    assert_eq!(descriptor.stream_count(), 1);

    source.shutdown().unwrap();
}

#[test]
fn test_open_fails_on_discovery_error() {
    let backend = av_backend().with_discovery_error("corrupt container");

    match Source::open(storage(), &backend) {
        Err(Error::Pipeline(message)) => assert!(message.contains("corrupt container")),
        other => panic!("expected pipeline error, got {:?}", other.map(|_| ())),
    }

    // Partially created state was unwound.
    assert_eq!(backend.pipeline().unwrap().state(), PipelineState::Null);
}

#[test]
fn test_open_fails_when_backend_open_fails() {
    let backend = av_backend().with_open_failure();
    assert!(matches!(
        Source::open(storage(), &backend),
        Err(Error::Pipeline(_))
    ));
}

// ============================================================================
// Start
// ============================================================================

#[test]
fn test_start_activates_selected_streams() {
    let (source, pipeline) = open_av_source();

    let mut descriptor = source.create_presentation_descriptor().unwrap();
    descriptor.select_stream(0).unwrap();
    source
        .start(&descriptor, TimeFormat::Default, StartPosition::Current)
        .unwrap();

    let streams = collect_activated(&source);
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].id(), StreamId(1));
    assert_eq!(streams[0].state(), StreamState::Running);

    // The deselected stream stays inactive.
    let all = source.streams().unwrap();
    let audio = all.iter().find(|s| s.id() == StreamId(2)).unwrap();
    assert_eq!(audio.state(), StreamState::Inactive);

    assert_eq!(source.state(), SourceState::Running);
    assert_eq!(pipeline.state(), PipelineState::Playing);

    source.shutdown().unwrap();
}

#[test]
fn test_restart_emits_updated_stream() {
    let (source, _pipeline) = open_av_source();

    let streams = start_all(&source);
    assert_eq!(streams.len(), 2);

    // Starting again with the same selection reports updated streams.
    let mut descriptor = source.create_presentation_descriptor().unwrap();
    descriptor.select_stream(0).unwrap();
    descriptor.select_stream(1).unwrap();
    source
        .start(&descriptor, TimeFormat::Default, StartPosition::Current)
        .unwrap();

    let mut updated = 0;
    loop {
        match source.try_get_event().unwrap() {
            Some(SourceEvent::UpdatedStream(_)) => updated += 1,
            Some(SourceEvent::NewStream(_)) => panic!("active stream reported as new"),
            Some(SourceEvent::Started) | None => break,
            Some(_) => {}
        }
    }
    assert_eq!(updated, 2);

    source.shutdown().unwrap();
}

#[test]
fn test_start_rejects_time_format_after_activation_side_effects() {
    let (source, _pipeline) = open_av_source();

    let mut descriptor = source.create_presentation_descriptor().unwrap();
    descriptor.select_stream(0).unwrap();

    let result = source.start(&descriptor, TimeFormat::Custom(4), StartPosition::Current);
    assert!(matches!(result, Err(Error::UnsupportedTimeFormat)));

    // The activation side effects were already committed when the call
    // failed: the stream event and state flip are observable.
    let streams = collect_activated(&source);
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].state(), StreamState::Running);

    // But the source itself never transitioned.
    assert_eq!(source.state(), SourceState::Stopped);

    source.shutdown().unwrap();
}

#[test]
fn test_start_rejects_explicit_start_position() {
    let (source, _pipeline) = open_av_source();

    let descriptor = source.create_presentation_descriptor().unwrap();
    let result = source.start(
        &descriptor,
        TimeFormat::Default,
        StartPosition::At(Duration::from_secs(5)),
    );
    assert!(matches!(result, Err(Error::UnsupportedTimeFormat)));

    source.shutdown().unwrap();
}

#[test]
fn test_stop_and_pause_not_implemented() {
    let (source, _pipeline) = open_av_source();
    assert!(matches!(source.stop(), Err(Error::NotImplemented)));
    assert!(matches!(source.pause(), Err(Error::NotImplemented)));
    source.shutdown().unwrap();
}

// ============================================================================
// Sample requests and dispatch
// ============================================================================

#[test]
fn test_request_on_inactive_stream_fails_without_side_effects() {
    let (source, pipeline) = open_av_source();

    let streams = source.streams().unwrap();
    let video = &streams[0];
    assert_eq!(video.state(), StreamState::Inactive);

    let drops = Arc::new(AtomicUsize::new(0));
    let result = video.request_sample(Some(tracked_token(&drops)));
    assert!(matches!(result, Err(Error::WrongState)));

    // The token was still released, and nothing was queued or pulled.
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.queued(StreamId(1)), 0);
    assert!(video.try_get_event().unwrap().is_none());

    source.shutdown().unwrap();
}

#[test]
fn test_sample_delivery_pairs_requests_fifo() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    // Two requests queued before any production.
    video.request_sample(Some(Token::new(10u32))).unwrap();
    video.request_sample(Some(Token::new(11u32))).unwrap();
    assert!(video.try_get_event().unwrap().is_none());

    pipeline.push_sample(sample_for(StreamId(1), 0));
    pipeline.push_sample(sample_for(StreamId(1), 1));

    for expected in [10u32, 11u32] {
        match video.get_event().unwrap() {
            StreamEvent::SampleReady(mut sample) => {
                let token = sample.take_token().unwrap();
                assert_eq!(*token.downcast::<u32>().unwrap(), expected);
            }
            other => panic!("expected sample, got {}", other.name()),
        }
    }

    source.shutdown().unwrap();
}

#[test]
fn test_production_before_request_delivers_inline() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    pipeline.push_sample(sample_for(StreamId(1), 0));
    assert!(video.try_get_event().unwrap().is_none());

    // The request is satisfied synchronously from the pending sample.
    video.request_sample(None).unwrap();
    match video.try_get_event().unwrap() {
        Some(StreamEvent::SampleReady(sample)) => {
            assert_eq!(sample.sequence(), 0);
            assert!(sample.token().is_none());
        }
        other => panic!("expected inline sample, got {:?}", other.map(|e| e.name())),
    }

    source.shutdown().unwrap();
}

#[test]
fn test_tokens_released_exactly_once_under_interleaving() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    let total = 64u64;

    let producer = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            for sequence in 0..total {
                pipeline.push_sample(sample_for(StreamId(1), sequence));
                if sequence % 8 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };

    for _ in 0..total {
        video.request_sample(Some(tracked_token(&drops))).unwrap();
    }
    producer.join().unwrap();

    let mut sequences = Vec::new();
    for _ in 0..total {
        match video.get_event_timeout(Duration::from_secs(2)).unwrap() {
            Some(StreamEvent::SampleReady(mut sample)) => {
                assert!(sample.take_token().is_some(), "token delivered with sample");
                sequences.push(sample.sequence());
            }
            other => panic!("expected sample, got {:?}", other.map(|e| e.name())),
        }
    }

    // Samples were consumed in production order, one per request.
    let expected: Vec<u64> = (0..total).collect();
    assert_eq!(sequences, expected);

    // Every token was dropped exactly once (delivered, then dropped above).
    assert_eq!(drops.load(Ordering::SeqCst), total as usize);

    source.shutdown().unwrap();
}

#[test]
fn test_phantom_production_is_tolerated() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    // The pipeline claims a sample it cannot deliver; the request stays
    // queued rather than crashing or consuming the request.
    pipeline.announce_phantom_sample(StreamId(1));
    video.request_sample(None).unwrap();
    assert!(video.try_get_event().unwrap().is_none());

    source.shutdown().unwrap();
}

#[test]
fn test_production_on_inactive_stream_is_tolerated() {
    let (source, pipeline) = open_av_source();

    // No stream has been started; production is anomalous but not fatal.
    pipeline.push_sample(sample_for(StreamId(1), 0));

    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    // The pending sample is still there once the stream runs.
    video.request_sample(None).unwrap();
    assert!(matches!(
        video.try_get_event().unwrap(),
        Some(StreamEvent::SampleReady(_))
    ));

    source.shutdown().unwrap();
}

// ============================================================================
// End of stream / end of presentation
// ============================================================================

#[test]
fn test_eos_discards_unsatisfiable_requests() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    video.request_sample(Some(tracked_token(&drops))).unwrap();

    pipeline.finish_stream(StreamId(1));

    // The queued request was dropped, its token released, and the stream
    // reported end-of-stream exactly once.
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(matches!(
        video.try_get_event().unwrap(),
        Some(StreamEvent::EndOfStream)
    ));
    assert!(video.try_get_event().unwrap().is_none());

    // A later request fails outright; its token is still released.
    let result = video.request_sample(Some(tracked_token(&drops)));
    assert!(matches!(result, Err(Error::EndOfStream)));
    assert_eq!(drops.load(Ordering::SeqCst), 2);

    source.shutdown().unwrap();
}

#[test]
fn test_pending_sample_survives_eos() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    pipeline.push_sample(sample_for(StreamId(1), 0));
    pipeline.finish_stream(StreamId(1));

    // EOS with a produced sample still pending: the request is satisfied,
    // not dropped.
    video.request_sample(None).unwrap();
    assert!(matches!(
        video.try_get_event().unwrap(),
        Some(StreamEvent::SampleReady(_))
    ));
    // Only then does the stream end.
    assert!(matches!(
        video.try_get_event().unwrap(),
        Some(StreamEvent::EndOfStream)
    ));

    source.shutdown().unwrap();
}

#[test]
fn test_end_of_presentation_requires_every_stream() {
    let backend = ScriptedDemux::new()
        .with_stream(StreamId(1), MediaType::video(VideoCodec::H264))
        .with_stream(StreamId(2), MediaType::audio(AudioCodec::Aac))
        .with_stream(StreamId(3), MediaType::audio(AudioCodec::Mp3));
    let source = Source::open(storage(), &backend).unwrap();
    let pipeline = backend.pipeline().unwrap();
    let _streams = start_all(&source);

    pipeline.finish_stream(StreamId(1));
    pipeline.finish_stream(StreamId(2));
    assert!(
        source.try_get_event().unwrap().is_none(),
        "no end-of-presentation before the last stream ends"
    );

    pipeline.finish_stream(StreamId(3));
    assert!(matches!(
        source.try_get_event().unwrap(),
        Some(SourceEvent::EndOfPresentation)
    ));
    // Exactly once.
    assert!(source.try_get_event().unwrap().is_none());

    source.shutdown().unwrap();
}

// ============================================================================
// Removal / re-add
// ============================================================================

#[test]
fn test_readded_stream_is_relinked_not_duplicated() {
    let (source, pipeline) = open_av_source();
    let _streams = start_all(&source);

    pipeline.remove_stream(StreamId(1));
    pipeline.re_add_stream(StreamId(1), MediaType::video(VideoCodec::H264));

    assert_eq!(source.streams().unwrap().len(), 2, "no duplicate stream");
    assert_eq!(
        pipeline.link_log(),
        vec![(StreamId(1), false), (StreamId(1), true)]
    );

    source.shutdown().unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_is_terminal_and_exactly_once() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    source.shutdown().unwrap();

    assert_eq!(source.state(), SourceState::Shutdown);
    assert_eq!(pipeline.state(), PipelineState::Null);
    assert!(matches!(source.shutdown(), Err(Error::Shutdown)));
    assert!(matches!(source.get_event(), Err(Error::Shutdown)));
    assert!(matches!(
        source.create_presentation_descriptor(),
        Err(Error::Shutdown)
    ));
    assert!(matches!(video.request_sample(None), Err(Error::Shutdown)));
    assert!(matches!(video.get_event(), Err(Error::Shutdown)));
    assert!(matches!(video.descriptor(), Err(Error::Shutdown)));
}

#[test]
fn test_shutdown_releases_queued_request_tokens() {
    let (source, _pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    let drops = Arc::new(AtomicUsize::new(0));
    video.request_sample(Some(tracked_token(&drops))).unwrap();
    video.request_sample(Some(tracked_token(&drops))).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    source.shutdown().unwrap();

    // Both queued requests were drained without delivery.
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shutdown_concurrent_with_production() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);
    let video = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();
    video.request_sample(None).unwrap();

    let producer = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            for sequence in 0..200 {
                pipeline.push_sample(sample_for(StreamId(1), sequence));
            }
        })
    };

    // Tear down while the producer is mid-flight; must not panic and must
    // not deliver events after the queues shut down.
    source.shutdown().unwrap();
    producer.join().unwrap();

    assert!(matches!(video.get_event(), Err(Error::Shutdown)));
}

// ============================================================================
// Consumer protocol surface
// ============================================================================

#[test]
fn test_stream_descriptor_accessor() {
    let (source, _pipeline) = open_av_source();
    let streams = source.streams().unwrap();

    let descriptor = streams[1].descriptor().unwrap();
    assert_eq!(descriptor.id(), StreamId(2));
    assert_eq!(
        descriptor.media_type(),
        &MediaType::audio(AudioCodec::Aac)
    );

    source.shutdown().unwrap();
}

#[test]
fn test_get_event_timeout_expires() {
    let (source, _pipeline) = open_av_source();
    assert!(source
        .get_event_timeout(Duration::from_millis(10))
        .unwrap()
        .is_none());
    source.shutdown().unwrap();
}

#[test]
fn test_capability_traits_are_object_safe() {
    let (source, pipeline) = open_av_source();
    let streams = start_all(&source);

    let as_source: &dyn MediaSource = &source;
    let as_stream: &dyn MediaStream = streams.iter().find(|s| s.id() == StreamId(1)).unwrap();

    as_stream.request_sample(None).unwrap();
    pipeline.push_sample(sample_for(StreamId(1), 0));
    assert!(matches!(
        as_stream.try_get_event().unwrap(),
        Some(StreamEvent::SampleReady(_))
    ));

    as_source.shutdown().unwrap();
}
