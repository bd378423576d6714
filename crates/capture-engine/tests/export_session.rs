use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;

use reelcraft_capture_engine::backend::memory::count_frame_records;
use reelcraft_capture_engine::{
    CodecCandidate, ExportOptions, ExportProgress, ExportSession, ExportStage, MemoryBackend,
    SessionState, CODEC_CANDIDATES,
};
use reelcraft_common::config::MediaDefaults;
use reelcraft_common::error::{ErrorClass, ReelError};
use reelcraft_common::events::{EventBus, ReelEvent};
use reelcraft_common::VirtualTicker;
use reelcraft_project_model::{
    ExportFormat, ExportSettings, MediaItem, MediaSource, QualityTier, Size, ThemeTokens,
    TimelineCommand, TimelineState,
};
use reelcraft_render_engine::{FrameRenderer, MediaCache, SyntheticVideoBackend};

const CANVAS: Size = Size::new(16, 10);
const FRAME: f64 = 1.0 / 30.0;

fn renderer(events: &EventBus) -> FrameRenderer {
    let cache = MediaCache::new(
        CANVAS,
        MediaDefaults::default(),
        Arc::new(SyntheticVideoBackend::new(2.0).with_latency(2)),
        events.clone(),
    );
    FrameRenderer::new(cache, ThemeTokens::default())
}

/// Title card (1 s) + 2 s video + logo card (3 s).
fn timeline(events: &EventBus) -> TimelineState {
    let mut timeline = TimelineState::new(events.clone(), None);
    for item in [
        MediaItem::title_card("Lisbon", 1.0),
        MediaItem::video(MediaSource::from_bytes(vec![0u8; 8], None), 2.0),
    ] {
        timeline
            .apply(TimelineCommand::Insert { item, index: None })
            .unwrap();
    }
    timeline
}

fn options(margin: f64) -> ExportOptions {
    ExportOptions {
        settings: ExportSettings {
            quality: QualityTier::High,
            format: ExportFormat::Webm,
            width: CANVAS.width,
            height: CANVAS.height,
            safety_margin_secs: margin,
        },
        ..ExportOptions::default()
    }
}

fn session(backend: MemoryBackend, events: &EventBus) -> ExportSession<VirtualTicker> {
    ExportSession::new(Arc::new(backend), VirtualTicker::from_hz(30), events.clone())
}

fn errors(log: &Arc<Mutex<Vec<ReelEvent>>>) -> Vec<ErrorClass> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ReelEvent::ExportFailed { class, .. } => Some(*class),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn export_finalizes_after_total_duration_plus_margin() {
    let events = EventBus::new();
    let log = events.collector();
    let timeline = timeline(&events);
    let mut renderer = renderer(&events);
    let mut session = session(MemoryBackend::new(), &events);

    let total = timeline.total_duration();
    assert!((total - 6.0).abs() < 1e-9);

    let artifact = session
        .run(&timeline, &mut renderer, &options(0.5))
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    assert!(artifact.duration_secs >= total + 0.5);
    assert!(artifact.duration_secs <= total + 0.5 + FRAME + 1e-6);
    assert_eq!(artifact.container, ExportFormat::Webm);
    assert_eq!(artifact.codec, "vp9");
    assert!(artifact.file_name.starts_with("reel-"));
    assert!(artifact.file_name.ends_with(".webm"));

    // One encoded frame per tick, starting at t = 0.
    let expected = (artifact.duration_secs * 30.0).round() as u64 + 1;
    assert_eq!(artifact.frames, expected);
    assert_eq!(
        count_frame_records(&artifact.bytes, &CODEC_CANDIDATES[0]),
        Some(expected as usize)
    );

    let diagnostics = session.diagnostics().unwrap();
    assert_eq!(diagnostics.repeated_frames, 0);
    assert_eq!(diagnostics.render.stale_frames, 0);
    assert!(diagnostics.chunk_count > 1);
    assert_eq!(diagnostics.bytes, artifact.len());

    let log = log.lock().unwrap();
    assert!(matches!(
        log.iter().find(|e| matches!(e, ReelEvent::ExportStarted { .. })),
        Some(ReelEvent::ExportStarted { bitrate_bps: 10_000_000, .. })
    ));
    assert!(log.iter().any(|e| matches!(
        e,
        ReelEvent::ExportCompleted { bytes, .. } if *bytes == artifact.len()
    )));
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let events = EventBus::new();
    let log = events.collector();
    let timeline = timeline(&events);
    let mut renderer = renderer(&events);
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let mut session = session(MemoryBackend::new(), &events).on_progress(Box::new(
        move |p: ExportProgress| {
            sink.lock().unwrap().push(p.stage);
        },
    ));

    session
        .run(&timeline, &mut renderer, &options(0.0))
        .await
        .unwrap();

    let percents: Vec<u8> = log
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ReelEvent::ExportProgress { percent } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.first(), Some(&0));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    // 4 Hz over ~6 s of capture.
    assert!(percents.len() >= 20);

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first(), Some(&ExportStage::Preparing));
    assert_eq!(stages.last(), Some(&ExportStage::Complete));
    assert!(stages.contains(&ExportStage::Finalizing));
}

#[tokio::test]
async fn empty_timeline_is_rejected_before_recording() {
    let events = EventBus::new();
    let log = events.collector();
    // Only the protected logo card.
    let timeline = TimelineState::new(events.clone(), None);
    let mut renderer = renderer(&events);
    let mut session = session(MemoryBackend::new(), &events);

    let err = session
        .run(&timeline, &mut renderer, &options(0.5))
        .await
        .unwrap_err();
    assert!(matches!(err, ReelError::Validation { .. }));
    assert_eq!(errors(&log), vec![ErrorClass::Validation]);
    assert!(!log
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ReelEvent::ExportStarted { .. })));
    assert_eq!(renderer.stats().frames_painted, 0);
}

#[tokio::test]
async fn missing_encoder_aborts_before_recording() {
    let events = EventBus::new();
    let log = events.collector();
    let timeline = timeline(&events);
    let before = timeline.items().to_vec();
    let mut renderer = renderer(&events);
    let mut session = session(MemoryBackend::unavailable(), &events);

    let err = session
        .run(&timeline, &mut renderer, &options(0.5))
        .await
        .unwrap_err();
    assert!(matches!(err, ReelError::EncoderUnavailable { .. }));
    assert_eq!(errors(&log), vec![ErrorClass::EncoderUnavailable]);
    assert_eq!(timeline.items(), &before[..]);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(renderer.stats().frames_painted, 0);
}

#[tokio::test]
async fn requested_format_is_advisory() {
    let events = EventBus::new();
    let timeline = timeline(&events);
    let mut renderer = renderer(&events);
    let mp4_only: Vec<CodecCandidate> = vec![CODEC_CANDIDATES[2]];
    let mut session = session(MemoryBackend::with_codecs(mp4_only), &events);

    let artifact = session
        .run(&timeline, &mut renderer, &options(0.0))
        .await
        .unwrap();
    assert_eq!(artifact.container, ExportFormat::Mp4);
    assert_eq!(artifact.mime, "video/mp4;codecs=h264");
    assert!(artifact.file_name.ends_with(".mp4"));
}

#[tokio::test]
async fn abort_mid_flight_discards_output() {
    let events = EventBus::new();
    let log = events.collector();
    let timeline = timeline(&events);
    let mut renderer = renderer(&events);
    let session = session(MemoryBackend::new(), &events);
    let handle = session.abort_handle();
    let fired = AtomicBool::new(false);
    let mut session = session.on_progress(Box::new(move |p: ExportProgress| {
        let halfway = p.stage == ExportStage::Recording && p.progress >= 0.5;
        if halfway && !fired.swap(true, Ordering::SeqCst) {
            handle.abort();
        }
    }));

    let err = session
        .run(&timeline, &mut renderer, &options(0.5))
        .await
        .unwrap_err();
    assert!(matches!(err, ReelError::RuntimeCapture { .. }));
    assert_eq!(errors(&log), vec![ErrorClass::RuntimeCapture]);
    assert!(session.diagnostics().is_none());
    assert!(!log
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ReelEvent::ExportCompleted { .. })));

    // The session is reusable and the abort request was consumed.
    let artifact = session
        .run(&timeline, &mut renderer, &options(0.0))
        .await
        .unwrap();
    assert!(!artifact.is_empty());
}

#[tokio::test]
async fn encoder_failure_leaves_preview_usable() {
    let events = EventBus::new();
    let timeline = timeline(&events);
    let mut renderer = renderer(&events);
    let mut session = session(MemoryBackend::new().failing_after(45), &events);

    let err = session
        .run(&timeline, &mut renderer, &options(0.5))
        .await
        .unwrap_err();
    assert!(err.is_pipeline_fatal());
    assert_eq!(session.state(), SessionState::Idle);

    let status = renderer.render(&timeline, None);
    assert_eq!(status, reelcraft_render_engine::FrameStatus::Empty);
    let r = reelcraft_processing_core::scheduler::resolve(
        timeline.items(),
        0.5,
        reelcraft_processing_core::scheduler::PlaybackMode::Preview,
    );
    assert!(renderer.render(&timeline, r.as_ref()).is_painted());
}

#[tokio::test]
async fn realtime_mode_keeps_constant_rate() {
    let events = EventBus::new();
    let timeline = timeline(&events);
    let mut renderer = renderer(&events);
    // Ticks every two frame intervals: every capture is followed by a repeat.
    let ticker = VirtualTicker::new(Duration::from_nanos(66_666_667));
    let mut session = ExportSession::new(Arc::new(MemoryBackend::new()), ticker, events.clone());
    let options = ExportOptions {
        mode: reelcraft_capture_engine::CaptureMode::Realtime,
        ..options(0.0)
    };

    let artifact = session.run(&timeline, &mut renderer, &options).await.unwrap();
    let diagnostics = session.diagnostics().unwrap();
    assert!(diagnostics.repeated_frames > 0);
    assert_eq!(
        artifact.frames,
        (artifact.duration_secs * 30.0).round() as u64 + 1
    );
    assert!(diagnostics.render.stale_frames > 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn finalize_time_is_bounded(
        card_secs in 1.0f64..4.0,
        margin in 0.0f64..2.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let events = EventBus::new();
        let mut timeline = TimelineState::new(events.clone(), None);
        timeline
            .apply(TimelineCommand::Insert {
                item: MediaItem::title_card("Card", card_secs),
                index: None,
            })
            .unwrap();
        let total = timeline.total_duration();
        let mut renderer = renderer(&events);
        let mut session = session(MemoryBackend::new(), &events);

        let artifact = runtime
            .block_on(session.run(&timeline, &mut renderer, &options(margin)))
            .unwrap();
        prop_assert!(artifact.duration_secs >= total);
        prop_assert!(artifact.duration_secs >= total + margin);
        prop_assert!(artifact.duration_secs <= total + margin + FRAME + 1e-6);
    }
}
