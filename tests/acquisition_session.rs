//! Integration tests for camera sessions against the simulated driver
//!
//! These cover the session lifecycle (start/stop/exclusivity), control
//! request application on the acquisition thread and frame delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use scope_rig::camera::mock::{MockCamera, MockCameraSystem};
use scope_rig::camera::{
    AcquisitionConfig, CameraEvent, CameraSession, EventReceiver, ExposureAuto, FeatureName,
    FeatureValue, GainAuto, PixelFormat, SessionState,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn session_with(cameras: Vec<MockCamera>) -> (CameraSession, EventReceiver) {
    let system = cameras
        .into_iter()
        .fold(MockCameraSystem::new(), MockCameraSystem::with_camera);
    CameraSession::new(Arc::new(system), AcquisitionConfig::default())
}

fn fast_camera(id: &str, width: u32, height: u32) -> MockCamera {
    MockCamera::new(id, width, height).with_frame_interval(Duration::from_millis(2))
}

/// Receive events until `wanted` matches. Returns the match and everything
/// skipped before it.
async fn wait_for(
    events: &mut EventReceiver,
    wanted: impl Fn(&CameraEvent) -> bool,
) -> (CameraEvent, Vec<CameraEvent>) {
    let mut skipped = Vec::new();
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("timed out waiting for camera event")
            .expect("event channel closed");
        if wanted(&event) {
            return (event, skipped);
        }
        skipped.push(event);
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn drain(events: &mut EventReceiver) -> Vec<CameraEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn is_error(event: &CameraEvent) -> bool {
    matches!(event, CameraEvent::Error(_))
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let camera = fast_camera("cam0", 32, 16);
    let (session, mut events) = session_with(vec![camera.clone()]);

    // stop before any start is a no-op
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);

    assert!(session.start(None).unwrap());
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;
    assert_eq!(session.state(), SessionState::Streaming);

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(camera.open_handles(), 0);

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);

    let after = drain(&mut events);
    let stopped = after
        .iter()
        .filter(|e| **e == CameraEvent::StoppedStreaming)
        .count();
    assert_eq!(stopped, 1);
    assert!(!after.iter().any(is_error));
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let camera = fast_camera("cam0", 32, 16);
    let (session, mut events) = session_with(vec![camera.clone()]);

    assert!(session.start(None).unwrap());
    assert!(!session.start(None).unwrap());
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;
    assert!(!session.start(Some("cam0")).unwrap());

    assert_eq!(camera.total_opens(), 1);
    assert_eq!(camera.open_handles(), 1);
    session.stop();
    assert_eq!(camera.open_handles(), 0);
}

#[tokio::test]
async fn test_session_can_restart() {
    let camera = fast_camera("cam0", 16, 8);
    let (session, mut events) = session_with(vec![camera.clone()]);

    for _ in 0..2 {
        assert!(session.start(None).unwrap());
        let (first, _) = wait_for(&mut events, |e| matches!(e, CameraEvent::FrameReady(_))).await;
        let CameraEvent::FrameReady(frame) = first else {
            unreachable!()
        };
        assert_eq!(frame.frame_number(), 1);
        session.stop();
        drain(&mut events);
    }
    assert_eq!(camera.total_opens(), 2);
    assert_eq!(camera.open_handles(), 0);
}

#[tokio::test]
async fn test_started_streaming_precedes_frames() {
    // frames are produced as soon as the driver starts, before start returns
    let camera = MockCamera::new("cam0", 16, 8).with_frame_interval(Duration::from_millis(1));
    let (session, mut events) = session_with(vec![camera.clone()]);

    for _ in 0..5 {
        session.start(None).unwrap();
        let first = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .expect("timed out waiting for camera event")
            .expect("event channel closed");
        assert_eq!(first, CameraEvent::StartedStreaming);
        assert_eq!(session.state(), SessionState::Streaming);
        wait_for(&mut events, |e| matches!(e, CameraEvent::FrameReady(_))).await;
        session.stop();

        let rest = drain(&mut events);
        assert!(!rest.contains(&CameraEvent::StartedStreaming));
        assert_eq!(rest.last(), Some(&CameraEvent::StoppedStreaming));
    }
}

#[tokio::test]
async fn test_no_camera_reports_error_and_returns_to_idle() {
    let (session, mut events) = session_with(Vec::new());

    assert!(session.start(None).unwrap());
    let (event, skipped) = wait_for(&mut events, is_error).await;
    assert_eq!(event, CameraEvent::Error("No camera found.".into()));
    assert!(skipped.is_empty());

    eventually("idle state", || session.state() == SessionState::Idle).await;
    session.stop();
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_enumeration_failure_is_session_error() {
    let system = MockCameraSystem::new()
        .with_camera(fast_camera("cam0", 8, 8))
        .failing_enumeration("transport layer unavailable");
    let (session, mut events) = CameraSession::new(Arc::new(system), AcquisitionConfig::default());

    session.start(None).unwrap();
    let (event, _) = wait_for(&mut events, is_error).await;
    let CameraEvent::Error(message) = event else {
        unreachable!()
    };
    assert!(message.contains("transport layer unavailable"));
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_start_failure_releases_handle() {
    let camera = fast_camera("cam0", 8, 8).failing_start("payload size mismatch");
    let (session, mut events) = session_with(vec![camera.clone()]);

    session.start(None).unwrap();
    let (event, skipped) = wait_for(&mut events, is_error).await;
    assert!(matches!(event, CameraEvent::Error(ref m) if m.contains("payload size mismatch")));
    assert!(!skipped.contains(&CameraEvent::StartedStreaming));

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(camera.open_handles(), 0);
    assert_eq!(camera.total_opens(), 1);
    assert!(!drain(&mut events).contains(&CameraEvent::StoppedStreaming));
}

#[tokio::test]
async fn test_stop_failure_still_unwinds() {
    let camera = fast_camera("cam0", 8, 8).failing_stop("device lost");
    let (session, mut events) = session_with(vec![camera.clone()]);

    session.start(None).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;
    session.stop();

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(camera.open_handles(), 0);
    let tail: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| !matches!(e, CameraEvent::FrameReady(_)))
        .collect();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0], CameraEvent::StoppedStreaming);
    assert!(matches!(&tail[1], CameraEvent::Error(m) if m.contains("device lost")));
}

#[tokio::test]
async fn test_selector_chooses_matching_camera() {
    let first = fast_camera("cam-a", 8, 8);
    let second = fast_camera("cam-b", 8, 8);
    let (session, mut events) = session_with(vec![first.clone(), second.clone()]);

    session.start(Some("cam-b")).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;
    assert_eq!(first.total_opens(), 0);
    assert_eq!(second.open_handles(), 1);
    session.stop();

    session.start(Some("cam-zzz")).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;
    assert_eq!(first.total_opens(), 1);
    session.stop();
}

// =============================================================================
// Controls
// =============================================================================

#[tokio::test]
async fn test_requests_without_session_are_dropped() {
    let camera = fast_camera("cam0", 8, 8);
    let (session, mut events) = session_with(vec![camera.clone()]);
    let controls = session.controls();

    assert!(!controls.set_gamma_enable(true));

    session.start(None).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;
    session.stop();

    assert!(!controls.set_gamma_enable(true));
    assert_eq!(
        camera.value(FeatureName::GammaEnable),
        Some(FeatureValue::Bool(false))
    );
}

#[tokio::test]
async fn test_manual_exposure_is_clamped_to_device_range() {
    let camera = fast_camera("cam0", 16, 16).with_float_range(FeatureName::ExposureTime, 100.0, 30_000.0);
    let (session, mut events) = session_with(vec![camera.clone()]);
    let controls = session.controls();

    session.start(None).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;

    assert!(controls.set_exposure_auto_mode(ExposureAuto::Off));
    assert!(controls.set_exposure_time(50_000.0));

    eventually("clamped exposure", || {
        camera.value(FeatureName::ExposureTime) == Some(FeatureValue::Float(30_000.0))
    })
    .await;
    assert_eq!(
        camera.value(FeatureName::ExposureAuto),
        Some(FeatureValue::Enum("Off".into()))
    );

    session.stop();
    assert!(!drain(&mut events).iter().any(is_error));
}

#[tokio::test]
async fn test_requests_apply_in_emission_order() {
    let camera = fast_camera("cam0", 8, 8);
    let (session, mut events) = session_with(vec![camera.clone()]);
    let controls = session.controls();

    session.start(None).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;

    controls.set_gain_auto_mode(GainAuto::Off);
    for gain in [1.0, 2.0, 3.0] {
        controls.set_gain(gain);
    }
    eventually("last gain", || {
        camera.value(FeatureName::Gain) == Some(FeatureValue::Float(3.0))
    })
    .await;
    session.stop();

    let gains: Vec<_> = camera
        .writes()
        .into_iter()
        .filter(|(name, _)| *name == FeatureName::Gain)
        .map(|(_, value)| value)
        .collect();
    assert_eq!(
        gains,
        vec![
            FeatureValue::Float(1.0),
            FeatureValue::Float(2.0),
            FeatureValue::Float(3.0)
        ]
    );
}

#[tokio::test]
async fn test_unsupported_feature_is_a_silent_no_op() {
    let camera = fast_camera("cam0", 8, 8).without_feature(FeatureName::BlackLevel);
    let (session, mut events) = session_with(vec![camera.clone()]);
    let controls = session.controls();

    session.start(None).unwrap();
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;

    controls.set_black_level(12.0);
    controls.set_gamma_enable(true);
    eventually("gamma applied", || {
        camera.value(FeatureName::GammaEnable) == Some(FeatureValue::Bool(true))
    })
    .await;
    assert_eq!(session.state(), SessionState::Streaming);

    session.stop();
    assert!(!drain(&mut events).iter().any(is_error));
    assert_eq!(camera.value(FeatureName::BlackLevel), None);
}

#[tokio::test]
async fn test_requests_issued_right_after_start_are_applied() {
    let camera = fast_camera("cam0", 8, 8);
    let (session, mut events) = session_with(vec![camera.clone()]);
    let controls = session.controls();

    session.start(None).unwrap();
    // bring-up disables gamma; this request must land after it
    assert!(controls.set_gamma_enable(true));
    wait_for(&mut events, |e| *e == CameraEvent::StartedStreaming).await;

    eventually("gamma applied", || {
        camera.value(FeatureName::GammaEnable) == Some(FeatureValue::Bool(true))
    })
    .await;
    session.stop();
}

// =============================================================================
// Frames
// =============================================================================

#[tokio::test]
async fn test_non_canonical_frame_is_converted_and_returned_once() {
    let camera = fast_camera("cam0", 64, 48)
        .with_formats(&[PixelFormat::BayerRG8])
        .with_row_padding(6)
        .with_frame_limit(1);
    let (session, mut events) = session_with(vec![camera.clone()]);

    session.start(None).unwrap();
    let (event, _) = wait_for(&mut events, |e| matches!(e, CameraEvent::FrameReady(_))).await;
    let CameraEvent::FrameReady(frame) = event else {
        unreachable!()
    };
    session.stop();

    assert_eq!(camera.pixel_format(), PixelFormat::BayerRG8);
    assert_eq!((frame.width(), frame.height()), (64, 48));
    assert_eq!(frame.pixel_format(), PixelFormat::Mono8);
    assert_eq!(frame.stride(), 64);
    assert_eq!(camera.frames_produced(), 1);
    assert_eq!(camera.frames_requeued(), 1);
    assert_eq!(camera.outstanding_leases(), 0);

    let frames = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, CameraEvent::FrameReady(_)))
        .count();
    assert_eq!(frames, 0);
}

#[tokio::test]
async fn test_delivered_frames_survive_buffer_reuse() {
    // one driver buffer: every frame is painted into memory the previous
    // frame was delivered from
    let camera = fast_camera("cam0", 64, 4)
        .with_row_padding(6)
        .with_pool_size(1)
        .with_frame_limit(3);
    let (session, mut events) = session_with(vec![camera.clone()]);

    session.start(None).unwrap();
    let mut frames = Vec::new();
    while frames.len() < 3 {
        let (event, _) = wait_for(&mut events, |e| matches!(e, CameraEvent::FrameReady(_))).await;
        if let CameraEvent::FrameReady(frame) = event {
            frames.push(frame);
        }
    }
    session.stop();

    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.frame_number(), i as u64 + 1);
        assert_eq!(frame.stride(), 70);
        let expected: Vec<u8> = (0..64).map(|x| (x + i) as u8).collect();
        assert_eq!(frame.row(0), &expected[..]);
    }
    assert_eq!(camera.frames_requeued(), 3);
}

#[tokio::test]
async fn test_unconvertible_format_uses_raw_fallback() {
    let camera = fast_camera("cam0", 16, 8)
        .with_formats(&[PixelFormat::Mono12Packed])
        .with_frame_limit(2);
    let (session, mut events) = session_with(vec![camera.clone()]);

    session.start(None).unwrap();
    let (event, _) = wait_for(&mut events, |e| matches!(e, CameraEvent::FrameReady(_))).await;
    let CameraEvent::FrameReady(frame) = event else {
        unreachable!()
    };
    eventually("both frames", || session.stats().frames_delivered == 2).await;
    session.stop();

    assert_eq!(frame.stride(), 16);
    assert_eq!(frame.pixels().len(), 16 * 8);
    let stats = session.stats();
    assert_eq!(stats.conversion_fallbacks, 2);
    assert_eq!(stats.frames_dropped, 0);
    assert_eq!(camera.frames_requeued(), 2);
}

#[tokio::test]
async fn test_short_frame_is_dropped_with_conversion_failed() {
    let camera = fast_camera("cam0", 8, 8)
        .with_formats(&[PixelFormat::Rgb8])
        .with_truncated_frames(3)
        .with_frame_limit(1);
    let (session, mut events) = session_with(vec![camera.clone()]);

    session.start(None).unwrap();
    let (event, skipped) = wait_for(&mut events, |e| matches!(e, CameraEvent::ConversionFailed(_))).await;
    assert!(matches!(event, CameraEvent::ConversionFailed(ref m) if m.contains("3 bytes")));
    eventually("frame returned", || camera.frames_requeued() == 1).await;
    session.stop();

    let rest = drain(&mut events);
    let all: Vec<_> = skipped.iter().chain(rest.iter()).collect();
    assert!(!all.iter().any(|e| matches!(e, CameraEvent::FrameReady(_))));
    assert!(!all.iter().any(|e| is_error(e)));
    assert_eq!(camera.frames_produced(), 1);
    assert_eq!(camera.frames_requeued(), 1);
    assert_eq!(camera.outstanding_leases(), 0);
    assert_eq!(session.stats().frames_dropped, 1);
}
