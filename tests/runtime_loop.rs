//! Session event loop tests on a paused tokio clock.
//!
//! Run with: `cargo test --features runtime --test runtime_loop`

use std::time::Duration;

use fleet_track::runtime::SessionClock;
use fleet_track::{
    spawn_session, GpsPoint, RawSample, SessionIdentity, TrackingConfig, TrackingError,
    TrackingSession, UpdateSource,
};

fn session() -> TrackingSession {
    TrackingSession::new(TrackingConfig::default(), SessionIdentity::new("van"), 0).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_samples_flow_to_updates() {
    let (handle, task) = spawn_session(session(), SessionClock::starting_at(0));
    let mut updates = handle.updates();

    handle
        .send_sample(RawSample::new(GpsPoint::new(-23.55, -46.63), 8.0, 0))
        .unwrap();
    updates.changed().await.unwrap();
    let update = updates.borrow().clone().unwrap();
    assert_eq!(update.position, GpsPoint::new(-23.55, -46.63));

    handle.shutdown().unwrap();
    let session = task.await.unwrap();
    assert_eq!(session.route().len(), 1);
    assert!(!session.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_calibration_completes_on_poll_cadence() {
    let (handle, task) = spawn_session(session(), SessionClock::starting_at(0));
    let anchor = GpsPoint::new(-23.55, -46.63);

    handle.send_sample(RawSample::new(anchor, 10.0, 0)).unwrap();
    handle.start_calibration().unwrap();
    // Second request while running must not spawn another poll loop
    handle.start_calibration().unwrap();

    tokio::time::sleep(Duration::from_millis(9_500)).await;
    handle.shutdown().unwrap();
    let session = task.await.unwrap();
    // Nine polls so far; the run was cancelled by shutdown
    assert!(!session.is_calibrated());
    assert!(!session.is_calibrating());

    let (handle, task) = spawn_session(
        TrackingSession::new(TrackingConfig::default(), SessionIdentity::new("van"), 0).unwrap(),
        SessionClock::starting_at(0),
    );
    handle.send_sample(RawSample::new(anchor, 10.0, 0)).unwrap();
    handle.start_calibration().unwrap();
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let update = handle.updates().borrow().clone().unwrap();
    assert_eq!(update.source, UpdateSource::Calibration);
    assert_eq!(update.position, anchor);

    handle.shutdown().unwrap();
    let session = task.await.unwrap();
    assert!(session.is_calibrated());
}

#[tokio::test(start_paused = true)]
async fn test_calibration_deadline_abandons_run() {
    let (handle, task) = spawn_session(session(), SessionClock::starting_at(0));
    // No position at all, so every poll is skipped
    handle.start_calibration().unwrap();
    tokio::time::sleep(Duration::from_millis(20_000)).await;
    // A repeated request mid-run keeps the original deadline
    handle.start_calibration().unwrap();
    tokio::time::sleep(Duration::from_millis(11_000)).await;

    // The expired run no longer blocks a new one: a good fix plus ten polls
    let anchor = GpsPoint::new(-23.55, -46.63);
    handle.send_sample(RawSample::new(anchor, 10.0, 31_000)).unwrap();
    handle.start_calibration().unwrap();
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    handle.shutdown().unwrap();
    let session = task.await.unwrap();
    let state = session.state(41_500);
    assert_eq!(state.calibration_timeouts, 1);
    assert!(state.calibrated);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_run_is_not_a_timeout() {
    let (handle, task) = spawn_session(session(), SessionClock::starting_at(0));
    handle.start_calibration().unwrap();
    tokio::time::sleep(Duration::from_millis(5_000)).await;

    handle.shutdown().unwrap();
    let session = task.await.unwrap();
    let state = session.state(5_000);
    assert_eq!(state.calibration, fleet_track::CalibrationPhase::Idle);
    assert_eq!(state.calibration_timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_denied_permission_ends_loop() {
    let (handle, task) = spawn_session(session(), SessionClock::starting_at(0));
    handle.report_error(TrackingError::GeolocationDenied).unwrap();

    let session = task.await.unwrap();
    assert_eq!(
        session.state(0).terminated,
        Some(TrackingError::GeolocationDenied)
    );
    assert!(handle
        .send_sample(RawSample::new(GpsPoint::new(0.0, 0.0), 5.0, 0))
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_clock_tracks_tokio_time_and_saturates() {
    let clock = SessionClock::starting_at(1_000);
    tokio::time::advance(Duration::from_millis(250)).await;
    assert_eq!(clock.now_ms(), 1_250);

    let edge = SessionClock::starting_at(i64::MAX - 5);
    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(edge.now_ms(), i64::MAX);
}
