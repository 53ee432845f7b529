//! Event loop driving a [`TrackingSession`] on tokio.
//!
//! Geolocation samples, provider errors and user commands arrive on one
//! queue; the calibration poll and deadline are timers owned by the loop.
//! Timers exist only while a run is active and are dropped with the loop,
//! so nothing fires against a session that has been torn down.

use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

use crate::calibration::CalibrationEvent;
use crate::config::CalibrationConfig;
use crate::error::{Result, TrackingError};
use crate::session::{PositionUpdate, SampleOutcome, TrackingSession};
use crate::RawSample;

/// Messages accepted by the session loop.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Sample(RawSample),
    GeolocationError(TrackingError),
    StartCalibration,
    Shutdown,
}

/// Wall-clock milliseconds derived from a fixed base plus tokio elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    base_ms: i64,
    started: Instant,
}

impl SessionClock {
    /// Anchor at the current system time.
    pub fn system() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    /// Anchor at a given Unix-millisecond time.
    pub fn starting_at(base_ms: i64) -> Self {
        Self {
            base_ms,
            started: Instant::now(),
        }
    }

    /// Saturates instead of wrapping if the elapsed time overflows `i64`.
    pub fn now_ms(&self) -> i64 {
        let elapsed_ms = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.base_ms.saturating_add(elapsed_ms)
    }
}

/// Sending side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    updates: watch::Receiver<Option<PositionUpdate>>,
}

impl SessionHandle {
    pub fn send_sample(&self, raw: RawSample) -> Result<()> {
        self.send(SessionCommand::Sample(raw))
    }

    pub fn report_error(&self, error: TrackingError) -> Result<()> {
        self.send(SessionCommand::GeolocationError(error))
    }

    pub fn start_calibration(&self) -> Result<()> {
        self.send(SessionCommand::StartCalibration)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown)
    }

    /// Receiver of every published position.
    pub fn updates(&self) -> watch::Receiver<Option<PositionUpdate>> {
        self.updates.clone()
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TrackingError::transport("session loop has stopped"))
    }
}

/// Spawn the loop. The join handle yields the session back once it stops.
pub fn spawn_session(
    session: TrackingSession,
    clock: SessionClock,
) -> (SessionHandle, JoinHandle<TrackingSession>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = watch::channel(None);
    let task = tokio::spawn(run_session(session, command_rx, update_tx, clock));
    (
        SessionHandle {
            commands: command_tx,
            updates: update_rx,
        },
        task,
    )
}

struct CalibrationTimers {
    poll: Interval,
    deadline: Pin<Box<Sleep>>,
}

impl CalibrationTimers {
    fn new(config: &CalibrationConfig) -> Self {
        let period = Duration::from_millis(config.poll_interval_ms);
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            poll,
            deadline: Box::pin(tokio::time::sleep(Duration::from_millis(config.timeout_ms))),
        }
    }
}

enum TimerEvent {
    Poll,
    Deadline,
}

async fn next_timer(timers: &mut Option<CalibrationTimers>) -> TimerEvent {
    let Some(timers) = timers.as_mut() else {
        return std::future::pending().await;
    };
    tokio::select! {
        _ = &mut timers.deadline => TimerEvent::Deadline,
        _ = timers.poll.tick() => TimerEvent::Poll,
    }
}

async fn run_session(
    mut session: TrackingSession,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    updates: watch::Sender<Option<PositionUpdate>>,
    clock: SessionClock,
) -> TrackingSession {
    let mut timers: Option<CalibrationTimers> = None;
    session.start();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let now_ms = clock.now_ms();
                match command {
                    Some(SessionCommand::Sample(raw)) => {
                        let outcome = session.handle_sample(raw, now_ms);
                        if let SampleOutcome::Published(update) = outcome {
                            updates.send_replace(Some(update));
                        }
                    }
                    Some(SessionCommand::GeolocationError(error)) => {
                        match session.handle_geolocation_error(error, now_ms) {
                            Ok(Some(update)) => {
                                updates.send_replace(Some(update));
                            }
                            Ok(None) => {}
                            Err(_) => break,
                        }
                    }
                    Some(SessionCommand::StartCalibration) => {
                        if session.start_calibration(now_ms) {
                            timers = Some(CalibrationTimers::new(&session.config().calibration));
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => break,
                }
            }
            timer = next_timer(&mut timers) => {
                let now_ms = clock.now_ms();
                let event = match timer {
                    TimerEvent::Poll => session.calibration_tick(now_ms),
                    TimerEvent::Deadline => session.calibration_expired(now_ms),
                };
                debug!("[SessionLoop] Calibration event: {:?}", event);
                match event {
                    CalibrationEvent::Completed { .. } => {
                        updates.send_replace(session.current().cloned());
                        timers = None;
                    }
                    CalibrationEvent::TimedOut { .. } | CalibrationEvent::Inactive => {
                        timers = None;
                    }
                    _ => {}
                }
            }
        }
    }

    // Dropping the timers here cancels any pending calibration callbacks
    drop(timers);
    session.stop();
    info!("[SessionLoop] Exited");
    session
}
