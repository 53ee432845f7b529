//! Stationary calibration: average a batch of high-confidence samples and
//! anchor the current position to their mean.
//!
//! The controller is driven by two time sources supplied by the caller: a
//! fixed-cadence [`CalibrationController::poll`] and a one-shot
//! [`CalibrationController::expire`] at the run deadline. `poll` also checks
//! the deadline itself, so a caller without a separate timer still gets the
//! timeout behavior.

use log::{debug, info};

use crate::config::CalibrationConfig;
use crate::error::TrackingError;
use crate::{AcceptedSample, GpsPoint};

/// Where the controller is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// No run active. `calibrated` may still be true from an earlier run.
    Idle,
    /// A run is collecting samples.
    Calibrating { collected: usize, required: usize },
}

/// What happened on a poll or expiry.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    /// No run is active.
    Inactive,
    /// No usable position this tick.
    Skipped { collected: usize },
    /// A sample was added to the run.
    Collected { collected: usize, required: usize },
    /// The run finished; `position` is the mean of all collected samples.
    Completed { position: GpsPoint, accuracy_m: f64 },
    /// The run was abandoned at its deadline.
    TimedOut { collected: usize, required: usize },
}

impl CalibrationEvent {
    /// The soft error to report for an abandoned run.
    pub fn as_error(&self) -> Option<TrackingError> {
        match *self {
            CalibrationEvent::TimedOut {
                collected,
                required,
            } => Some(TrackingError::CalibrationTimeout {
                collected,
                required,
            }),
            _ => None,
        }
    }
}

/// Timed state machine for calibration runs.
#[derive(Debug, Clone, Default)]
pub struct CalibrationController {
    config: CalibrationConfig,
    samples: Vec<GpsPoint>,
    // Worst accuracy among collected samples; reported with the mean
    worst_accuracy_m: f64,
    started_at_ms: Option<i64>,
    calibrated: bool,
}

impl CalibrationController {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
            worst_accuracy_m: 0.0,
            started_at_ms: None,
            calibrated: false,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Begin a run. Returns `false` without side effects if one is already active.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.is_calibrating() {
            debug!("[Calibration] Start ignored, run already active");
            return false;
        }
        self.samples.clear();
        self.worst_accuracy_m = 0.0;
        self.started_at_ms = Some(now_ms);
        info!(
            "[Calibration] Started: {} samples below {:.0}m within {}ms",
            self.config.required_samples, self.config.max_accuracy_m, self.config.timeout_ms
        );
        true
    }

    /// Sample the current position on the poll cadence.
    pub fn poll(&mut self, now_ms: i64, current: Option<&AcceptedSample>) -> CalibrationEvent {
        let Some(started_at) = self.started_at_ms else {
            return CalibrationEvent::Inactive;
        };

        if now_ms - started_at >= self.config.timeout_ms as i64 {
            return self.expire();
        }

        let Some(sample) = current.filter(|s| s.accuracy_m < self.config.max_accuracy_m) else {
            return CalibrationEvent::Skipped {
                collected: self.samples.len(),
            };
        };

        self.samples.push(sample.position);
        self.worst_accuracy_m = self.worst_accuracy_m.max(sample.accuracy_m);
        debug!(
            "[Calibration] Collected {}/{} (accuracy {:.1}m)",
            self.samples.len(),
            self.config.required_samples,
            sample.accuracy_m
        );

        if self.samples.len() >= self.config.required_samples {
            return self.complete();
        }

        CalibrationEvent::Collected {
            collected: self.samples.len(),
            required: self.config.required_samples,
        }
    }

    /// Abandon the active run. `calibrated` is left as it was.
    pub fn expire(&mut self) -> CalibrationEvent {
        if self.started_at_ms.take().is_none() {
            return CalibrationEvent::Inactive;
        }
        let collected = self.samples.len();
        info!(
            "[Calibration] Timed out with {}/{} samples",
            collected, self.config.required_samples
        );
        CalibrationEvent::TimedOut {
            collected,
            required: self.config.required_samples,
        }
    }

    /// Stop any active run silently (session teardown).
    pub fn cancel(&mut self) {
        self.started_at_ms = None;
        self.samples.clear();
    }

    pub fn is_calibrating(&self) -> bool {
        self.started_at_ms.is_some()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Milliseconds at which the active run expires.
    pub fn deadline_ms(&self) -> Option<i64> {
        self.started_at_ms
            .map(|started| started + self.config.timeout_ms as i64)
    }

    pub fn phase(&self) -> CalibrationPhase {
        if self.is_calibrating() {
            CalibrationPhase::Calibrating {
                collected: self.samples.len(),
                required: self.config.required_samples,
            }
        } else {
            CalibrationPhase::Idle
        }
    }

    /// Samples collected so far in the active run.
    pub fn samples(&self) -> &[GpsPoint] {
        &self.samples
    }

    fn complete(&mut self) -> CalibrationEvent {
        let position = mean_position(&self.samples);
        self.started_at_ms = None;
        self.calibrated = true;
        info!(
            "[Calibration] Completed at ({:.6}, {:.6}) from {} samples",
            position.latitude,
            position.longitude,
            self.samples.len()
        );
        CalibrationEvent::Completed {
            position,
            accuracy_m: self.worst_accuracy_m,
        }
    }
}

/// Arithmetic mean of latitudes and longitudes. Callers guarantee non-empty input.
///
/// Accumulates offsets from the first point so identical samples average
/// back to exactly that point.
fn mean_position(points: &[GpsPoint]) -> GpsPoint {
    let origin = points[0];
    let n = points.len() as f64;
    let (d_lat, d_lng) = points.iter().fold((0.0, 0.0), |(lat, lng), p| {
        (lat + (p.latitude - origin.latitude), lng + (p.longitude - origin.longitude))
    });
    GpsPoint::new(origin.latitude + d_lat / n, origin.longitude + d_lng / n)
}
