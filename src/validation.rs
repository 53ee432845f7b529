//! Sample validation: the accuracy gate and the implied-speed gate.
//!
//! The validator is a pure decision function. It never mutates state; the
//! caller decides what to do with a [`Verdict`] and owns the "last accepted"
//! reference.

use serde::{Deserialize, Serialize};

use crate::config::ValidatorConfig;
use crate::geo_utils::haversine_distance;
use crate::{AcceptedSample, RawSample};

/// Why a raw sample was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Rejection {
    /// Reported accuracy radius is above the accuracy threshold.
    LowAccuracy {
        accuracy_m: f64,
        /// The radius is so large that a relaxed one-shot fetch is worthwhile
        needs_fallback: bool,
    },
    /// Reaching this sample from the last accepted one needs an implausible speed.
    ImpossibleSpeed { speed_mps: f64 },
    /// Coordinates out of range or not finite, or accuracy negative or NaN.
    InvalidSample,
}

/// Outcome of validating one raw sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(AcceptedSample),
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

/// Accuracy and speed gate over incoming samples.
#[derive(Debug, Clone, Default)]
pub struct SampleValidator {
    config: ValidatorConfig,
}

impl SampleValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Decide whether `raw` is usable given the last accepted sample.
    ///
    /// Malformed fixes are dropped first. The accuracy gate always applies.
    /// The speed gate applies only when a previous sample exists and strictly
    /// positive time has elapsed since it.
    pub fn validate(&self, raw: &RawSample, last_accepted: Option<&AcceptedSample>) -> Verdict {
        if !raw.position.is_valid() || !(raw.accuracy_m >= 0.0) {
            return Verdict::Rejected(Rejection::InvalidSample);
        }

        if raw.accuracy_m > self.config.accuracy_threshold_m {
            return Verdict::Rejected(Rejection::LowAccuracy {
                accuracy_m: raw.accuracy_m,
                needs_fallback: raw.accuracy_m > self.config.fallback_accuracy_threshold_m,
            });
        }

        if let Some(last) = last_accepted {
            if let Some(speed_mps) = implied_speed(last, raw) {
                if speed_mps > self.config.max_speed_mps {
                    return Verdict::Rejected(Rejection::ImpossibleSpeed { speed_mps });
                }
            }
        }

        Verdict::Accepted(AcceptedSample::from(raw))
    }
}

/// Speed needed to travel from `last` to `raw` in m/s, `None` when no time elapsed.
pub fn implied_speed(last: &AcceptedSample, raw: &RawSample) -> Option<f64> {
    let elapsed_ms = raw.timestamp_ms - last.timestamp_ms;
    if elapsed_ms <= 0 {
        return None;
    }
    let distance = haversine_distance(&last.position, &raw.position);
    Some(distance / (elapsed_ms as f64 / 1000.0))
}
