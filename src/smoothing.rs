//! Accuracy-weighted moving average over a sliding time window.

use std::collections::VecDeque;

use crate::config::SmootherConfig;
use crate::{AcceptedSample, GpsPoint};

/// Reduces jitter by averaging recent accepted positions, weighting each by
/// the reciprocal of its reported accuracy radius.
#[derive(Debug, Clone, Default)]
pub struct PositionSmoother {
    config: SmootherConfig,
    buffer: VecDeque<AcceptedSample>,
}

impl PositionSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            buffer: VecDeque::new(),
        }
    }

    /// Insert a position and return the smoothed estimate.
    ///
    /// Entries aged `max_age_ms` or more relative to `now_ms` are dropped
    /// first. With fewer than `min_samples` entries the input is returned
    /// unchanged.
    pub fn smooth(&mut self, position: GpsPoint, accuracy_m: f64, now_ms: i64) -> GpsPoint {
        self.buffer.push_back(AcceptedSample {
            position,
            accuracy_m,
            timestamp_ms: now_ms,
        });
        self.evict(now_ms);

        if self.buffer.len() < self.config.min_samples {
            return position;
        }

        let mut weight_sum = 0.0;
        let mut lat_sum = 0.0;
        let mut lng_sum = 0.0;
        for entry in &self.buffer {
            let weight = 1.0 / self.clamp_accuracy(entry.accuracy_m);
            weight_sum += weight;
            lat_sum += weight * entry.position.latitude;
            lng_sum += weight * entry.position.longitude;
        }

        GpsPoint::new(lat_sum / weight_sum, lng_sum / weight_sum)
    }

    /// Number of samples currently inside the window.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn evict(&mut self, now_ms: i64) {
        let max_age = self.config.max_age_ms;
        self.buffer.retain(|entry| now_ms - entry.timestamp_ms < max_age);
    }

    // Zero, negative and NaN accuracies all fall back to the floor.
    fn clamp_accuracy(&self, accuracy_m: f64) -> f64 {
        if accuracy_m.is_nan() {
            self.config.min_accuracy_m
        } else {
            accuracy_m.max(self.config.min_accuracy_m)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_passthrough_below_min_samples() {
        let mut smoother = PositionSmoother::default();
        let a = GpsPoint::new(10.0, 20.0);
        let b = GpsPoint::new(10.001, 20.001);
        assert_eq!(smoother.smooth(a, 5.0, 0), a);
        assert_eq!(smoother.smooth(b, 5.0, 1000), b);
        assert_eq!(smoother.len(), 2);
    }

    #[test]
    fn test_equal_accuracy_is_plain_mean() {
        let mut smoother = PositionSmoother::default();
        smoother.smooth(GpsPoint::new(1.0, 4.0), 8.0, 0);
        smoother.smooth(GpsPoint::new(2.0, 5.0), 8.0, 1000);
        let result = smoother.smooth(GpsPoint::new(3.0, 9.0), 8.0, 2000);
        assert!(approx_eq(result.latitude, 2.0));
        assert!(approx_eq(result.longitude, 6.0));
    }

    #[test]
    fn test_more_accurate_samples_weigh_more() {
        let mut smoother = PositionSmoother::default();
        smoother.smooth(GpsPoint::new(0.0, 0.0), 40.0, 0);
        smoother.smooth(GpsPoint::new(0.0, 0.0), 40.0, 100);
        let result = smoother.smooth(GpsPoint::new(1.0, 1.0), 5.0, 200);
        // weights 1/40, 1/40, 1/5 -> 0.2 / 0.25 = 0.8
        assert!(approx_eq(result.latitude, 0.8));
        assert!(approx_eq(result.longitude, 0.8));
    }

    #[test]
    fn test_old_samples_age_out() {
        let mut smoother = PositionSmoother::default();
        smoother.smooth(GpsPoint::new(50.0, 50.0), 5.0, 0);
        smoother.smooth(GpsPoint::new(50.0, 50.0), 5.0, 1000);
        // The t=0 entry ages out at t=10_000, the t=1000 entry at t=11_000
        let fresh = GpsPoint::new(1.0, 1.0);
        smoother.smooth(fresh, 5.0, 10_000);
        assert_eq!(smoother.len(), 2);
        assert_eq!(smoother.smooth(fresh, 5.0, 11_000), fresh);
        assert_eq!(smoother.len(), 2);
    }

    #[test]
    fn test_zero_accuracy_is_clamped() {
        let mut smoother = PositionSmoother::default();
        smoother.smooth(GpsPoint::new(0.0, 0.0), 0.0, 0);
        smoother.smooth(GpsPoint::new(3.0, 3.0), 0.0, 10);
        let result = smoother.smooth(GpsPoint::new(6.0, 6.0), 0.0, 20);
        assert!(result.latitude.is_finite());
        assert!(approx_eq(result.latitude, 3.0));
        assert!(approx_eq(result.longitude, 3.0));
    }
}
