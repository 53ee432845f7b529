//! Route recording and movement detection.
//!
//! Both use the same minimum-displacement threshold but track independent
//! references: the route compares against its last stored point, movement
//! detection against the last accepted position.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::RouteConfig;
use crate::geo_utils::{douglas_peucker, haversine_distance, polyline_length};
use crate::{Bounds, GpsPoint};

/// Append-only polyline of significant positions.
#[derive(Debug, Clone, Default)]
pub struct RouteTracker {
    config: RouteConfig,
    points: VecDeque<GpsPoint>,
}

/// Aggregate route figures for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub point_count: usize,
    /// Length along the recorded points in meters
    pub distance_m: f64,
    pub bounds: Option<Bounds>,
}

impl RouteTracker {
    pub fn new(config: RouteConfig) -> Self {
        Self {
            config,
            points: VecDeque::new(),
        }
    }

    /// Append `position` if the route is empty or it lies more than the
    /// minimum displacement from the last point. Returns whether it was appended.
    pub fn record_if_significant(&mut self, position: GpsPoint) -> bool {
        if let Some(last) = self.points.back() {
            let distance = haversine_distance(last, &position);
            if distance.is_nan() || distance <= self.config.min_displacement_m {
                return false;
            }
        }

        self.points.push_back(position);
        if let Some(max) = self.config.max_points {
            while self.points.len() > max {
                self.points.pop_front();
            }
        }
        debug!("[RouteTracker] Appended point #{}", self.points.len());
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&GpsPoint> {
        self.points.back()
    }

    /// Recorded points in order.
    pub fn points(&self) -> Vec<GpsPoint> {
        self.points.iter().copied().collect()
    }

    /// Douglas-Peucker simplified copy for rendering. Tolerance in degrees.
    pub fn simplified(&self, tolerance: f64) -> Vec<GpsPoint> {
        douglas_peucker(&self.points(), tolerance)
    }

    pub fn summary(&self) -> RouteSummary {
        let points = self.points();
        RouteSummary {
            point_count: points.len(),
            distance_m: polyline_length(&points),
            bounds: Bounds::from_points(&points),
        }
    }
}

/// Derived movement status at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementStatus {
    pub moving: bool,
    /// Whole seconds since the last significant movement; 0 while moving
    pub seconds_stationary: u64,
}

/// Tracks when the device last moved significantly.
#[derive(Debug, Clone)]
pub struct MovementDetector {
    min_displacement_m: f64,
    window_ms: i64,
    last_position: Option<GpsPoint>,
    last_movement_ms: i64,
}

impl MovementDetector {
    /// `started_at_ms` seeds the last-movement time so a new session starts as moving.
    pub fn new(config: &RouteConfig, started_at_ms: i64) -> Self {
        Self {
            min_displacement_m: config.min_displacement_m,
            window_ms: config.movement_window_ms,
            last_position: None,
            last_movement_ms: started_at_ms,
        }
    }

    /// Feed an accepted position. Returns whether it counted as significant movement.
    pub fn observe(&mut self, position: GpsPoint, now_ms: i64) -> bool {
        let moved = match self.last_position {
            Some(last) => haversine_distance(&last, &position) > self.min_displacement_m,
            None => false,
        };
        if moved {
            self.last_movement_ms = now_ms;
        }
        self.last_position = Some(position);
        moved
    }

    pub fn last_movement_ms(&self) -> i64 {
        self.last_movement_ms
    }

    pub fn current_position(&self) -> Option<GpsPoint> {
        self.last_position
    }

    pub fn is_moving(&self, now_ms: i64) -> bool {
        now_ms - self.last_movement_ms < self.window_ms
    }

    pub fn status(&self, now_ms: i64) -> MovementStatus {
        if self.is_moving(now_ms) {
            MovementStatus {
                moving: true,
                seconds_stationary: 0,
            }
        } else {
            let elapsed = (now_ms - self.last_movement_ms).max(0) as u64;
            MovementStatus {
                moving: false,
                seconds_stationary: elapsed / 1000,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::meters_to_degrees;

    fn north(meters: f64) -> GpsPoint {
        GpsPoint::new(meters_to_degrees(meters), 0.0)
    }

    #[test]
    fn test_first_point_always_recorded() {
        let mut route = RouteTracker::default();
        assert!(route.record_if_significant(north(0.0)));
        assert_eq!(route.len(), 1);
    }

    #[test]
    fn test_small_steps_never_grow_route() {
        let mut route = RouteTracker::default();
        route.record_if_significant(north(0.0));
        for i in 1..20 {
            // 0.5 m jitter around the origin
            let offset = if i % 2 == 0 { 0.5 } else { -0.5 };
            assert!(!route.record_if_significant(north(offset)));
        }
        assert_eq!(route.len(), 1);
    }

    #[test]
    fn test_displacement_over_threshold_appends() {
        let mut route = RouteTracker::default();
        route.record_if_significant(north(0.0));
        assert!(!route.record_if_significant(north(1.9)));
        assert!(route.record_if_significant(north(2.5)));
        assert!(route.record_if_significant(north(5.0)));
        assert_eq!(route.len(), 3);
        assert_eq!(route.last(), Some(&north(5.0)));
    }

    #[test]
    fn test_max_points_evicts_oldest() {
        let mut route = RouteTracker::new(RouteConfig {
            max_points: Some(3),
            ..RouteConfig::default()
        });
        for i in 0..5 {
            route.record_if_significant(north(i as f64 * 10.0));
        }
        assert_eq!(route.len(), 3);
        assert_eq!(route.points()[0], north(20.0));
    }

    #[test]
    fn test_summary() {
        let mut route = RouteTracker::default();
        assert_eq!(route.summary().point_count, 0);
        assert!(route.summary().bounds.is_none());

        for i in 0..4 {
            route.record_if_significant(north(i as f64 * 10.0));
        }
        let summary = route.summary();
        assert_eq!(summary.point_count, 4);
        assert!((summary.distance_m - 30.0).abs() < 0.01);
        let bounds = summary.bounds.unwrap();
        assert_eq!(bounds.min_lat, 0.0);
        assert_eq!(bounds.max_lat, north(30.0).latitude);
    }

    #[test]
    fn test_simplified_straight_route() {
        let mut route = RouteTracker::default();
        for i in 0..6 {
            route.record_if_significant(north(i as f64 * 10.0));
        }
        let simplified = route.simplified(meters_to_degrees(1.0));
        assert_eq!(simplified.len(), 2);
    }

    #[test]
    fn test_movement_window() {
        let config = RouteConfig::default();
        let mut detector = MovementDetector::new(&config, 0);
        assert!(detector.is_moving(0));

        assert!(!detector.observe(north(0.0), 1000));
        assert!(detector.observe(north(5.0), 2000));
        assert_eq!(detector.last_movement_ms(), 2000);
        assert!(detector.is_moving(11_999));
        assert!(!detector.is_moving(12_000));

        // Sub-threshold jitter does not refresh the timestamp
        assert!(!detector.observe(north(6.0), 5000));
        assert_eq!(detector.last_movement_ms(), 2000);
        assert_eq!(detector.current_position(), Some(north(6.0)));
    }

    #[test]
    fn test_seconds_stationary_increases() {
        let detector = MovementDetector::new(&RouteConfig::default(), 0);
        let mut previous = 0;
        for now in (10_000..20_000).step_by(1000) {
            let status = detector.status(now);
            assert!(!status.moving);
            assert!(status.seconds_stationary >= previous);
            previous = status.seconds_stationary;
        }
        assert_eq!(detector.status(15_500).seconds_stationary, 15);
        let fresh = detector.status(500);
        assert!(fresh.moving);
        assert_eq!(fresh.seconds_stationary, 0);
    }
}
