//! # Fleet Track
//!
//! Client-side GPS signal conditioning for live fleet tracking.
//!
//! This library provides:
//! - Rejection of low-accuracy fixes and physically impossible jumps
//! - Accuracy-weighted moving-average smoothing
//! - Stationary calibration by averaging high-confidence fixes
//! - Route recording with minimum-displacement simplification
//! - Movement / stationary detection
//! - A [`TrackingSession`] that wires all of the above to the broadcast,
//!   history and geolocation collaborators
//!
//! ## Features
//!
//! - **`runtime`** - tokio event loop that drives a session from a sample
//!   queue with cancellable calibration timers
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use fleet_track::{GpsPoint, RawSample, SessionIdentity, TrackingConfig, TrackingSession};
//!
//! let identity = SessionIdentity::new("driver-7");
//! let mut session = TrackingSession::new(TrackingConfig::default(), identity, 0).unwrap();
//! session.start();
//!
//! let fix = RawSample::new(GpsPoint::new(-23.5505, -46.6333), 8.0, 1_000);
//! let outcome = session.handle_sample(fix, 1_000);
//! assert!(outcome.is_published());
//! assert_eq!(session.route().len(), 1);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackingError};

// Tunable thresholds
pub mod config;
pub use config::{
    CalibrationConfig, GeolocationOptions, RouteConfig, SmootherConfig, TrackingConfig,
    ValidatorConfig,
};

// Geographic utilities (distance, simplification)
pub mod geo_utils;
pub use geo_utils::haversine_distance;

// Accuracy and speed gates
pub mod validation;
pub use validation::{Rejection, SampleValidator, Verdict};

// Weighted moving average
pub mod smoothing;
pub use smoothing::PositionSmoother;

// Stationary calibration
pub mod calibration;
pub use calibration::{CalibrationController, CalibrationEvent, CalibrationPhase};

// Route recording and movement detection
pub mod route;
pub use route::{MovementDetector, MovementStatus, RouteSummary, RouteTracker};

// Collaborator contracts and wire payloads
pub mod transport;
pub use transport::{
    GeolocationProvider, HistoryQuery, HistoryRecord, LocationBroadcast, LocationBroadcaster,
    LocationStore,
};

// Peer positions and online roster
pub mod peers;
pub use peers::{PeerPosition, PeerRegistry, RosterEntry};

// Orchestrator
pub mod session;
pub use session::{
    PositionUpdate, SampleOutcome, SessionIdentity, SessionState, TrackingSession, UpdateSource,
};

// Event loop for a session
#[cfg(feature = "runtime")]
pub mod runtime;
#[cfg(feature = "runtime")]
pub use runtime::{spawn_session, SessionClock, SessionCommand, SessionHandle};

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("FleetTrack"),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in decimal degrees.
///
/// # Example
/// ```
/// use fleet_track::GpsPoint;
/// let point = GpsPoint::new(-23.5505, -46.6333); // São Paulo
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }
}

/// One fix as reported by the device geolocation provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub position: GpsPoint,
    /// Radius of the reported confidence circle in meters
    pub accuracy_m: f64,
    /// Device clock, Unix milliseconds
    pub timestamp_ms: i64,
    pub altitude: Option<f64>,
    /// Degrees clockwise from true north
    pub heading: Option<f64>,
    pub speed_mps: Option<f64>,
}

impl RawSample {
    /// Create a sample without the optional altitude/heading/speed readings.
    pub fn new(position: GpsPoint, accuracy_m: f64, timestamp_ms: i64) -> Self {
        Self {
            position,
            accuracy_m,
            timestamp_ms,
            altitude: None,
            heading: None,
            speed_mps: None,
        }
    }
}

/// A sample that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptedSample {
    pub position: GpsPoint,
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
}

impl From<&RawSample> for AcceptedSample {
    fn from(raw: &RawSample) -> Self {
        Self {
            position: raw.position,
            accuracy_m: raw.accuracy_m,
            timestamp_ms: raw.timestamp_ms,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(-23.5505, -46.6333).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let points = vec![GpsPoint::new(-2.0, 10.0), GpsPoint::new(4.0, 20.0)];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, -2.0);
        assert_eq!(bounds.max_lat, 4.0);
        assert_eq!(bounds.min_lng, 10.0);
        assert_eq!(bounds.max_lng, 20.0);
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_accepted_from_raw() {
        let mut raw = RawSample::new(GpsPoint::new(1.0, 2.0), 7.5, 99);
        raw.heading = Some(180.0);
        let accepted = AcceptedSample::from(&raw);
        assert_eq!(accepted.position, raw.position);
        assert_eq!(accepted.accuracy_m, 7.5);
        assert_eq!(accepted.timestamp_ms, 99);
    }
}
