//! Tunable thresholds for the sample-conditioning pipeline.
//!
//! All structs deserialize with `#[serde(default)]`, so a JSON document only
//! needs to mention the values it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackingError};

/// Thresholds for accepting or rejecting raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Samples reporting an accuracy radius above this are rejected.
    /// Default: 100.0 meters
    pub accuracy_threshold_m: f64,

    /// Rejected samples above this accuracy radius trigger a one-shot
    /// fallback fetch from the geolocation provider.
    /// Default: 1000.0 meters
    pub fallback_accuracy_threshold_m: f64,

    /// Maximum implied speed between consecutive accepted samples.
    /// Default: 50.0 m/s (~180 km/h)
    pub max_speed_mps: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: 100.0,
            fallback_accuracy_threshold_m: 1000.0,
            max_speed_mps: 50.0,
        }
    }
}

/// Accuracy-weighted moving average settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Samples older than this are dropped from the window.
    /// Default: 10_000 ms
    pub max_age_ms: i64,

    /// Below this many buffered samples the input passes through unchanged.
    /// Default: 3
    pub min_samples: usize,

    /// Floor applied to reported accuracy before taking its reciprocal.
    /// Default: 1.0 meter
    pub min_accuracy_m: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 10_000,
            min_samples: 3,
            min_accuracy_m: 1.0,
        }
    }
}

/// Stationary calibration run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// How often the current position is sampled during a run.
    /// Default: 1000 ms
    pub poll_interval_ms: u64,

    /// Samples needed to complete a run.
    /// Default: 10
    pub required_samples: usize,

    /// Only positions with accuracy strictly below this are collected.
    /// Default: 50.0 meters
    pub max_accuracy_m: f64,

    /// A run that has not completed after this long is abandoned.
    /// Default: 30_000 ms
    pub timeout_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            required_samples: 10,
            max_accuracy_m: 50.0,
            timeout_ms: 30_000,
        }
    }
}

/// Route recording and movement detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Minimum displacement for a route append or a movement update.
    /// Default: 2.0 meters
    pub min_displacement_m: f64,

    /// The device counts as moving for this long after its last
    /// significant movement.
    /// Default: 10_000 ms
    pub movement_window_ms: i64,

    /// Optional cap on the number of route points; oldest points are
    /// evicted once reached. `None` keeps the whole session.
    pub max_points: Option<usize>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            min_displacement_m: 2.0,
            movement_window_ms: 10_000,
            max_points: None,
        }
    }
}

/// Options handed to the geolocation provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationOptions {
    pub enable_high_accuracy: bool,
    /// Oldest cached fix the provider may return
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
}

impl GeolocationOptions {
    /// Options for the continuous high-accuracy watch.
    pub fn watch() -> Self {
        Self {
            enable_high_accuracy: true,
            maximum_age_ms: 1000,
            timeout_ms: 30_000,
        }
    }

    /// Relaxed options for the one-shot fallback fetch.
    pub fn fallback() -> Self {
        Self {
            enable_high_accuracy: false,
            maximum_age_ms: 30_000,
            timeout_ms: 10_000,
        }
    }
}

/// Complete configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub validator: ValidatorConfig,
    pub smoother: SmootherConfig,
    pub calibration: CalibrationConfig,
    pub route: RouteConfig,
    pub watch_options: GeolocationOptions,
    pub fallback_options: GeolocationOptions,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            smoother: SmootherConfig::default(),
            calibration: CalibrationConfig::default(),
            route: RouteConfig::default(),
            watch_options: GeolocationOptions::watch(),
            fallback_options: GeolocationOptions::fallback(),
        }
    }
}

impl TrackingConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every threshold is usable.
    pub fn validate(&self) -> Result<()> {
        positive("validator.accuracy_threshold_m", self.validator.accuracy_threshold_m)?;
        positive(
            "validator.fallback_accuracy_threshold_m",
            self.validator.fallback_accuracy_threshold_m,
        )?;
        if self.validator.fallback_accuracy_threshold_m < self.validator.accuracy_threshold_m {
            return Err(TrackingError::config(
                "validator.fallback_accuracy_threshold_m must not be below accuracy_threshold_m",
            ));
        }
        positive("validator.max_speed_mps", self.validator.max_speed_mps)?;

        if self.smoother.max_age_ms <= 0 {
            return Err(TrackingError::config("smoother.max_age_ms must be positive"));
        }
        if self.smoother.min_samples == 0 {
            return Err(TrackingError::config("smoother.min_samples must be at least 1"));
        }
        positive("smoother.min_accuracy_m", self.smoother.min_accuracy_m)?;

        if self.calibration.poll_interval_ms == 0 {
            return Err(TrackingError::config(
                "calibration.poll_interval_ms must be positive",
            ));
        }
        if self.calibration.required_samples == 0 {
            return Err(TrackingError::config(
                "calibration.required_samples must be at least 1",
            ));
        }
        positive("calibration.max_accuracy_m", self.calibration.max_accuracy_m)?;
        if self.calibration.timeout_ms == 0 {
            return Err(TrackingError::config("calibration.timeout_ms must be positive"));
        }

        if !self.route.min_displacement_m.is_finite() || self.route.min_displacement_m < 0.0 {
            return Err(TrackingError::config(
                "route.min_displacement_m must be a non-negative number",
            ));
        }
        if self.route.movement_window_ms <= 0 {
            return Err(TrackingError::config(
                "route.movement_window_ms must be positive",
            ));
        }
        if self.route.max_points == Some(0) {
            return Err(TrackingError::config("route.max_points must be at least 1"));
        }

        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TrackingError::config(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validator.accuracy_threshold_m, 100.0);
        assert_eq!(config.calibration.required_samples, 10);
        assert_eq!(config.route.min_displacement_m, 2.0);
        assert!(config.watch_options.enable_high_accuracy);
        assert!(!config.fallback_options.enable_high_accuracy);
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{
            "validator": { "max_speed_mps": 30.0 },
            "route": { "min_displacement_m": 1.0, "max_points": 500 }
        }"#;
        let config = TrackingConfig::from_json(json).unwrap();
        assert_eq!(config.validator.max_speed_mps, 30.0);
        assert_eq!(config.validator.accuracy_threshold_m, 100.0);
        assert_eq!(config.route.min_displacement_m, 1.0);
        assert_eq!(config.route.max_points, Some(500));
        assert_eq!(config.smoother, SmootherConfig::default());
    }

    #[test]
    fn test_json_roundtrip_keeps_options() {
        let config = TrackingConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("enableHighAccuracy"));
        assert_eq!(TrackingConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = TrackingConfig::default();
        config.validator.max_speed_mps = 0.0;
        assert!(matches!(
            config.validate(),
            Err(TrackingError::Config { .. })
        ));

        let mut config = TrackingConfig::default();
        config.calibration.required_samples = 0;
        assert!(config.validate().is_err());

        let mut config = TrackingConfig::default();
        config.validator.fallback_accuracy_threshold_m = 50.0;
        assert!(config.validate().is_err());

        let mut config = TrackingConfig::default();
        config.smoother.min_accuracy_m = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let err = TrackingConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, TrackingError::Serialization { .. }));
    }
}
