//! Unified error handling for the fleet-track library.
//!
//! Expected, high-frequency outcomes (a sample failing the accuracy or speed
//! gate) are not errors and never show up here; see [`crate::validation::Verdict`].
//! This type covers device, collaborator and configuration failures.

use thiserror::Error;

/// Unified error type for tracking operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// The user or platform refused location access
    #[error("Geolocation permission denied")]
    GeolocationDenied,
    /// The device did not deliver a fix within the requested timeout
    #[error("Geolocation timed out")]
    GeolocationTimeout,
    /// Any other geolocation provider failure
    #[error("Geolocation unavailable: {message}")]
    GeolocationUnavailable { message: String },
    /// A calibration run ended before collecting enough samples
    #[error("Calibration timed out with {collected} of {required} samples")]
    CalibrationTimeout { collected: usize, required: usize },
    /// Broadcast or REST collaborator failure
    #[error("Transport error: {message}")]
    Transport { message: String },
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
    /// JSON (de)serialization failure
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl TrackingError {
    /// Whether this error ends the tracking session.
    ///
    /// Timeouts are recoverable through the fallback fetch; denied or
    /// unavailable geolocation stops the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackingError::GeolocationDenied | TrackingError::GeolocationUnavailable { .. }
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        TrackingError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        TrackingError::Transport {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        TrackingError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for tracking operations.
pub type Result<T> = std::result::Result<T, TrackingError>;
