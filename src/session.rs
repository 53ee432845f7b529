//! # Tracking Session
//!
//! Orchestrates the conditioning pipeline for one signed-in user:
//!
//! ```text
//! raw sample -> SampleValidator -> (calibrated?) PositionSmoother
//!            -> RouteTracker + MovementDetector -> PositionUpdate
//!            -> broadcaster / location store (fire-and-forget)
//! ```
//!
//! The session owns every component exclusively and never reads the clock:
//! callers pass `now_ms` into each entry point. Collaborator failures are
//! logged and dropped; only terminal geolocation errors surface as `Err`.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationController, CalibrationEvent, CalibrationPhase};
use crate::config::TrackingConfig;
use crate::error::{Result, TrackingError};
use crate::peers::{PeerPosition, PeerRegistry, RosterEntry};
use crate::route::{MovementDetector, MovementStatus, RouteTracker};
use crate::smoothing::PositionSmoother;
use crate::transport::{
    sort_history, GeolocationProvider, HistoryQuery, HistoryRecord, Identification,
    LocationBroadcast, LocationBroadcaster, LocationStore, SavedLocation,
};
use crate::validation::{Rejection, SampleValidator, Verdict};
use crate::{AcceptedSample, GpsPoint, RawSample};

/// Who is tracking; stamped on every broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub name: String,
    pub avatar: Option<String>,
    pub is_admin: bool,
}

impl SessionIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: None,
            is_admin: false,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// What produced a published position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateSource {
    /// A watched sample
    Sample,
    /// The relaxed one-shot fetch after a timeout or a very poor fix
    Fallback,
    /// The mean of a completed calibration run
    Calibration,
}

/// A sanitized position handed to the UI and the broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub position: GpsPoint,
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
    pub movement: MovementStatus,
    /// Whether the position went through the moving-average smoother
    pub smoothed: bool,
    pub source: UpdateSource,
}

/// Result of feeding one raw sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Published(PositionUpdate),
    Rejected(Rejection),
    /// The session has stopped or terminated
    Ignored,
}

impl SampleOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, SampleOutcome::Published(_))
    }
}

/// Snapshot of session state for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub position: Option<GpsPoint>,
    pub accuracy_m: Option<f64>,
    pub movement: MovementStatus,
    pub calibration: CalibrationPhase,
    pub calibrated: bool,
    pub route_points: usize,
    pub accepted: u64,
    pub rejected: u64,
    pub fallback_fetches: u64,
    pub publish_failures: u64,
    /// Calibration runs abandoned at their deadline
    pub calibration_timeouts: u64,
    /// Set when a terminal geolocation error ended the session
    pub terminated: Option<TrackingError>,
    pub stopped: bool,
}

/// Counters kept over the session lifetime.
#[derive(Debug, Clone, Copy, Default)]
struct SessionStats {
    accepted: u64,
    rejected: u64,
    fallback_fetches: u64,
    publish_failures: u64,
    calibration_timeouts: u64,
}

/// Owns the conditioning pipeline for a single session.
pub struct TrackingSession {
    config: TrackingConfig,
    identity: SessionIdentity,

    validator: SampleValidator,
    smoother: PositionSmoother,
    calibration: CalibrationController,
    route: RouteTracker,
    movement: MovementDetector,
    peers: PeerRegistry,

    last_accepted: Option<AcceptedSample>,
    current: Option<PositionUpdate>,
    stats: SessionStats,
    terminated: Option<TrackingError>,
    stopped: bool,

    broadcaster: Option<Box<dyn LocationBroadcaster + Send>>,
    store: Option<Box<dyn LocationStore + Send>>,
    geolocation: Option<Box<dyn GeolocationProvider + Send>>,
}

impl TrackingSession {
    /// Create a session. Fails if `config` does not validate.
    pub fn new(config: TrackingConfig, identity: SessionIdentity, now_ms: i64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            validator: SampleValidator::new(config.validator.clone()),
            smoother: PositionSmoother::new(config.smoother.clone()),
            calibration: CalibrationController::new(config.calibration.clone()),
            route: RouteTracker::new(config.route.clone()),
            movement: MovementDetector::new(&config.route, now_ms),
            peers: PeerRegistry::new(),
            config,
            identity,
            last_accepted: None,
            current: None,
            stats: SessionStats::default(),
            terminated: None,
            stopped: false,
            broadcaster: None,
            store: None,
            geolocation: None,
        })
    }

    pub fn with_broadcaster(
        mut self,
        broadcaster: impl LocationBroadcaster + Send + 'static,
    ) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }

    pub fn with_store(mut self, store: impl LocationStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_geolocation(mut self, provider: impl GeolocationProvider + Send + 'static) -> Self {
        self.geolocation = Some(Box::new(provider));
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Announce this client on the broadcast channel.
    pub fn start(&mut self) {
        info!(
            "[TrackingSession] Starting for '{}' (admin: {})",
            self.identity.name, self.identity.is_admin
        );
        let identification = Identification {
            name: self.identity.name.clone(),
            avatar: self.identity.avatar.clone(),
            is_admin: self.identity.is_admin,
        };
        if let Some(broadcaster) = self.broadcaster.as_mut() {
            if let Err(e) = broadcaster.identify(&identification) {
                warn!("[TrackingSession] Identification failed: {}", e);
            }
        }
    }

    /// Stop processing. Cancels any calibration run; later samples are ignored.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.calibration.cancel();
        info!(
            "[TrackingSession] Stopped: {} accepted, {} rejected, {} route points",
            self.stats.accepted,
            self.stats.rejected,
            self.route.len()
        );
    }

    pub fn is_active(&self) -> bool {
        !self.stopped && self.terminated.is_none()
    }

    /// Feed one sample from the geolocation watch.
    pub fn handle_sample(&mut self, raw: RawSample, now_ms: i64) -> SampleOutcome {
        if !self.is_active() {
            return SampleOutcome::Ignored;
        }
        self.process(raw, now_ms, UpdateSource::Sample)
    }

    /// Handle an error from the geolocation watch.
    ///
    /// A timeout triggers the one-shot fallback fetch and returns the update
    /// it produced, if any. Terminal errors end the session and are returned.
    pub fn handle_geolocation_error(
        &mut self,
        error: TrackingError,
        now_ms: i64,
    ) -> Result<Option<PositionUpdate>> {
        if !self.is_active() {
            return Ok(None);
        }

        if error.is_terminal() {
            warn!("[TrackingSession] Geolocation failed, ending session: {}", error);
            self.calibration.cancel();
            self.terminated = Some(error.clone());
            return Err(error);
        }

        warn!("[TrackingSession] Geolocation error: {}", error);
        if error != TrackingError::GeolocationTimeout {
            return Ok(None);
        }

        match self.fetch_fallback() {
            Some(raw) => match self.evaluate(raw, now_ms, UpdateSource::Fallback) {
                SampleOutcome::Published(update) => Ok(Some(update)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Begin a calibration run. No-op if one is active or the session is inactive.
    pub fn start_calibration(&mut self, now_ms: i64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.calibration.start(now_ms)
    }

    /// Poll tick for the active calibration run.
    pub fn calibration_tick(&mut self, now_ms: i64) -> CalibrationEvent {
        let current = self.current.as_ref().map(|update| AcceptedSample {
            position: update.position,
            accuracy_m: update.accuracy_m,
            timestamp_ms: update.timestamp_ms,
        });
        let event = self.calibration.poll(now_ms, current.as_ref());
        self.apply_calibration_event(&event, now_ms);
        event
    }

    /// Deadline timer for the active calibration run.
    pub fn calibration_expired(&mut self, now_ms: i64) -> CalibrationEvent {
        let event = self.calibration.expire();
        self.apply_calibration_event(&event, now_ms);
        event
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_calibrating()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    pub fn calibration(&self) -> &CalibrationController {
        &self.calibration
    }

    pub fn route(&self) -> &RouteTracker {
        &self.route
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerRegistry {
        &mut self.peers
    }

    /// Last published position.
    pub fn current(&self) -> Option<&PositionUpdate> {
        self.current.as_ref()
    }

    pub fn movement_status(&self, now_ms: i64) -> MovementStatus {
        self.movement.status(now_ms)
    }

    /// Peers for the map layer, judged moving over the movement window.
    pub fn peer_positions(&self, now_ms: i64) -> Vec<PeerPosition> {
        self.peers.peer_positions(now_ms, self.config.route.movement_window_ms)
    }

    /// Online-user list including this client.
    pub fn roster(&self, now_ms: i64) -> Vec<RosterEntry> {
        self.peers.roster(
            self.identity.is_admin,
            &self.identity.name,
            self.identity.avatar.as_deref(),
            self.movement.status(now_ms),
            now_ms,
        )
    }

    /// Fetch stored history in chronological order.
    pub fn history(&mut self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| TrackingError::transport("no location store attached"))?;
        let records = store.history(query)?;
        Ok(sort_history(records, query))
    }

    pub fn state(&self, now_ms: i64) -> SessionState {
        SessionState {
            position: self.current.as_ref().map(|u| u.position),
            accuracy_m: self.current.as_ref().map(|u| u.accuracy_m),
            movement: self.movement.status(now_ms),
            calibration: self.calibration.phase(),
            calibrated: self.calibration.is_calibrated(),
            route_points: self.route.len(),
            accepted: self.stats.accepted,
            rejected: self.stats.rejected,
            fallback_fetches: self.stats.fallback_fetches,
            publish_failures: self.stats.publish_failures,
            calibration_timeouts: self.stats.calibration_timeouts,
            terminated: self.terminated.clone(),
            stopped: self.stopped,
        }
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    /// Validate with at most one fallback fetch for a very poor fix.
    fn process(&mut self, raw: RawSample, now_ms: i64, source: UpdateSource) -> SampleOutcome {
        match self.evaluate(raw, now_ms, source) {
            SampleOutcome::Rejected(Rejection::LowAccuracy {
                needs_fallback: true,
                ..
            }) => match self.fetch_fallback() {
                // Depth 1: the fallback result never triggers another fetch
                Some(fallback) => self.evaluate(fallback, now_ms, UpdateSource::Fallback),
                None => SampleOutcome::Rejected(Rejection::LowAccuracy {
                    accuracy_m: raw.accuracy_m,
                    needs_fallback: true,
                }),
            },
            outcome => outcome,
        }
    }

    fn evaluate(&mut self, raw: RawSample, now_ms: i64, source: UpdateSource) -> SampleOutcome {
        match self.validator.validate(&raw, self.last_accepted.as_ref()) {
            Verdict::Rejected(reason) => {
                self.stats.rejected += 1;
                debug!("[TrackingSession] Rejected sample: {:?}", reason);
                SampleOutcome::Rejected(reason)
            }
            Verdict::Accepted(sample) => {
                self.stats.accepted += 1;
                self.last_accepted = Some(sample);
                let update = self.accept(sample, now_ms, source);
                self.publish(&update, &raw);
                SampleOutcome::Published(update)
            }
        }
    }

    fn accept(
        &mut self,
        sample: AcceptedSample,
        now_ms: i64,
        source: UpdateSource,
    ) -> PositionUpdate {
        let smoothed = self.calibration.is_calibrated();
        let position = if smoothed {
            self.smoother.smooth(sample.position, sample.accuracy_m, now_ms)
        } else {
            sample.position
        };

        self.route.record_if_significant(position);
        self.movement.observe(position, now_ms);

        let update = PositionUpdate {
            position,
            accuracy_m: sample.accuracy_m,
            timestamp_ms: now_ms,
            movement: self.movement.status(now_ms),
            smoothed,
            source,
        };
        self.current = Some(update.clone());
        update
    }

    fn fetch_fallback(&mut self) -> Option<RawSample> {
        let provider = self.geolocation.as_mut()?;
        self.stats.fallback_fetches += 1;
        info!("[TrackingSession] Requesting fallback position with relaxed options");
        match provider.current_position(&self.config.fallback_options) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("[TrackingSession] Fallback position failed: {}", e);
                None
            }
        }
    }

    fn apply_calibration_event(&mut self, event: &CalibrationEvent, now_ms: i64) {
        match *event {
            CalibrationEvent::Completed {
                position,
                accuracy_m,
            } => {
                let update = PositionUpdate {
                    position,
                    accuracy_m,
                    timestamp_ms: now_ms,
                    movement: self.movement.status(now_ms),
                    smoothed: false,
                    source: UpdateSource::Calibration,
                };
                self.current = Some(update.clone());
                let raw = RawSample::new(position, accuracy_m, now_ms);
                self.publish(&update, &raw);
            }
            CalibrationEvent::TimedOut { .. } => {
                self.stats.calibration_timeouts += 1;
                if let Some(err) = event.as_error() {
                    warn!("[TrackingSession] {}", err);
                }
            }
            _ => {}
        }
    }

    /// Fire-and-forget delivery to the broadcast channel and history store.
    fn publish(&mut self, update: &PositionUpdate, raw: &RawSample) {
        if let Some(broadcaster) = self.broadcaster.as_mut() {
            let payload = LocationBroadcast {
                lat: update.position.latitude,
                lng: update.position.longitude,
                timestamp: update.timestamp_ms,
                name: self.identity.name.clone(),
                avatar: self.identity.avatar.clone(),
                is_admin: self.identity.is_admin,
                accuracy: update.accuracy_m,
                altitude: raw.altitude,
                heading: raw.heading,
                speed: raw.speed_mps,
                moving: update.movement.moving,
            };
            if let Err(e) = broadcaster.broadcast(&payload) {
                self.stats.publish_failures += 1;
                warn!("[TrackingSession] Broadcast failed: {}", e);
            }
        }

        if let Some(store) = self.store.as_mut() {
            let location = SavedLocation {
                lat: update.position.latitude,
                lng: update.position.longitude,
                accuracy: update.accuracy_m,
                timestamp: update.timestamp_ms,
            };
            if let Err(e) = store.save_location(&location) {
                self.stats.publish_failures += 1;
                warn!("[TrackingSession] Saving location failed: {}", e);
            }
        }
    }
}
