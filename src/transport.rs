//! Collaborator contracts: the realtime broadcast channel, the REST
//! location store and the one-shot geolocation fetch.
//!
//! Payloads serialize with camelCase field names to match the wire format
//! the server expects.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GeolocationOptions;
use crate::error::Result;
use crate::RawSample;

/// Sent once after connecting so peers can label this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identification {
    pub name: String,
    pub avatar: Option<String>,
    pub is_admin: bool,
}

/// One published position, as broadcast to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBroadcast {
    pub lat: f64,
    pub lng: f64,
    /// Unix milliseconds
    pub timestamp: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub is_admin: bool,
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub moving: bool,
}

/// A peer's last known position from the `locations` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSample {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub moving: Option<bool>,
}

/// Entry of the `connectedUsers` event (delivered to admins only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedUser {
    pub socket_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Body of the save-location request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLocation {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub timestamp: i64,
}

/// A stored location returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    #[serde(flatten)]
    pub location: SavedLocation,
}

/// Optional date range for a history request. Both ends inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Whether a Unix-millisecond timestamp falls inside the range.
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        let Some(at) = Utc.timestamp_millis_opt(timestamp_ms).single() else {
            return false;
        };
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Keep records inside `query` and order them oldest first.
pub fn sort_history(records: Vec<HistoryRecord>, query: &HistoryQuery) -> Vec<HistoryRecord> {
    let mut records: Vec<HistoryRecord> = records
        .into_iter()
        .filter(|r| query.contains(r.location.timestamp))
        .collect();
    records.sort_by_key(|r| r.location.timestamp);
    records
}

/// Outbound realtime channel. Delivery is at-most-once.
pub trait LocationBroadcaster {
    fn identify(&mut self, identity: &Identification) -> Result<()>;
    fn broadcast(&mut self, location: &LocationBroadcast) -> Result<()>;
}

/// REST location history.
pub trait LocationStore {
    fn save_location(&mut self, location: &SavedLocation) -> Result<()>;
    fn history(&mut self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>>;
}

/// One-shot position fetch used by the fallback path.
pub trait GeolocationProvider {
    fn current_position(&mut self, options: &GeolocationOptions) -> Result<RawSample>;
}
