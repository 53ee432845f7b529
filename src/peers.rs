//! Latest peer positions and the online-user roster.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::route::MovementStatus;
use crate::transport::{ConnectedUser, PeerSample};
use crate::GpsPoint;

/// Identifier used for the local user's own roster entry.
pub const SELF_ID: &str = "me";

/// One row of the online-users drawer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub timestamp: i64,
    pub moving: bool,
    pub seconds_stationary: u64,
}

/// A peer positioned on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPosition {
    pub peer_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub position: GpsPoint,
    pub timestamp: i64,
    pub moving: bool,
}

/// State received from the realtime channel about other clients.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    locations: HashMap<String, PeerSample>,
    connected: Vec<ConnectedUser>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the peer map with a fresh `locations` event.
    pub fn update_locations(&mut self, locations: HashMap<String, PeerSample>) {
        self.locations = locations;
    }

    /// Replace the connected-user list with a fresh `connectedUsers` event.
    pub fn update_connected(&mut self, users: Vec<ConnectedUser>) {
        self.connected = users;
    }

    pub fn peer_count(&self) -> usize {
        self.locations.len()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Peers with a valid position, sorted by name then id.
    ///
    /// A peer that does not report its own movement flag counts as moving
    /// while its last update is younger than `window_ms`.
    pub fn peer_positions(&self, now_ms: i64, window_ms: i64) -> Vec<PeerPosition> {
        let mut peers: Vec<PeerPosition> = self
            .locations
            .iter()
            .filter_map(|(id, sample)| {
                let position = GpsPoint::new(sample.lat, sample.lng);
                position.is_valid().then(|| PeerPosition {
                    peer_id: id.clone(),
                    name: sample.name.clone(),
                    avatar: sample.avatar.clone(),
                    position,
                    timestamp: sample.timestamp,
                    moving: sample
                        .moving
                        .unwrap_or(now_ms - sample.timestamp < window_ms),
                })
            })
            .collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.peer_id.cmp(&b.peer_id)));
        peers
    }

    /// Build the drawer list.
    ///
    /// Admins see every connected user, followed by their own entry. Peer
    /// movement is not reported by the server, so connected users are shown
    /// as moving. Everyone else sees only their own entry.
    pub fn roster(
        &self,
        is_admin: bool,
        own_name: &str,
        own_avatar: Option<&str>,
        own_status: MovementStatus,
        now_ms: i64,
    ) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = if is_admin {
            self.connected
                .iter()
                .map(|user| RosterEntry {
                    id: user.socket_id.clone(),
                    name: user.name.clone(),
                    avatar: user.avatar.clone(),
                    timestamp: now_ms,
                    moving: true,
                    seconds_stationary: 0,
                })
                .collect()
        } else {
            Vec::new()
        };

        entries.push(RosterEntry {
            id: SELF_ID.to_string(),
            name: own_name.to_string(),
            avatar: own_avatar.map(str::to_string),
            timestamp: now_ms,
            moving: own_status.moving,
            seconds_stationary: own_status.seconds_stationary,
        });
        entries
    }
}
