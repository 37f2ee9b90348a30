//! Shared types for the room sync service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Status string that marks a room as not occupied
pub const VACANT: &str = "Vacant";

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for room IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Upstream API credentials
///
/// Immutable once built. A configuration change replaces the whole set.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host_url: String,
    pub app_key: String,
    pub hotel_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Host URL without a trailing slash, ready for path concatenation
    pub fn base_url(&self) -> &str {
        self.host_url.trim_end_matches('/')
    }

    /// Names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("host_url", &self.host_url),
            ("app_key", &self.app_key),
            ("hotel_id", &self.hotel_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("username", &self.username),
            ("password", &self.password),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host_url", &self.host_url)
            .field("hotel_id", &self.hotel_id)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("app_key", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token obtained from the token endpoint
#[derive(Clone)]
pub struct AuthToken {
    value: String,
    obtained_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), obtained_at: Utc::now() }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Decoded JSON object for one room, shape depends on the endpoint
pub type RawRoomRecord = serde_json::Value;

/// Upstream endpoint a room list is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// `hsk/v1/.../housekeepingOverview`, paged by floor
    #[serde(rename = "housekeeping")]
    HousekeepingOverview,
    /// `fof/v1/.../rooms`, single page
    #[serde(rename = "rooms")]
    RoomDetails,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::HousekeepingOverview => "housekeeping",
            Endpoint::RoomDetails => "rooms",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized status for one room from a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub status_code: String,
}

impl RoomStatus {
    pub fn new(room_id: impl Into<RoomId>, status_code: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), status_code: status_code.into() }
    }
}

/// Tracked room state
///
/// `occupied` is always `status_code != "Vacant"`; fields are only written
/// through `new` and `apply` so the two never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomState {
    room_id: RoomId,
    status_code: String,
    occupied: bool,
    last_updated: DateTime<Utc>,
}

impl RoomState {
    pub fn new(status: &RoomStatus) -> Self {
        Self {
            room_id: status.room_id.clone(),
            status_code: status.status_code.clone(),
            occupied: is_occupied(&status.status_code),
            last_updated: Utc::now(),
        }
    }

    /// Overwrite the status in place. Returns true if the status changed.
    pub fn apply(&mut self, status_code: &str) -> bool {
        let changed = self.status_code != status_code;
        if changed {
            self.status_code = status_code.to_string();
            self.occupied = is_occupied(status_code);
        }
        self.last_updated = Utc::now();
        changed
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn status_code(&self) -> &str {
        &self.status_code
    }

    pub fn occupied(&self) -> bool {
        self.occupied
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

#[inline]
pub fn is_occupied(status_code: &str) -> bool {
    status_code != VACANT
}
