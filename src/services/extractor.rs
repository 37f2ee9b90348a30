//! Raw room record → normalized `RoomStatus`
//!
//! Each endpoint keeps its own status path and its own default:
//! - housekeeping overview: `housekeeping.housekeepingRoomStatus.housekeepingStatus`, default `"Not found"`
//! - room details: `housekeeping.roomStatus.frontOfficeStatus`, default `"Unknown"`
//!
//! A missing `roomId` becomes `"Unknown"` for both.

use crate::domain::types::{Endpoint, RawRoomRecord, RoomStatus};
use serde_json::Value;

pub const MISSING_ROOM_ID: &str = "Unknown";
pub const OVERVIEW_STATUS_DEFAULT: &str = "Not found";
pub const ROOM_DETAILS_STATUS_DEFAULT: &str = "Unknown";

const OVERVIEW_STATUS_PATH: [&str; 3] =
    ["housekeeping", "housekeepingRoomStatus", "housekeepingStatus"];
const ROOM_DETAILS_STATUS_PATH: [&str; 3] = ["housekeeping", "roomStatus", "frontOfficeStatus"];

/// Status used when a record has no status at the endpoint's path
pub fn status_default(endpoint: Endpoint) -> &'static str {
    match endpoint {
        Endpoint::HousekeepingOverview => OVERVIEW_STATUS_DEFAULT,
        Endpoint::RoomDetails => ROOM_DETAILS_STATUS_DEFAULT,
    }
}

fn status_path(endpoint: Endpoint) -> &'static [&'static str] {
    match endpoint {
        Endpoint::HousekeepingOverview => &OVERVIEW_STATUS_PATH,
        Endpoint::RoomDetails => &ROOM_DETAILS_STATUS_PATH,
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(key))
}

/// Strings as-is, numbers stringified, everything else treated as absent
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize one raw record
pub fn extract(raw: &RawRoomRecord, endpoint: Endpoint) -> RoomStatus {
    let room_id = raw
        .get("roomId")
        .and_then(scalar_string)
        .unwrap_or_else(|| MISSING_ROOM_ID.to_string());

    let status_code = lookup(raw, status_path(endpoint))
        .and_then(scalar_string)
        .unwrap_or_else(|| status_default(endpoint).to_string());

    RoomStatus::new(room_id, status_code)
}

/// Normalize a whole fetched batch, preserving order
pub fn extract_all(raws: &[RawRoomRecord], endpoint: Endpoint) -> Vec<RoomStatus> {
    raws.iter().map(|raw| extract(raw, endpoint)).collect()
}
