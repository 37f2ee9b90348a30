//! Domain models - core room sync types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Credentials` - upstream API credentials, supplied once at startup
//! - `AuthToken` - bearer token obtained at the start of each sync cycle
//! - `RoomStatus` - normalized `(room_id, status_code)` pair from one raw record
//! - `RoomState` - tracked room as observed by sensor consumers
//! - `Endpoint` - which upstream endpoint a record came from

pub mod types;

// Re-export commonly used types at module level
pub use types::{AuthToken, Credentials, Endpoint, RawRoomRecord, RoomId, RoomState, RoomStatus};
