//! Housekeeping / room status fetcher
//!
//! Endpoints:
//! - `GET {host}/hsk/v1/hotels/{hotel}/housekeepingOverview?limit=100&floor={n}`,
//!   rooms at `housekeepingRoomInfo.housekeepingRooms.room`
//! - `GET {host}/fof/v1/hotels/{hotel}/rooms`, rooms at `hotelRoomsDetails.room`
//!
//! Page policy:
//! - transport failure, timeout, non-2xx status: `FetchError` for that page
//! - body that is not JSON: `FetchError::Parse` for that page
//! - JSON body without the room list path: empty page, not an error
//!
//! `fetch_all` skips failed pages and keeps going with the rest.

use crate::domain::types::{AuthToken, Credentials, Endpoint, RawRoomRecord};
use crate::io::http::{HttpTransport, TransportError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Page size requested from the housekeeping overview endpoint
pub const FLOOR_PAGE_LIMIT: u32 = 100;

/// Floors queried when none are configured
pub const DEFAULT_FLOORS: [u32; 3] = [1, 2, 3];

const OVERVIEW_LIST_PATH: [&str; 3] = ["housekeepingRoomInfo", "housekeepingRooms", "room"];
const ROOM_DETAILS_LIST_PATH: [&str; 2] = ["hotelRoomsDetails", "room"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned a body that is not JSON: {cause}")]
    Parse { url: String, cause: String },
    #[error("{url} request failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Parse { url, .. }
            | FetchError::Transport { url, .. } => url,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Transport { source, .. } if source.is_timeout())
    }
}

/// One page that could not be fetched
#[derive(Debug)]
pub struct PageFailure {
    /// Floor index, `None` for the single-page room details endpoint
    pub floor: Option<u32>,
    pub error: FetchError,
}

/// Result of fetching every page for one cycle
#[derive(Debug)]
pub struct FetchReport {
    pub endpoint: Endpoint,
    pub rooms: Vec<RawRoomRecord>,
    pub pages_ok: usize,
    pub failures: Vec<PageFailure>,
}

impl FetchReport {
    pub fn pages_total(&self) -> usize {
        self.pages_ok + self.failures.len()
    }
}

/// Log page failure (cold path)
#[cold]
fn log_page_failed(floor: Option<u32>, e: &FetchError) {
    warn!(
        floor = ?floor,
        url = %e.url(),
        status = ?e.status(),
        timeout = e.is_timeout(),
        error = %e,
        "page_fetch_failed"
    );
}

/// Pull the room list out of a decoded response body
///
/// Missing path or a non-array value yields an empty list.
pub fn extract_room_list(body: &Value, endpoint: Endpoint) -> Vec<RawRoomRecord> {
    let path: &[&str] = match endpoint {
        Endpoint::HousekeepingOverview => &OVERVIEW_LIST_PATH,
        Endpoint::RoomDetails => &ROOM_DETAILS_LIST_PATH,
    };

    let mut node = body;
    for key in path {
        match node.get(key) {
            Some(next) => node = next,
            None => return Vec::new(),
        }
    }

    match node.as_array() {
        Some(rooms) => rooms.clone(),
        None => Vec::new(),
    }
}

pub struct HousekeepingFetcher {
    transport: Arc<dyn HttpTransport>,
    endpoint: Endpoint,
    floors: Vec<u32>,
}

impl HousekeepingFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: Endpoint, floors: Vec<u32>) -> Self {
        let floors = if floors.is_empty() { DEFAULT_FLOORS.to_vec() } else { floors };
        Self { transport, endpoint, floors }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn floors(&self) -> &[u32] {
        &self.floors
    }

    pub fn overview_url(creds: &Credentials, floor: u32) -> String {
        format!(
            "{}/hsk/v1/hotels/{}/housekeepingOverview?limit={}&floor={}",
            creds.base_url(),
            creds.hotel_id,
            FLOOR_PAGE_LIMIT,
            floor
        )
    }

    pub fn rooms_url(creds: &Credentials) -> String {
        format!("{}/fof/v1/hotels/{}/rooms", creds.base_url(), creds.hotel_id)
    }

    fn request_headers(token: &AuthToken, creds: &Credentials) -> [(&'static str, String); 4] {
        [
            ("Accept", "application/json".to_string()),
            ("Authorization", token.bearer()),
            ("x-hotelid", creds.hotel_id.clone()),
            ("x-app-key", creds.app_key.clone()),
        ]
    }

    /// Fetch one floor of the housekeeping overview
    pub async fn fetch_floor(
        &self,
        token: &AuthToken,
        creds: &Credentials,
        floor: u32,
    ) -> Result<Vec<RawRoomRecord>, FetchError> {
        let url = Self::overview_url(creds, floor);
        self.fetch_page(&url, token, creds, Endpoint::HousekeepingOverview).await
    }

    /// Fetch the room details list
    pub async fn fetch_rooms(
        &self,
        token: &AuthToken,
        creds: &Credentials,
    ) -> Result<Vec<RawRoomRecord>, FetchError> {
        let url = Self::rooms_url(creds);
        self.fetch_page(&url, token, creds, Endpoint::RoomDetails).await
    }

    async fn fetch_page(
        &self,
        url: &str,
        token: &AuthToken,
        creds: &Credentials,
        endpoint: Endpoint,
    ) -> Result<Vec<RawRoomRecord>, FetchError> {
        let headers = Self::request_headers(token, creds);
        let response = self
            .transport
            .get(url, &headers)
            .await
            .map_err(|source| FetchError::Transport { url: url.to_string(), source })?;

        debug!(url = %url, status = response.status, bytes = response.body.len(), "page_response");

        if !response.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: response.status });
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::Parse { url: url.to_string(), cause: e.to_string() })?;

        let rooms = extract_room_list(&body, endpoint);
        if rooms.is_empty() {
            debug!(url = %url, "page_has_no_rooms");
        }
        Ok(rooms)
    }

    /// Fetch every page for the configured endpoint
    ///
    /// Floors are fetched one after another; a failed floor is recorded and
    /// skipped without affecting the others.
    pub async fn fetch_all(&self, token: &AuthToken, creds: &Credentials) -> FetchReport {
        let mut report = FetchReport {
            endpoint: self.endpoint,
            rooms: Vec::new(),
            pages_ok: 0,
            failures: Vec::new(),
        };

        match self.endpoint {
            Endpoint::HousekeepingOverview => {
                for &floor in &self.floors {
                    match self.fetch_floor(token, creds, floor).await {
                        Ok(rooms) => {
                            info!(floor = floor, rooms = rooms.len(), "floor_fetched");
                            report.pages_ok += 1;
                            report.rooms.extend(rooms);
                        }
                        Err(error) => {
                            log_page_failed(Some(floor), &error);
                            report.failures.push(PageFailure { floor: Some(floor), error });
                        }
                    }
                }
            }
            Endpoint::RoomDetails => match self.fetch_rooms(token, creds).await {
                Ok(rooms) => {
                    info!(rooms = rooms.len(), "rooms_fetched");
                    report.pages_ok += 1;
                    report.rooms.extend(rooms);
                }
                Err(error) => {
                    log_page_failed(None, &error);
                    report.failures.push(PageFailure { floor: None, error });
                }
            },
        }

        report
    }
}
