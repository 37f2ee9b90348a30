//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ohip_room_sync::domain::Credentials;
use ohip_room_sync::io::{HttpResponse, HttpTransport, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;

pub fn credentials(host_url: &str) -> Credentials {
    Credentials {
        host_url: host_url.to_string(),
        app_key: "app-key".to_string(),
        hotel_id: "HOTEL1".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        username: "user".to_string(),
        password: "pass".to_string(),
    }
}

/// Housekeeping overview page body
pub fn overview_page(rooms: &[(&str, &str)]) -> Value {
    let rooms: Vec<Value> = rooms
        .iter()
        .map(|(id, status)| {
            json!({
                "roomId": id,
                "housekeeping": { "housekeepingRoomStatus": { "housekeepingStatus": status } }
            })
        })
        .collect();
    json!({ "housekeepingRoomInfo": { "housekeepingRooms": { "room": rooms } } })
}

/// Room details page body
pub fn room_details_page(rooms: &[(&str, &str)]) -> Value {
    let rooms: Vec<Value> = rooms
        .iter()
        .map(|(id, status)| {
            json!({
                "roomId": id,
                "housekeeping": { "roomStatus": { "frontOfficeStatus": status } }
            })
        })
        .collect();
    json!({ "hotelRoomsDetails": { "room": rooms } })
}

/// Transport that answers from a table keyed by URL suffix
///
/// The token endpoint answers with `token_status`; GETs not in the table get 404.
pub struct ScriptedTransport {
    token_status: Mutex<u16>,
    pages: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            token_status: Mutex::new(200),
            pages: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_token_status(&self, status: u16) {
        *self.token_status.lock() = status;
    }

    pub fn set_page(&self, url_suffix: &str, body: Value) {
        self.pages.lock().insert(url_suffix.to_string(), HttpResponse::new(200, body.to_string()));
    }

    pub fn set_page_status(&self, url_suffix: &str, status: u16) {
        self.pages.lock().insert(url_suffix.to_string(), HttpResponse::new(status, ""));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        _headers: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push(format!("GET {url}"));
        let pages = self.pages.lock();
        let response = pages
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| HttpResponse::new(404, ""));
        Ok(response)
    }

    async fn post_form(
        &self,
        url: &str,
        _headers: &[(&str, String)],
        _form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push(format!("POST {url}"));
        let status = *self.token_status.lock();
        if status == 200 {
            Ok(HttpResponse::new(200, r#"{"access_token":"integration-token"}"#))
        } else {
            Ok(HttpResponse::new(status, ""))
        }
    }
}
