//! MQTT publisher for room state
//!
//! Consumes `RoomEvent`s from the room event channel and publishes retained
//! messages so a late subscriber sees the current state of every room:
//! - `{prefix}/{hotel_id}/room/{room_id}/config` - status entity announcement, on create (QoS 1)
//! - `{prefix}/{hotel_id}/room/{room_id}/occupied/config` - occupancy entity announcement, on create (QoS 1)
//! - `{prefix}/{hotel_id}/room/{room_id}/state` - current state, on every event (QoS 1)

use crate::domain::types::RoomState;
use crate::infra::config::Config;
use crate::services::sink::RoomEvent;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Retained state payload
#[derive(Debug, Serialize)]
pub struct RoomStatePayload<'a> {
    pub room_id: &'a str,
    pub status: &'a str,
    pub occupied: bool,
    /// RFC 3339 time of the last sighting
    pub ts: String,
}

/// Retained announcement payload
///
/// `value_field` names the state payload field the entity reads.
#[derive(Debug, Serialize)]
pub struct RoomConfigPayload<'a> {
    pub room_id: &'a str,
    pub hotel_id: &'a str,
    pub name: String,
    pub state_topic: String,
    pub value_field: &'static str,
}

/// Topic builder for one hotel
#[derive(Debug, Clone)]
pub struct RoomTopics {
    base: String,
}

impl RoomTopics {
    pub fn new(prefix: &str, hotel_id: &str) -> Self {
        Self { base: format!("{}/{}/room", prefix.trim_end_matches('/'), hotel_id) }
    }

    pub fn state(&self, room_id: &str) -> String {
        format!("{}/{}/state", self.base, room_id)
    }

    pub fn config(&self, room_id: &str) -> String {
        format!("{}/{}/config", self.base, room_id)
    }

    pub fn occupied_config(&self, room_id: &str) -> String {
        format!("{}/{}/occupied/config", self.base, room_id)
    }
}

pub fn state_payload(room: &RoomState) -> serde_json::Result<String> {
    serde_json::to_string(&RoomStatePayload {
        room_id: room.room_id().as_str(),
        status: room.status_code(),
        occupied: room.occupied(),
        ts: room.last_updated().to_rfc3339(),
    })
}

pub fn config_payload(room: &RoomState, hotel_id: &str, topics: &RoomTopics) -> serde_json::Result<String> {
    let room_id = room.room_id().as_str();
    serde_json::to_string(&RoomConfigPayload {
        room_id,
        hotel_id,
        name: format!("{} Room {}", hotel_id, room_id),
        state_topic: topics.state(room_id),
        value_field: "status",
    })
}

pub fn occupied_config_payload(
    room: &RoomState,
    hotel_id: &str,
    topics: &RoomTopics,
) -> serde_json::Result<String> {
    let room_id = room.room_id().as_str();
    serde_json::to_string(&RoomConfigPayload {
        room_id,
        hotel_id,
        name: format!("{} Room {} Occupied", hotel_id, room_id),
        state_topic: topics.state(room_id),
        value_field: "occupied",
    })
}

/// MQTT room publisher actor
pub struct MqttRoomPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<RoomEvent>,
    topics: RoomTopics,
    hotel_id: String,
}

impl MqttRoomPublisher {
    /// Create a publisher connected to the configured broker
    pub fn new(config: &Config, rx: mpsc::Receiver<RoomEvent>) -> Self {
        let client_id = format!("ohip-room-sync-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            rx,
            topics: RoomTopics::new(config.mqtt_topic_prefix(), config.hotel_id()),
            hotel_id: config.hotel_id().to_string(),
        }
    }

    /// Run until shutdown, then flush what is already queued
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(topics = %self.topics.state("+"), "mqtt_egress_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        while let Ok(event) = self.rx.try_recv() {
                            self.publish_event(event).await;
                        }
                        return;
                    }
                }
                event = self.rx.recv() => match event {
                    Some(event) => self.publish_event(event).await,
                    None => return,
                },
            }
        }
    }

    async fn publish_event(&self, event: RoomEvent) {
        let room = event.room();
        let room_id = room.room_id().as_str();

        if let RoomEvent::Created(_) = &event {
            match config_payload(room, &self.hotel_id, &self.topics) {
                Ok(json) => self.publish(self.topics.config(room_id), json).await,
                Err(e) => error!(room_id = %room_id, error = %e, "mqtt_egress_encode_failed"),
            }
            match occupied_config_payload(room, &self.hotel_id, &self.topics) {
                Ok(json) => self.publish(self.topics.occupied_config(room_id), json).await,
                Err(e) => error!(room_id = %room_id, error = %e, "mqtt_egress_encode_failed"),
            }
        }

        match state_payload(room) {
            Ok(json) => self.publish(self.topics.state(room_id), json).await,
            Err(e) => error!(room_id = %room_id, error = %e, "mqtt_egress_encode_failed"),
        }
    }

    async fn publish(&self, topic: String, json: String) {
        if let Err(e) = self.client.publish(&topic, QoS::AtLeastOnce, true, json.into_bytes()).await {
            error!(topic = %topic, error = %e, "mqtt_egress_publish_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RoomStatus;

    #[test]
    fn test_topics() {
        let topics = RoomTopics::new("ohip/", "HOTEL1");
        assert_eq!(topics.state("101"), "ohip/HOTEL1/room/101/state");
        assert_eq!(topics.config("101"), "ohip/HOTEL1/room/101/config");
        assert_eq!(topics.occupied_config("101"), "ohip/HOTEL1/room/101/occupied/config");
    }

    #[test]
    fn test_state_payload() {
        let room = RoomState::new(&RoomStatus::new("101", "Occupied"));
        let json: serde_json::Value = serde_json::from_str(&state_payload(&room).unwrap()).unwrap();

        assert_eq!(json["room_id"], "101");
        assert_eq!(json["status"], "Occupied");
        assert_eq!(json["occupied"], true);
        assert!(json["ts"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_config_payload_points_at_state_topic() {
        let topics = RoomTopics::new("ohip", "HOTEL1");
        let room = RoomState::new(&RoomStatus::new("204", "Vacant"));
        let json: serde_json::Value =
            serde_json::from_str(&config_payload(&room, "HOTEL1", &topics).unwrap()).unwrap();

        assert_eq!(json["name"], "HOTEL1 Room 204");
        assert_eq!(json["room_id"], "204");
        assert_eq!(json["hotel_id"], "HOTEL1");
        assert_eq!(json["state_topic"], "ohip/HOTEL1/room/204/state");
        assert_eq!(json["value_field"], "status");
    }

    #[test]
    fn test_announcement_names_unique_across_hotels() {
        let room = RoomState::new(&RoomStatus::new("101", "Vacant"));
        let name = |hotel: &str| {
            let topics = RoomTopics::new("ohip", hotel);
            let json: serde_json::Value =
                serde_json::from_str(&config_payload(&room, hotel, &topics).unwrap()).unwrap();
            json["name"].as_str().unwrap().to_string()
        };
        assert_ne!(name("HOTEL1"), name("HOTEL2"));
    }

    #[test]
    fn test_occupied_config_payload() {
        let topics = RoomTopics::new("ohip", "HOTEL1");
        let room = RoomState::new(&RoomStatus::new("204", "Vacant"));
        let json: serde_json::Value =
            serde_json::from_str(&occupied_config_payload(&room, "HOTEL1", &topics).unwrap()).unwrap();

        assert_eq!(json["name"], "HOTEL1 Room 204 Occupied");
        assert_eq!(json["room_id"], "204");
        assert_eq!(json["state_topic"], "ohip/HOTEL1/room/204/state");
        assert_eq!(json["value_field"], "occupied");
    }
}
