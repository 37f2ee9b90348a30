//! Room event sinks - the produced interface for sensor registration
//!
//! Created and updated rooms are separate calls: a consumer announces a new
//! entity on `on_room_created` and pushes state on `on_room_updated`.
//! Sinks must not block; the sync worker calls them inline.

use crate::domain::types::RoomState;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub trait RoomSink: Send + Sync {
    fn on_room_created(&self, room: &RoomState);
    fn on_room_updated(&self, room: &RoomState);
}

/// Logs every room event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl RoomSink for LogSink {
    fn on_room_created(&self, room: &RoomState) {
        info!(
            room_id = %room.room_id(),
            status = %room.status_code(),
            occupied = room.occupied(),
            "room_created"
        );
    }

    fn on_room_updated(&self, room: &RoomState) {
        debug!(
            room_id = %room.room_id(),
            status = %room.status_code(),
            occupied = room.occupied(),
            "room_updated"
        );
    }
}

/// Room event forwarded to an async consumer
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Created(RoomState),
    Updated(RoomState),
}

impl RoomEvent {
    pub fn room(&self) -> &RoomState {
        match self {
            RoomEvent::Created(room) | RoomEvent::Updated(room) => room,
        }
    }
}

/// Forwards room events onto a bounded channel
///
/// Uses `try_send`: when the consumer falls behind, events are dropped and
/// counted rather than stalling the sync worker.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RoomEvent>,
    metrics: Arc<Metrics>,
}

impl ChannelSink {
    fn forward(&self, event: RoomEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.record_sink_event_dropped();
                warn!(room_id = %event.room().room_id(), "room_event_dropped_channel_full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_sink_event_dropped();
                debug!("room_event_channel_closed");
            }
        }
    }
}

impl RoomSink for ChannelSink {
    fn on_room_created(&self, room: &RoomState) {
        self.forward(RoomEvent::Created(room.clone()));
    }

    fn on_room_updated(&self, room: &RoomState) {
        self.forward(RoomEvent::Updated(room.clone()));
    }
}

/// Create a room event channel
///
/// Returns the sink (for the sync pipeline) and the receiver (for the consumer)
pub fn create_room_event_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (ChannelSink, mpsc::Receiver<RoomEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ChannelSink { tx, metrics }, rx)
}

/// Delivers every event to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn RoomSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn RoomSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl RoomSink for FanoutSink {
    fn on_room_created(&self, room: &RoomState) {
        for sink in &self.sinks {
            sink.on_room_created(room);
        }
    }

    fn on_room_updated(&self, room: &RoomState) {
        for sink in &self.sinks {
            sink.on_room_updated(room);
        }
    }
}

/// Records every event, for tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub events: parking_lot::Mutex<Vec<RoomEvent>>,
}

#[cfg(test)]
impl RoomSink for RecordingSink {
    fn on_room_created(&self, room: &RoomState) {
        self.events.lock().push(RoomEvent::Created(room.clone()));
    }

    fn on_room_updated(&self, room: &RoomState) {
        self.events.lock().push(RoomEvent::Updated(room.clone()));
    }
}
