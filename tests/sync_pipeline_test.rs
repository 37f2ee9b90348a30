//! End-to-end sync cycles against a scripted upstream

mod common;

use common::{credentials, overview_page, room_details_page, ScriptedTransport};
use ohip_room_sync::domain::{Endpoint, RoomId};
use ohip_room_sync::infra::Metrics;
use ohip_room_sync::io::AuthError;
use ohip_room_sync::services::{
    create_room_event_channel, FanoutSink, LogSink, RoomEvent, RoomStateRegistry, SchedulerState,
    SyncError, SyncPipeline, SyncScheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Fixture {
    transport: Arc<ScriptedTransport>,
    registry: Arc<RoomStateRegistry>,
    metrics: Arc<Metrics>,
    events: mpsc::Receiver<RoomEvent>,
    pipeline: SyncPipeline,
}

fn fixture(endpoint: Endpoint, floors: Vec<u32>) -> Fixture {
    let transport = Arc::new(ScriptedTransport::new());
    let registry = Arc::new(RoomStateRegistry::new());
    let metrics = Arc::new(Metrics::new());
    let (channel_sink, events) = create_room_event_channel(64, metrics.clone());
    let sink = FanoutSink::new().with(Arc::new(LogSink)).with(Arc::new(channel_sink));

    let pipeline = SyncPipeline::new(
        transport.clone(),
        endpoint,
        floors,
        registry.clone(),
        Arc::new(sink),
        metrics.clone(),
    );
    Fixture { transport, registry, metrics, events, pipeline }
}

fn drain(rx: &mut mpsc::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_two_cycles_create_then_update() {
    let mut f = fixture(Endpoint::HousekeepingOverview, vec![1]);
    let creds = credentials("https://ohip.example.com/");

    f.transport.set_page("floor=1", overview_page(&[("101", "Vacant"), ("102", "Occupied")]));
    let report = f.pipeline.run_cycle(&creds).await.unwrap();
    assert_eq!((report.created, report.updated), (2, 0));

    let events = drain(&mut f.events);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, RoomEvent::Created(_))));

    f.transport.set_page("floor=1", overview_page(&[("101", "Occupied")]));
    let report = f.pipeline.run_cycle(&creds).await.unwrap();
    assert_eq!((report.created, report.updated, report.changed), (0, 1, 1));

    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        RoomEvent::Updated(room) => {
            assert_eq!(room.room_id().as_str(), "101");
            assert_eq!(room.status_code(), "Occupied");
            assert!(room.occupied());
        }
        other => panic!("expected update, got {other:?}"),
    }

    assert!(f.registry.contains(&RoomId::from("102")));
    let room_102 = f.registry.get(&RoomId::from("102")).unwrap();
    assert_eq!(room_102.status_code(), "Occupied");
    assert_eq!(f.registry.len(), 2);

    let calls = f.transport.calls();
    assert!(calls[0].starts_with("POST https://ohip.example.com/oauth/v1/tokens"));
    assert!(calls[1].contains("/hsk/v1/hotels/HOTEL1/housekeepingOverview?limit=100&floor=1"));
}

#[tokio::test]
async fn test_room_details_endpoint_defaults() {
    let mut f = fixture(Endpoint::RoomDetails, vec![]);
    let creds = credentials("https://ohip.example.com");

    let mut page = room_details_page(&[("201", "Vacant")]);
    page["hotelRoomsDetails"]["room"]
        .as_array_mut()
        .unwrap()
        .push(serde_json::json!({ "roomId": "202" }));
    f.transport.set_page("/fof/v1/hotels/HOTEL1/rooms", page);

    let report = f.pipeline.run_cycle(&creds).await.unwrap();
    assert_eq!(report.pages_ok, 1);
    assert_eq!(report.created, 2);
    assert_eq!(f.registry.get(&RoomId::from("202")).unwrap().status_code(), "Unknown");
    assert!(!f.registry.get(&RoomId::from("201")).unwrap().occupied());
    assert_eq!(drain(&mut f.events).len(), 2);
}

#[tokio::test]
async fn test_auth_failure_changes_nothing() {
    let mut f = fixture(Endpoint::HousekeepingOverview, vec![1, 2, 3]);
    let creds = credentials("https://ohip.example.com");
    f.transport.set_token_status(401);

    let err = f.pipeline.run_cycle(&creds).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(AuthError::Status(401))));
    assert_eq!(f.transport.calls().len(), 1);
    assert!(f.registry.is_empty());
    assert!(drain(&mut f.events).is_empty());
}

#[tokio::test]
async fn test_failed_floor_is_skipped() {
    let f = fixture(Endpoint::HousekeepingOverview, vec![1, 2, 3]);
    let creds = credentials("https://ohip.example.com");
    f.transport.set_page("floor=1", overview_page(&[("101", "Vacant")]));
    f.transport.set_page_status("floor=2", 503);
    f.transport.set_page("floor=3", overview_page(&[("301", "Occupied")]));

    let report = f.pipeline.run_cycle(&creds).await.unwrap();
    assert_eq!(report.pages_ok, 2);
    assert_eq!(report.pages_failed, 1);
    assert_eq!(f.registry.len(), 2);
    assert_eq!(f.metrics.summary().page_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_recovers_after_auth_failure() {
    let f = fixture(Endpoint::HousekeepingOverview, vec![1]);
    f.transport.set_token_status(500);
    f.transport.set_page("floor=1", overview_page(&[("101", "Dirty")]));

    let transport = f.transport.clone();
    let registry = f.registry.clone();
    let metrics = f.metrics.clone();
    let scheduler = SyncScheduler::spawn(
        f.pipeline,
        credentials("https://ohip.example.com"),
        Duration::from_secs(60),
    );
    let handle = scheduler.handle();

    while metrics.cycles_failed() < 1 || handle.state() != SchedulerState::Idle {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(registry.is_empty());

    // Next timer tick succeeds
    transport.set_token_status(200);
    tokio::time::sleep(Duration::from_secs(61)).await;
    while metrics.cycles_succeeded() < 1 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(registry.get(&RoomId::from("101")).unwrap().status_code(), "Dirty");

    scheduler.shutdown().await;
}
