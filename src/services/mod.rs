//! Services - sync logic and state management
//!
//! - `extractor` - Raw room record to `RoomStatus`
//! - `reconciler` - Room state registry and create-or-update merge
//! - `sink` - Room event consumers
//! - `sync` - One authenticate/fetch/extract/reconcile cycle
//! - `scheduler` - Periodic and on-demand cycle scheduling

pub mod extractor;
pub mod reconciler;
pub mod scheduler;
pub mod sink;
pub mod sync;

pub use reconciler::{reconcile, ReconcileOutcome, RoomStateRegistry};
pub use scheduler::{SchedulerState, SyncHandle, SyncScheduler, TriggerSource};
pub use sink::{create_room_event_channel, ChannelSink, FanoutSink, LogSink, RoomEvent, RoomSink};
pub use sync::{CycleReport, SyncError, SyncPipeline};
