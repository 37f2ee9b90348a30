//! IO modules - external system interfaces
//!
//! - `http` - HTTP transport seam (reqwest implementation)
//! - `auth` - OAuth password-grant token requests
//! - `fetcher` - Housekeeping overview and room details pages
//! - `mqtt_egress` - MQTT publisher for room state
//! - `prometheus` - Prometheus metrics and control HTTP endpoint

pub mod auth;
pub mod fetcher;
pub mod http;
pub mod mqtt_egress;
pub mod prometheus;

pub use auth::{AuthError, TokenProvider};
pub use fetcher::{FetchError, FetchReport, HousekeepingFetcher};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use mqtt_egress::MqttRoomPublisher;
