//! OHIP room sync - mirrors hotel housekeeping status into room sensors
//!
//! Periodically authenticates against the OHIP API, fetches the
//! housekeeping overview (or room details), and reconciles each room's
//! status into a long-lived registry exposed over HTTP and MQTT.
//!
//! Module structure:
//! - `domain/` - Core types (Credentials, RoomStatus, RoomState)
//! - `io/` - External interfaces (HTTP transport, auth, fetcher, MQTT, Prometheus)
//! - `services/` - Sync logic (extractor, reconciler, pipeline, scheduler, sinks)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use ohip_room_sync::infra::{Config, LogFormat, Metrics};
use ohip_room_sync::io::prometheus::{start_metrics_server, ServerState};
use ohip_room_sync::io::{MqttRoomPublisher, ReqwestTransport};
use ohip_room_sync::services::{
    create_room_event_channel, FanoutSink, LogSink, RoomSink, RoomStateRegistry, SyncPipeline,
    SyncScheduler,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// OHIP room sync service
#[derive(Parser, Debug)]
#[command(name = "ohip-room-sync", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Run a single sync cycle, print the registry as JSON and exit
    #[arg(long)]
    once: bool,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load_from_path(&args.config);

    init_logging(config.log_format());

    info!(git_hash = env!("GIT_HASH"), "ohip-room-sync starting");
    info!(
        config_file = %config.config_file(),
        host_url = %config.credentials().host_url,
        hotel_id = %config.hotel_id(),
        endpoint = %config.endpoint(),
        floors = ?config.floors(),
        interval_secs = config.sync_interval().as_secs(),
        request_timeout_ms = config.request_timeout().as_millis() as u64,
        prometheus_port = config.prometheus_port(),
        mqtt_egress = config.mqtt_egress_enabled(),
        "config_loaded"
    );

    config.validate().context("invalid configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let transport = Arc::new(
        ReqwestTransport::new(config.request_timeout()).context("failed to build HTTP client")?,
    );
    let registry = Arc::new(RoomStateRegistry::new());
    let metrics = Arc::new(Metrics::new());

    // Room sinks: always log, optionally publish to MQTT
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));
    if config.mqtt_egress_enabled() && !args.once {
        let (channel_sink, room_rx) = create_room_event_channel(1000, metrics.clone());
        sink = sink.with(Arc::new(channel_sink));

        let publisher = MqttRoomPublisher::new(&config, room_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });
    }
    let sink: Arc<dyn RoomSink> = Arc::new(sink);

    let pipeline = SyncPipeline::new(
        transport,
        config.endpoint(),
        config.floors().to_vec(),
        registry.clone(),
        sink,
        metrics.clone(),
    );

    if args.once {
        let report = pipeline.run_cycle(config.credentials()).await?;
        info!(
            cycle_id = %report.cycle_id,
            rooms = report.rooms_seen,
            pages_failed = report.pages_failed,
            "single_cycle_completed"
        );
        println!("{}", serde_json::to_string_pretty(&registry.snapshot())?);
        return Ok(());
    }

    let scheduler =
        SyncScheduler::spawn(pipeline, config.credentials().clone(), config.sync_interval());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let state = ServerState {
            metrics: metrics.clone(),
            registry: registry.clone(),
            handle: scheduler.handle(),
            hotel_id: config.hotel_id().to_string(),
        };
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(prometheus_port, state, prom_shutdown).await {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Periodic metrics log line
    let metrics_reporter = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick fires immediately and would log an empty window
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => metrics_reporter.report().log(),
                _ = reporter_shutdown.changed() => return,
            }
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);
    scheduler.shutdown().await;
    metrics.report().log();

    info!("ohip-room-sync shutdown complete");
    Ok(())
}
