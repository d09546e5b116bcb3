use anyhow::Context;
use clap::Parser;
use flowly_core::{FlowlyConfig, FlowlyError};
use flowly_hub::Hub;
use flowly_sources::{ingest, IngestError, SyntheticGenerator};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

mod app;
mod http;
mod ws;

/// Live traffic relay: fans traffic and mapping frames out to browser viewers.
#[derive(Debug, Parser)]
#[command(name = "flowly-gateway", version, about)]
struct Cli {
    /// Path to flowly.toml (defaults to $FLOWLY_CONFIG, then ./flowly.toml).
    #[arg(long)]
    config: Option<String>,

    /// Address to use for the HTTP server, e.g. 0.0.0.0:8080.
    #[arg(long)]
    listen: Option<String>,

    /// Comma-separated Kafka broker list.
    #[arg(long)]
    kafka: Option<String>,

    /// Name of the Kafka topic to consume. Required with --kafka.
    #[arg(long = "kafka-topic")]
    kafka_topic: Option<String>,

    /// Generate dummy traffic.
    #[arg(long)]
    dummy: bool,

    /// Directory with the viewer's static files.
    #[arg(long = "static-dir")]
    static_dir: Option<String>,
}

impl Cli {
    /// Flags given on the command line win over file and env settings.
    fn apply(&self, config: &mut FlowlyConfig) {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.server.static_dir = dir.clone();
        }
        if let Some(address) = &self.kafka {
            config.kafka.address = Some(address.clone());
        }
        if let Some(topic) = &self.kafka_topic {
            config.kafka.topic = Some(topic.clone());
        }
        if self.dummy {
            config.synthetic.enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "flowly_gateway=info,flowly_hub=info,flowly_sources=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let mut config = FlowlyConfig::load(cli.config.as_deref()).map_err(fatal)?;
    cli.apply(&mut config);
    config.validate().map_err(fatal)?;
    let addr = config.listen_addr().map_err(fatal)?;

    // create the hub and start routing traffic
    let (hub, handle) = Hub::new(config.hub.event_capacity);
    tokio::spawn(hub.run());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut synthetic_tasks = Vec::new();
    if config.synthetic.enabled {
        synthetic_tasks = SyntheticGenerator::new(&config.synthetic)
            .spawn(handle.clone(), shutdown_rx.clone());
    }

    let ingest_task = if config.kafka.enabled() {
        let task = ingest::start(&config.kafka, handle.clone(), shutdown_rx.clone())
            .await
            .map_err(|e| fatal(external_log_error(e)))?;
        Some(task)
    } else {
        None
    };

    let state = Arc::new(app::AppState::new(config, handle));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!("Flowly gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal producers to stop
    let _ = shutdown_tx.send(true);
    for task in synthetic_tasks {
        let _ = task.await;
    }
    if let Some(task) = ingest_task {
        if let Ok(stats) = task.await {
            info!(?stats, "ingestion stopped");
        }
    }
    info!("Flowly gateway stopped");
    Ok(())
}

/// Startup failures are logged with their code before the process exits.
fn fatal(err: FlowlyError) -> anyhow::Error {
    error!(code = err.code(), "{err}");
    err.into()
}

fn external_log_error(err: IngestError) -> FlowlyError {
    FlowlyError::ExternalLog(err.to_string())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("could not listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "flowly-gateway",
            "--listen",
            "127.0.0.1:9999",
            "--kafka",
            "broker:9092",
            "--kafka-topic",
            "flowly",
            "--dummy",
        ]);
        let mut config = FlowlyConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.server.listen, "127.0.0.1:9999");
        assert_eq!(config.kafka.address.as_deref(), Some("broker:9092"));
        assert_eq!(config.kafka.topic.as_deref(), Some("flowly"));
        assert!(config.synthetic.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ingest_connect_failure_is_an_external_log_error() {
        let err = external_log_error(IngestError::Connect("broker:9092: refused".to_string()));
        assert_eq!(err.code(), "EXTERNAL_LOG_ERROR");
        assert!(matches!(err, FlowlyError::ExternalLog(ref msg) if msg.contains("broker:9092")));
    }

    #[test]
    fn kafka_without_topic_fails_validation() {
        let cli = Cli::parse_from(["flowly-gateway", "--kafka", "broker:9092"]);
        let mut config = FlowlyConfig::default();
        cli.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
