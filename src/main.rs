use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use txn_ingest::cli::{self, Cli, Commands};
use txn_ingest::config::Config;
use txn_ingest::metrics::MetricsRecorder;
use txn_ingest::{create_app, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt_layer)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Config) => cli::handle_config_validate(&config).await,
        Some(Commands::Ingest { path }) => {
            config.validate()?;
            cli::handle_ingest(&config, &path).await.map(|_| ())
        }
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let metrics = MetricsRecorder::new()?;
    let pipeline = startup::build_pipeline(&config, metrics, config.publish_mode()).await?;

    let app = create_app(pipeline.app_state(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    pipeline.shutdown(config.publish_timeout());
    Ok(())
}
