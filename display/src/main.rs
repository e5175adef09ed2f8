use std::sync::Arc;

use clap::Parser;
use display::DisplayError;
use display::api::HttpContentSource;
use display::config::DisplayArgs;
use display::presence::{HttpPresenceSensor, NoSensor, PresenceSensor};
use display::runtime::{DisplayRuntime, DisplayView};
use display::subscriber::{HttpStreamTransport, spawn_subscriber};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DisplayError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = DisplayArgs::parse();
    let client = reqwest::Client::builder().build()?;

    let content = Arc::new(HttpContentSource::new(client.clone(), &args.base_url)?);
    let transport = HttpStreamTransport::new(client.clone(), &args.base_url)?;
    let sensor: Arc<dyn PresenceSensor> = match &args.sensor_url {
        Some(url) => Arc::new(HttpPresenceSensor::new(client, url.clone())),
        None => Arc::new(NoSensor),
    };

    let (updates_tx, updates_rx) = mpsc::channel(64);
    let subscriber = spawn_subscriber(transport, args.subscriber_config(), updates_tx);

    // No renderer is attached to this binary; the sender stays alive so the
    // runtime keeps its media-end branch open.
    let (_media_end_tx, media_end_rx) = mpsc::channel(8);
    let (runtime, mut view) = DisplayRuntime::new(args.board_id, content, sensor);
    let runtime = runtime.with_refresh_interval(args.refresh_interval());

    tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let state = view.borrow_and_update().clone();
            match &state.view {
                DisplayView::Primary => info!(offline = state.offline, sensing = state.sensing, "showing primary content"),
                DisplayView::Advertisement(item) => {
                    info!(ad_id = %item.id, media_type = item.media_type.as_str(), url = %item.url, "showing advertisement");
                }
            }
        }
    });

    info!(board_id = %args.board_id, base_url = %args.base_url, "display starting");
    runtime
        .run(updates_rx, subscriber.status(), media_end_rx, shutdown_signal())
        .await;
    drop(subscriber);
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the display keeps
/// running until killed.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "ctrl-c handler unavailable, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
