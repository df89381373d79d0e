//! harborlink watcher entry point.
//!
//! Usage: `harborlink-watch [config.toml]`, with the bearer token in
//! `HARBORLINK_TOKEN`.

mod config;

use std::path::PathBuf;

use harborlink_protocol::events;
use harborlink_realtime::{ConnectionManager, Event, WsTransport, default_config_path};
use tracing_subscriber::EnvFilter;

use crate::config::WatchConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting harborlink watcher");

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_config_path);
    let config = match &path {
        Some(path) => {
            let config = WatchConfig::load(path)?;
            tracing::info!(path = %path.display(), "configuration loaded");
            config
        }
        None => WatchConfig::default(),
    };

    let token = std::env::var("HARBORLINK_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    if token.is_none() {
        tracing::warn!("HARBORLINK_TOKEN not set, connecting without credentials");
    }

    let transport = WsTransport::new(config.manager.transport.clone());
    let manager = ConnectionManager::spawn(transport, config.manager.clone());
    subscribe_logging(&manager)?;

    for vessel in &config.rooms.vessels {
        manager.join_vessel_room(vessel)?;
    }
    for area in &config.rooms.areas {
        manager.join_area_room(area)?;
    }

    tracing::info!(url = %config.manager.transport.url, "connecting");
    manager.connect(token.as_deref())?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    manager.shutdown().await;
    Ok(())
}

fn subscribe_logging(manager: &ConnectionManager) -> anyhow::Result<()> {
    for topic in events::PUSH_TOPICS {
        manager.subscribe(topic, |e| {
            tracing::info!(event = e.name(), data = %e.data(), "push");
        })?;
    }

    manager.subscribe(events::STATE_CHANGED, |e| {
        if let Event::StateChanged { from, to } = e {
            tracing::info!(%from, %to, "connection state changed");
        }
    })?;

    manager.subscribe(events::ROOM_JOINED, |e| {
        tracing::info!(data = %e.data(), "room joined");
    })?;
    manager.subscribe(events::ROOM_JOIN_ERROR, |e| {
        tracing::warn!(data = %e.data(), "room join failed");
    })?;
    manager.subscribe(events::RECONNECT_FAILED, |_| {
        tracing::error!("gave up reconnecting; restart to try again");
    })?;
    Ok(())
}
