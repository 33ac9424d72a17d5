//! Control-plane daemon: wires the stores, the provider adapters, and the
//! HTTP bridge together and serves until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use acp_bridge::state::ApiState;
use acp_bridge::{api_router, watcher};
use acp_core::settings::{EventTransport, Settings};
use acp_engine::events::EventBus;
use acp_integrations::github::GitHubFactory;
use acp_integrations::tracker::JiraTrackerFactory;
use acp_store::{
    CredentialBroker, KubeCredentialBroker, KubeResourceStore, MemoryCredentialBroker,
    MemoryResourceStore, ResourceStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    acp_telemetry::logging::init("acp-daemon");

    let settings = Settings::from_env();
    info!(
        bind = %settings.bind_addr,
        transport = %settings.event_transport,
        "acp-daemon starting"
    );

    // `ACP_STORE=memory` runs against the in-memory store for single-node
    // development; anything else connects to the cluster.
    let memory_mode = std::env::var("ACP_STORE").as_deref() == Ok("memory");
    let (user_store, sa_store, broker, kube_client): (
        Arc<dyn ResourceStore>,
        Arc<dyn ResourceStore>,
        Arc<dyn CredentialBroker>,
        Option<kube::Client>,
    ) = if memory_mode {
        warn!("running with the in-memory store; nothing will persist");
        let store = Arc::new(MemoryResourceStore::new());
        (store.clone(), store, Arc::new(MemoryCredentialBroker::new()), None)
    } else {
        let client = kube::Client::try_default()
            .await
            .context("failed to build the cluster client")?;
        info!("connected to the cluster");
        // Two handles, two authorities. The user-scoped handle is configured
        // by the tenancy middleware in front of this process; in-cluster
        // both default to the pod's own credentials.
        (
            Arc::new(KubeResourceStore::new(client.clone())),
            Arc::new(KubeResourceStore::new(client.clone())),
            Arc::new(KubeCredentialBroker::new(client.clone())),
            Some(client),
        )
    };

    let bus = EventBus::new();
    let state = Arc::new(ApiState::new(
        user_store,
        sa_store,
        broker,
        Arc::new(GitHubFactory),
        Arc::new(JiraTrackerFactory),
        bus,
    ));

    // At most one event transport is active per deployment.
    let mut watch_handles = Vec::new();
    if settings.event_transport == EventTransport::Watch {
        match &kube_client {
            Some(client) => {
                if settings.watched_projects.is_empty() {
                    warn!("watch transport selected but ACP_WATCHED_PROJECTS is empty");
                }
                watch_handles = watcher::spawn_session_watchers(
                    client.clone(),
                    &settings.watched_projects,
                    state.clone(),
                );
            }
            None => warn!("watch transport requires the cluster store; falling back to webhook"),
        }
    }

    let app = api_router(state).layer(TimeoutLayer::new(Duration::from_secs(60)));
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in watch_handles {
        handle.abort();
    }
    info!("acp-daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
