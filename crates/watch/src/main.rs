//! `notekeep-watch` -- headless host for the notes data layer.
//!
//! Builds the REST client, the live-update connection and the store from
//! the environment, loads the first page of notes and logs every store
//! event until Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default                 | Description                  |
//! |----------------------|----------|-------------------------|------------------------------|
//! | `NOTES_API_BASE_URL` | no       | --                      | REST base URL                |
//! | `NOTES_API_URL`      | no       | --                      | Fallback REST base URL       |
//! | `NOTES_WS_URL`       | no       | --                      | Live-update WebSocket URL    |
//! | `NOTES_ORIGIN`       | no       | `http://localhost:3000` | Base URL when neither is set |
//! | `RUST_LOG`           | no       | `notekeep=info`         | Log filter                   |
//!
//! Timeout, retry, reconnect and debounce tunables are listed on
//! [`NotesConfig::from_env`].

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notekeep_client::ApiClient;
use notekeep_core::config::NotesConfig;
use notekeep_live::LiveUpdates;
use notekeep_store::{ListController, Store, StoreEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notekeep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let origin = std::env::var("NOTES_ORIGIN").ok();
    let config = NotesConfig::from_env(origin.as_deref()).context("Invalid configuration")?;

    tracing::info!(
        api_base = %config.endpoints.api_base,
        ws_url = ?config.endpoints.ws_url,
        timeout_ms = config.retry.timeout.as_millis() as u64,
        max_retries = config.retry.max_retries,
        "Starting notekeep-watch",
    );

    let client = ApiClient::new(&config.endpoints.api_base)
        .context("Failed to build the REST client")?
        .with_policy(config.retry.clone());
    let store = Store::new(Arc::new(client));

    let live = LiveUpdates::from_endpoints(&config.endpoints, config.reconnect.clone());
    if let Some(live) = &live {
        store.attach_live(live.subscribe());
    }

    let mut events = store.events();
    let controller = ListController::with_debounce(store.clone(), config.search_debounce);

    match controller.load().await {
        Ok(page) => tracing::info!(
            total = page.total,
            shown = page.items.len(),
            "Loaded first page of notes",
        ),
        // Already reported as a store event; keep watching for live changes.
        Err(e) => tracing::error!(error = %e, "Initial load failed"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => log_event(&store, &controller, event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Shutdown signal received");
    store.shutdown().await;
    if let Some(live) = live {
        live.shutdown().await;
    }
    Ok(())
}

fn log_event(store: &Store, controller: &ListController, event: StoreEvent) {
    match event {
        StoreEvent::ListChanged { key } => {
            let query = controller.query();
            let cached = store.peek_list(&query).and_then(|c| c.data);
            if query.cache_key() == key {
                if let Some(page) = cached {
                    tracing::info!(
                        total = page.total,
                        shown = page.items.len(),
                        "Notes list updated",
                    );
                    return;
                }
            }
            tracing::debug!(%key, "List entry changed");
        }
        StoreEvent::DetailChanged { id } => tracing::info!(%id, "Note changed"),
        StoreEvent::DetailRemoved { id } => tracing::info!(%id, "Note removed"),
        StoreEvent::SelectionChanged { selected } => {
            tracing::info!(?selected, "Selection changed")
        }
        StoreEvent::Error { operation, error } => tracing::error!(
            ?operation,
            message = %error.message,
            code = ?error.code,
            "Store operation failed",
        ),
    }
}
