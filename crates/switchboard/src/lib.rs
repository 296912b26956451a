// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switchboard: a context router for multi-agent workflows.
//!
//! Agents publish normalized events; the router authorizes them against
//! per-session grants, suppresses duplicates, classifies runaway loops,
//! appends accepted events to durable per-session logs, and fans each
//! one out to every other approved agent via signed HTTP callbacks with
//! retry.

pub mod audit;
pub mod config;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod guard;
pub mod ingest;
pub mod registry;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;
use std::sync::Once;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::RouterConfig;
use crate::state::RouterState;
use crate::transport::build_router;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the router until shutdown.
pub async fn run(config: RouterConfig) -> anyhow::Result<()> {
    ensure_crypto();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state = Arc::new(RouterState::new(config, shutdown.clone())?);

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    tracing::info!("switchboard listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
