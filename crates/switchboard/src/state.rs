// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditSink;
use crate::config::RouterConfig;
use crate::delivery::DeliveryEngine;
use crate::guard::LoopGuard;
use crate::registry::Registry;
use crate::store::SessionStore;

/// Admin session tokens live this long.
const ADMIN_SESSION_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Shared router state.
pub struct RouterState {
    pub config: RouterConfig,
    pub store: SessionStore,
    pub registry: Registry,
    pub guard: LoopGuard,
    pub audit: Arc<AuditSink>,
    pub delivery: Arc<DeliveryEngine>,
    pub shutdown: CancellationToken,
    /// Active admin session tokens -> expiry (epoch ms).
    admin_sessions: RwLock<HashMap<String, u64>>,
}

impl RouterState {
    pub fn new(config: RouterConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let audit = Arc::new(AuditSink::open(&config.audit_dir)?);
        let delivery = Arc::new(DeliveryEngine::new(
            config.delivery_max_retries,
            config.delivery_base_delay(),
            config.delivery_timeout(),
            Arc::clone(&audit),
        ));
        let guard = LoopGuard::new(
            config.loop_max_per_minute,
            config.loop_delay_default_ms,
            config.burst_delay_ms(),
        );
        Ok(Self {
            config,
            store: SessionStore::new(),
            registry: Registry::new(),
            guard,
            audit,
            delivery,
            shutdown,
            admin_sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Issue a fresh admin session token.
    pub async fn create_admin_session(&self) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.admin_sessions.write().await;
        let now = epoch_ms();
        sessions.retain(|_, expires| *expires > now);
        sessions.insert(token.clone(), now + ADMIN_SESSION_TTL_MS);
        token
    }

    /// True iff the token names a live admin session.
    pub async fn admin_session_valid(&self, token: &str) -> bool {
        let sessions = self.admin_sessions.read().await;
        sessions.get(token).is_some_and(|expires| *expires > epoch_ms())
    }

    /// Drop an admin session token.
    pub async fn revoke_admin_session(&self, token: &str) {
        self.admin_sessions.write().await.remove(token);
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
