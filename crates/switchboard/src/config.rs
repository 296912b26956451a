// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the switchboard router.
#[derive(Debug, Clone, clap::Parser)]
pub struct RouterConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8787, env = "PORT")]
    pub port: u16,

    /// Rate cap for the loop guard: events per trace per minute.
    #[arg(long, default_value_t = 6, env = "LOOP_MAX_PER_MINUTE")]
    pub loop_max_per_minute: usize,

    /// Delay applied to warn-class loop detections, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "LOOP_DELAY_DEFAULT_MS")]
    pub loop_delay_default_ms: u64,

    /// Delay applied when the rate cap trips. Defaults to the warn delay.
    #[arg(long, env = "LOOP_DELAY_BURST_MS")]
    pub loop_delay_burst_ms: Option<u64>,

    /// Upper bound on delivery attempts per recipient per event.
    #[arg(long, default_value_t = 3, env = "DELIVERY_MAX_RETRIES")]
    pub delivery_max_retries: u32,

    /// Base of the 2^(n-1) delivery backoff, in milliseconds.
    #[arg(long, default_value_t = 1000, env = "DELIVERY_BASE_DELAY_MS")]
    pub delivery_base_delay_ms: u64,

    /// Per-attempt callback timeout, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "DELIVERY_TIMEOUT_MS")]
    pub delivery_timeout_ms: u64,

    /// Admin login shared secret. If unset, the admin surface is unguarded.
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Directory for the durable audit streams.
    #[arg(long, default_value = "./switchboard-data", env = "AUDIT_DIR")]
    pub audit_dir: std::path::PathBuf,
}

impl RouterConfig {
    /// Burst delay falls back to the default warn delay when unset.
    pub fn burst_delay_ms(&self) -> u64 {
        self.loop_delay_burst_ms.unwrap_or(self.loop_delay_default_ms)
    }

    pub fn delivery_base_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_base_delay_ms)
    }

    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delivery_timeout_ms)
    }
}
