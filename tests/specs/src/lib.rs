// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `switchboard` binary as a subprocess and exercises it
//! over HTTP.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `switchboard` binary.
pub fn switchboard_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("switchboard")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `switchboard` process that is killed on drop.
pub struct RouterProcess {
    child: Child,
    port: u16,
    _audit_dir: tempfile::TempDir,
}

impl RouterProcess {
    /// Spawn the router on a free port with an isolated audit dir.
    ///
    /// `env` entries are applied on top of the defaults, so tests can
    /// exercise the env-var configuration surface.
    pub fn start(env: &[(&str, &str)]) -> anyhow::Result<Self> {
        ensure_crypto();
        let binary = switchboard_binary();
        anyhow::ensure!(binary.exists(), "switchboard binary not found at {}", binary.display());

        let port = free_port()?;
        let audit_dir = tempfile::tempdir()?;

        let mut cmd = Command::new(&binary);
        cmd.args([
            "--host",
            "127.0.0.1",
            "--port",
            &port.to_string(),
            "--audit-dir",
            &audit_dir.path().to_string_lossy(),
        ]);
        cmd.env("RUST_LOG", "warn");
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let child = cmd.spawn()?;
        Ok(Self { child, port, _audit_dir: audit_dir })
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll `/health` until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("switchboard did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for RouterProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
