use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;

pub struct Config {
    pub listen_addr: SocketAddr,
    /// Provider registry document. The embedded default is used when unset.
    pub providers_file: Option<PathBuf>,
    /// Role policy document. The embedded default is used when unset.
    pub roles_file: Option<PathBuf>,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub adapter_timeout: Duration,
    pub inflight_wait: Duration,
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_millis(key: &str, default: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = std::env::var("QG_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid QG_LISTEN_ADDR")?;
        let cors_allow = std::env::var("QG_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self {
            listen_addr,
            providers_file: env_path("QG_PROVIDERS_FILE"),
            roles_file: env_path("QG_ROLES_FILE"),
            cors_allow,
            request_timeout: env_millis("QG_REQUEST_TIMEOUT_MS", 15_000),
            adapter_timeout: env_millis("QG_ADAPTER_TIMEOUT_MS", 4_000),
            inflight_wait: env_millis("QG_INFLIGHT_WAIT_MS", 1_500),
        })
    }
}
