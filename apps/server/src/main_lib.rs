use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use quotegate_gateway::registry::{DEFAULT_PROVIDERS_DOC, DEFAULT_ROLES_DOC};
use quotegate_gateway::{
    AdapterSet, EngineSettings, GatewayCatalog, GatewayStore, ResolutionEngine,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub engine: ResolutionEngine,
}

impl AppState {
    pub fn new(engine: ResolutionEngine) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("QG_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

fn read_or_default(path: Option<&Path>, default: &str) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display())),
        None => Ok(default.to_string()),
    }
}

/// Load the configured documents, falling back to the embedded ones.
pub fn load_catalog(config: &Config, adapters: &AdapterSet) -> anyhow::Result<GatewayCatalog> {
    let providers = read_or_default(config.providers_file.as_deref(), DEFAULT_PROVIDERS_DOC)?;
    let roles = read_or_default(config.roles_file.as_deref(), DEFAULT_ROLES_DOC)?;
    let catalog = GatewayCatalog::load(&providers, &roles, adapters)?;
    Ok(catalog)
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let catalog = load_catalog(config, &AdapterSet::builtin())?;
    let store = GatewayStore::for_registry(&catalog.registry);
    let settings = EngineSettings {
        adapter_timeout: config.adapter_timeout,
        inflight_wait: config.inflight_wait,
    };

    tracing::info!(
        "Gateway ready: {} roles, adapter timeout {:?}, in-flight wait {:?}",
        catalog.policies.len(),
        settings.adapter_timeout,
        settings.inflight_wait
    );

    Ok(AppState::new(ResolutionEngine::new(&catalog, store, settings)))
}
