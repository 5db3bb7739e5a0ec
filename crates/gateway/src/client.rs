//! Caller-side client for a remote gateway.
//!
//! ```text
//! GatewayClient ──HTTP──▶ gateway ──▶ ResolutionResult
//!       │
//!       └─ gateway unreachable ──▶ direct provider (once) ──▶ mode = direct
//! ```
//!
//! The direct path is best effort. It bypasses the gateway's cache and budget
//! guard, is tried at most once per call, and tags its answer `direct` so a
//! dashboard can tell "gateway degraded" apart from "provider degraded".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{AdapterError, GatewayError};
use crate::models::{Mode, ResolutionResult, ResolveOptions};
use crate::provider::UpstreamMeter;
use crate::registry::{GatewayCatalog, ProviderDescriptor};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_DIRECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Error body sent by the gateway server.
#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: String,
}

struct DirectProvider {
    catalog: GatewayCatalog,
    provider: Arc<ProviderDescriptor>,
    timeout: Duration,
}

pub struct GatewayClient {
    base_url: String,
    http: Client,
    direct: Option<DirectProvider>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Self::build_http(DEFAULT_REQUEST_TIMEOUT),
            direct: None,
        }
    }

    fn build_http(timeout: Duration) -> Client {
        Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    /// Bound on the whole gateway round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = Self::build_http(timeout);
        self
    }

    /// Provider to call directly when the gateway cannot be reached.
    ///
    /// The catalog supplies the role's symbols and the provider's binding.
    pub fn with_direct_provider(
        mut self,
        catalog: &GatewayCatalog,
        provider_id: &str,
    ) -> Result<Self, GatewayError> {
        let provider = catalog.registry.get_provider(provider_id)?;
        self.direct = Some(DirectProvider {
            catalog: catalog.clone(),
            provider,
            timeout: DEFAULT_DIRECT_TIMEOUT,
        });
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve through the gateway, escalating once to the direct provider
    /// when the gateway is unreachable.
    pub async fn resolve(
        &self,
        role: &str,
        options: &ResolveOptions,
    ) -> Result<ResolutionResult, GatewayError> {
        match self.fetch_remote(role, options).await {
            Err(err) if err.is_unreachable() => match &self.direct {
                Some(direct) => {
                    warn!(
                        role,
                        provider = %direct.provider.id,
                        "Gateway unreachable ({}), calling provider directly",
                        err
                    );
                    direct.resolve(role).await
                }
                None => Err(err),
            },
            outcome => outcome,
        }
    }

    async fn fetch_remote(
        &self,
        role: &str,
        options: &ResolveOptions,
    ) -> Result<ResolutionResult, GatewayError> {
        let url = format!(
            "{}/api/v1/roles/{}/resolve",
            self.base_url,
            urlencoding::encode(role)
        );

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(provider) = &options.force_provider_id {
            query.push(("forceProvider", provider.clone()));
        }
        if let Some(bypass) = options.bypass_cache {
            query.push(("bypassCache", bypass.to_string()));
        }

        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    GatewayError::Unreachable(e.to_string())
                } else {
                    GatewayError::Internal(format!("Gateway request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<RemoteError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(GatewayError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<ResolutionResult>().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Unreachable(e.to_string())
            } else {
                GatewayError::Internal(format!("Malformed gateway response: {}", e))
            }
        })
    }
}

impl DirectProvider {
    async fn resolve(&self, role: &str) -> Result<ResolutionResult, GatewayError> {
        let policy = self.catalog.policies.get_role_policy(role)?;
        let params = policy.request_params();
        let provider = &self.provider;

        let meter = UpstreamMeter::unmetered(provider.id.clone());
        let call = provider.adapter().adapt(provider, role, &params, &meter);
        let data = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(quotes)) if quotes.is_empty() => Err(AdapterError::malformed(
                provider.id.as_ref(),
                "no usable quotes in response",
            )),
            Ok(outcome) => outcome,
            Err(_) => Err(AdapterError::timeout(provider.id.as_ref())),
        }?;

        Ok(ResolutionResult {
            role: policy.role.to_string(),
            primary_provider: policy.primary_provider_id.to_string(),
            source_provider: provider.id.to_string(),
            mode: Mode::Direct,
            as_of: Utc::now(),
            data,
        })
    }
}
