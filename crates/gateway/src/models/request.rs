use serde::{Deserialize, Serialize};

use crate::symbol::normalize;

/// Parameters handed to an adapter for one call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams {
    /// Canonical symbols to resolve, in the role's display order.
    pub symbols: Vec<String>,
}

impl RequestParams {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: symbols
                .into_iter()
                .map(|s| normalize(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Caller options for a single `resolve` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Collapse the chain to this one provider.
    #[serde(default, alias = "forceProvider")]
    pub force_provider_id: Option<String>,

    /// Skip the cache read. Defaults to `true` when a provider is forced.
    #[serde(default)]
    pub bypass_cache: Option<bool>,
}

impl ResolveOptions {
    pub fn forced(provider_id: impl Into<String>) -> Self {
        Self {
            force_provider_id: Some(provider_id.into()),
            bypass_cache: None,
        }
    }

    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = Some(bypass);
        self
    }

    /// Effective bypass flag after applying the forced-provider default.
    pub fn bypasses_cache(&self) -> bool {
        self.bypass_cache
            .unwrap_or(self.force_provider_id.is_some())
    }
}
