//! Adapter dispatch.
//!
//! This module contains:
//! - The [`QuoteAdapter`] trait every upstream integration implements
//! - [`AdapterSet`], the name → adapter table the registry binds providers to
//! - The built-in adapters (Frankfurter, Twelve Data, Alpha Vantage, demo)
//!
//! Adapters are independent implementations of one interface. The provider
//! registry document picks which adapter a provider id uses, so two providers
//! may share an adapter with different endpoints or credentials.

mod http;
mod meter;
mod traits;

pub mod alpha_vantage;
pub mod demo;
pub mod frankfurter;
pub mod twelve_data;

use std::collections::HashMap;
use std::sync::Arc;

pub use alpha_vantage::AlphaVantageAdapter;
pub use demo::DemoAdapter;
pub use frankfurter::FrankfurterAdapter;
pub use meter::UpstreamMeter;
pub use traits::QuoteAdapter;
pub use twelve_data::TwelveDataAdapter;

/// Table of adapters available for binding, keyed by [`QuoteAdapter::name`].
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<&'static str, Arc<dyn QuoteAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter shipped with the crate.
    pub fn builtin() -> Self {
        Self::new()
            .with(Arc::new(FrankfurterAdapter::new()))
            .with(Arc::new(TwelveDataAdapter::new()))
            .with(Arc::new(AlphaVantageAdapter::new()))
            .with(Arc::new(DemoAdapter::new()))
    }

    /// Register an adapter, replacing any adapter with the same name.
    pub fn with(mut self, adapter: Arc<dyn QuoteAdapter>) -> Self {
        self.adapters.insert(adapter.name(), adapter);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn QuoteAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.adapters.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("adapters", &self.names())
            .finish()
    }
}
