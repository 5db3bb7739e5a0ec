//! Adapter trait definition.

use async_trait::async_trait;

use crate::errors::AdapterError;
use super::UpstreamMeter;
use crate::models::{NormalizedQuote, RequestParams};
use crate::registry::ProviderDescriptor;

/// One upstream integration.
///
/// Each adapter builds its provider's request, handles that provider's
/// authentication and maps a successful response into [`NormalizedQuote`]s.
/// The resolution engine depends only on this trait.
///
/// Rules every implementation follows:
/// - Items that cannot be valued are omitted, never filled with a placeholder.
/// - Failures are returned as a classified [`AdapterError`].
/// - No internal retries; the engine decides what happens next.
/// - Every outbound request is preceded by [`UpstreamMeter::acquire`]. A
///   refusal ends the invocation with whatever was already collected.
///
/// # Example
///
/// ```ignore
/// struct StaticAdapter;
///
/// #[async_trait]
/// impl QuoteAdapter for StaticAdapter {
///     fn name(&self) -> &'static str {
///         "static"
///     }
///
///     async fn adapt(
///         &self,
///         provider: &ProviderDescriptor,
///         _role: &str,
///         params: &RequestParams,
///         _meter: &UpstreamMeter,
///     ) -> Result<Vec<NormalizedQuote>, AdapterError> {
///         Ok(params
///             .symbols
///             .iter()
///             .map(|s| NormalizedQuote::new(s, Decimal::ONE, Utc::now(), provider.id.as_ref()))
///             .collect())
///     }
/// }
/// ```
#[async_trait]
pub trait QuoteAdapter: Send + Sync {
    /// Binding name referenced by `adapter` in the provider registry document.
    fn name(&self) -> &'static str;

    /// Synthetic adapters need no network, cannot fail and are never metered
    /// by the budget guard. Only a synthetic provider may act as safety net.
    fn is_synthetic(&self) -> bool {
        false
    }

    /// Whether providers bound to this adapter must declare a credential.
    /// Checked when the catalog is loaded.
    fn requires_credential(&self) -> bool {
        false
    }

    /// Fetch quotes for `params.symbols` on behalf of `role`.
    async fn adapt(
        &self,
        provider: &ProviderDescriptor,
        role: &str,
        params: &RequestParams,
        meter: &UpstreamMeter,
    ) -> Result<Vec<NormalizedQuote>, AdapterError>;
}
