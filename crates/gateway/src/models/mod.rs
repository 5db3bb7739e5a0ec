//! Gateway models
//!
//! - `types` - Type aliases for identifiers (ProviderId, RoleId)
//! - `quote` - The normalized quote record produced by adapters
//! - `request` - Per-call parameters (RequestParams, ResolveOptions)
//! - `result` - The public answer shape (ResolutionResult, Mode)

mod quote;
mod request;
mod result;
mod types;

pub use quote::NormalizedQuote;
pub use request::{RequestParams, ResolveOptions};
pub use result::{Mode, ResolutionResult};
pub use types::{ProviderId, RoleId};
