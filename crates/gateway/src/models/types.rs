use std::sync::Arc;

/// Provider identifier as declared in the registry document (e.g. "frankfurter").
pub type ProviderId = Arc<str>;

/// Logical role name as declared in the role policy document (e.g. "ribbon").
pub type RoleId = Arc<str>;
