//! Symbol normalization.
//!
//! Providers and callers spell the same pair in many ways (`EURUSD`, `eur-usd`,
//! `EUR_USD`, `EUR／USD`, `EUR / USD`). Everything that builds an identity, the
//! policy loader, the cache key builder and every adapter, goes through
//! [`normalize`] so they agree on one form: uppercase parts joined by a single `/`.

/// Canonical separator.
pub const SEPARATOR: char = '/';

fn is_separator(c: char) -> bool {
    matches!(
        c,
        '/' | '-' | '_' | '\\'
            | '\u{2044}' // fraction slash
            | '\u{2215}' // division slash
            | '\u{2571}' // box drawings diagonal
            | '\u{29F8}' // big solidus
            | '\u{FF0F}' // fullwidth solidus
    ) || c.is_whitespace()
}

/// Canonicalize a pair or asset identifier.
///
/// A 6-character undelimited alphanumeric input is split 3/3. Anything else
/// without a separator is returned uppercased as a single-subject identifier.
/// Normalizing an already-normalized string is a no-op.
pub fn normalize(input: &str) -> String {
    let upper = input.to_uppercase();
    let parts: Vec<&str> = upper
        .split(is_separator)
        .filter(|part| !part.is_empty())
        .collect();

    match parts.as_slice() {
        [] => String::new(),
        [single] if single.chars().count() == 6 && single.chars().all(char::is_alphanumeric) => {
            let split = single
                .char_indices()
                .nth(3)
                .map(|(idx, _)| idx)
                .unwrap_or(single.len());
            format!("{}{}{}", &single[..split], SEPARATOR, &single[split..])
        }
        parts => parts.join("/"),
    }
}

/// Split a normalized symbol into its base and optional quote part.
///
/// Only the first separator splits; a single-subject identifier has no quote.
pub fn split_pair(symbol: &str) -> (String, Option<String>) {
    let normalized = normalize(symbol);
    match normalized.split_once(SEPARATOR) {
        Some((base, quote)) => (base.to_string(), Some(quote.to_string())),
        None => (normalized, None),
    }
}
