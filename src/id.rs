//! Canonical identifiers for experiments and metrics.
//!
//! Human names become symbolic ids by lowercasing and replacing every
//! character outside `[A-Za-z0-9_]` with `_`. The transformation is
//! length-preserving (one char in, one char out) and idempotent.

/// Derive the canonical identifier for a human-readable name.
///
/// ```rust
/// use trueno_ab::id::normalize;
///
/// assert_eq!(normalize("Checkout Button!"), "checkout_button_");
/// assert_eq!(normalize("signups"), "signups");
/// ```
#[must_use]
pub fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether `name` is already in canonical form.
#[must_use]
pub fn is_canonical(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
