//! Section key derivation.
//!
//! Components are matched to document sections by a normalized key. Keys are
//! derived from whatever identity a component offers (an instance-level name,
//! a type name) without requiring explicit registration of the name itself.
//! Distinct components may deliberately derive the same key; the document
//! does not enforce uniqueness and the last dispatch wins.

use std::fmt;

use crate::error::{ConfigError, ConfigResult};

/// Fallback key for components whose name normalizes to nothing.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// A normalized section identifier.
///
/// Invariant: non-empty, ASCII word characters (`[A-Za-z0-9_]`) only.
/// Constructed either verbatim from an explicit override ([`SectionKey::new`],
/// validated) or by normalization ([`SectionKey::derive`], infallible).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionKey(String);

impl SectionKey {
    /// Accept an explicit key verbatim. No normalization is applied; the key
    /// must already satisfy the identifier invariant.
    pub fn new(raw: &str) -> ConfigResult<Self> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(ConfigError::InvalidKey(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Derive a key from a display or type name.
    ///
    /// Generic parameters are discarded, any `::`-separated namespace path is
    /// stripped down to its final component, the remainder is lower-cased
    /// with runs of non-word characters collapsed to a single underscore,
    /// and leading/trailing underscores are trimmed. A name that normalizes
    /// to the empty string degrades to [`ANONYMOUS_KEY`] rather than erroring.
    pub fn derive(name: &str) -> Self {
        let base = name.split('<').next().unwrap_or(name);
        let tail = base.rsplit("::").next().unwrap_or(base);

        let mut key = String::with_capacity(tail.len());
        for ch in tail.chars() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                key.push(ch.to_ascii_lowercase());
            } else if !key.is_empty() && !key.ends_with('_') {
                key.push('_');
            }
        }
        let trimmed = key.trim_matches('_');
        if trimmed.is_empty() {
            Self(ANONYMOUS_KEY.to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The key as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SectionKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SectionKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_strips_namespace() {
        assert_eq!(SectionKey::derive("Acme::User"), "user");
        assert_eq!(SectionKey::derive("a::b::deeply::Nested"), "nested");
    }

    #[test]
    fn test_derive_plain_type_name() {
        assert_eq!(SectionKey::derive("MyClass"), "myclass");
    }

    #[test]
    fn test_derive_collapses_non_word_runs() {
        assert_eq!(SectionKey::derive("J. Random Hacker"), "j_random_hacker");
        assert_eq!(SectionKey::derive("  spaced  out  "), "spaced_out");
    }

    #[test]
    fn test_derive_strips_generic_parameters() {
        assert_eq!(SectionKey::derive("alloc::vec::Vec<alloc::string::String>"), "vec");
    }

    #[test]
    fn test_derive_trims_boundary_underscores() {
        assert_eq!(SectionKey::derive("_private"), "private");
        assert_eq!(SectionKey::derive("-wrapped-"), "wrapped");
        assert_eq!(SectionKey::derive("double__inner"), "double__inner");
    }

    #[test]
    fn test_derive_anonymous_fallback() {
        assert_eq!(SectionKey::derive(""), ANONYMOUS_KEY);
        assert_eq!(SectionKey::derive("!!!"), ANONYMOUS_KEY);
        assert_eq!(SectionKey::derive("::"), ANONYMOUS_KEY);
        assert_eq!(SectionKey::derive("___"), ANONYMOUS_KEY);
    }

    #[test]
    fn test_derive_is_idempotent() {
        for name in ["Acme::User", "MyClass", "J. Random Hacker", "", "branding"] {
            let once = SectionKey::derive(name);
            let twice = SectionKey::derive(once.as_str());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_new_accepts_valid_identifiers() {
        assert_eq!(SectionKey::new("db_1").unwrap(), "db_1");
        assert_eq!(SectionKey::new("LDAP").unwrap(), "LDAP");
    }

    #[test]
    fn test_new_rejects_invalid_identifiers() {
        assert!(matches!(SectionKey::new(""), Err(ConfigError::InvalidKey(_))));
        assert!(matches!(SectionKey::new("bad key!"), Err(ConfigError::InvalidKey(_))));
        assert!(matches!(SectionKey::new("a::b"), Err(ConfigError::InvalidKey(_))));
    }
}
