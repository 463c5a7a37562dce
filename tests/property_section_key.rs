use confab::{SectionKey, ANONYMOUS_KEY};
use proptest::prelude::*;

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

proptest! {
    /// Whatever the input, derivation lands on a valid identifier.
    #[test]
    fn derived_keys_always_satisfy_the_identifier_invariant(name in ".*") {
        let key = SectionKey::derive(&name);
        prop_assert!(is_valid_key(key.as_str()), "invalid key {:?} from {:?}", key, name);
        prop_assert!(!key.as_str().starts_with('_'));
        prop_assert!(!key.as_str().ends_with('_'));
    }

    /// Deriving twice yields the same key.
    #[test]
    fn derivation_is_idempotent(name in ".*") {
        let once = SectionKey::derive(&name);
        let twice = SectionKey::derive(once.as_str());
        prop_assert_eq!(once, twice);
    }

    /// An already-valid lower-case identifier derives to itself.
    #[test]
    fn valid_lowercase_identifiers_are_fixed_points(name in "[a-z0-9]([a-z0-9_]*[a-z0-9])?") {
        let key = SectionKey::derive(&name);
        prop_assert_eq!(key.as_str(), name.as_str());
    }

    /// Explicit keys are accepted exactly when they satisfy the invariant.
    #[test]
    fn explicit_key_validation_matches_the_invariant(raw in ".{0,12}") {
        let accepted = SectionKey::new(&raw).is_ok();
        prop_assert_eq!(accepted, is_valid_key(&raw));
    }
}

#[test]
fn anonymous_fallback_is_itself_a_valid_key() {
    assert!(is_valid_key(ANONYMOUS_KEY));
    assert_eq!(SectionKey::derive(ANONYMOUS_KEY).as_str(), ANONYMOUS_KEY);
}
