//! Identities exempt from rate limiting.

use std::collections::HashSet;

/// Exact identities and identity prefixes that bypass rate limiting.
///
/// Matching is plain string comparison: the prefix `"10."` covers
/// `"10.0.0.2"` but not `"110.0.0.2"`.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    identities: HashSet<String>,
    prefixes: Vec<String>,
}

impl AllowList {
    pub fn new<I, P>(identities: I, prefixes: P) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `identity` matches an exact entry or starts with a prefix.
    pub fn permits(&self, identity: &str) -> bool {
        self.identities.contains(identity)
            || self
                .prefixes
                .iter()
                .any(|prefix| identity.starts_with(prefix.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty() && self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let allow = AllowList::new(["1.1.1.1"], Vec::<String>::new());
        assert!(allow.permits("1.1.1.1"));
        assert!(!allow.permits("1.1.1.10"));
        assert!(!allow.permits("1.1.1"));
    }

    #[test]
    fn test_prefix_match() {
        let allow = AllowList::new(Vec::<String>::new(), ["10."]);
        assert!(allow.permits("10.0.0.2"));
        assert!(!allow.permits("110.0.0.2"));
    }

    #[test]
    fn test_empty_list_permits_nothing() {
        let allow = AllowList::default();
        assert!(allow.is_empty());
        assert!(!allow.permits(""));
        assert!(!allow.permits("127.0.0.1"));
    }
}
