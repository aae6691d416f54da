use serde::{Deserialize, Serialize};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::TokenStoreError;

/// Delimiter used for the flattened storage form (RFC 6749 section 3.3).
pub const SCOPE_DELIMITER: char = ' ';

/// A set of OAuth scope names.
///
/// Equality is set equality; the flattened form is always sorted, so two sets
/// with the same members serialize identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the flattened form.
    ///
    /// Any run of whitespace separates names, so leading, trailing or doubled
    /// delimiters are dropped instead of producing empty names.
    pub fn parse(raw: &str) -> Result<Self, TokenStoreError> {
        let mut set = Self::new();
        for name in raw.split_whitespace() {
            set.insert(name)?;
        }
        Ok(set)
    }

    /// Add a scope name. Returns `false` when it was already present.
    pub fn insert(&mut self, scope: impl Into<String>) -> Result<bool, TokenStoreError> {
        let scope = scope.into();
        validate_scope_token(&scope)?;
        Ok(self.0.insert(scope))
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet(self.0.union(&other.0).cloned().collect())
    }

    /// Scopes present in both sets, e.g. requested scopes narrowed to what a client may use.
    pub fn intersection(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet(self.0.intersection(&other.0).cloned().collect())
    }

    /// True when every scope in `self` is also granted by `available`.
    pub fn is_subset(&self, available: &ScopeSet) -> bool {
        self.0.is_subset(&available.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.0.iter()
    }

    /// Flattened storage form: names joined by a single space, sorted.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(SCOPE_DELIMITER);
            }
            out.push_str(name);
        }
        out
    }
}

/// RFC 6749 `scope-token`: 1*( %x21 / %x23-5B / %x5D-7E )
fn validate_scope_token(scope: &str) -> Result<(), TokenStoreError> {
    if scope.is_empty() {
        return Err(TokenStoreError::InvalidScope(
            "scope name must not be empty".to_string(),
        ));
    }

    let valid = scope
        .bytes()
        .all(|b| b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b));
    if !valid {
        return Err(TokenStoreError::InvalidScope(format!(
            "invalid character in scope name {scope:?}"
        )));
    }

    Ok(())
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for ScopeSet {
    type Err = TokenStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ScopeSet {
    type Error = TokenStoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScopeSet> for String {
    fn from(value: ScopeSet) -> Self {
        value.serialize()
    }
}

impl<'a> IntoIterator for &'a ScopeSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<S: Into<String>> TryFrom<Vec<S>> for ScopeSet {
    type Error = TokenStoreError;

    fn try_from(names: Vec<S>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for name in names {
            set.insert(name)?;
        }
        Ok(set)
    }
}
