//! Identity claims.
//!
//! Claims arrive from the identity provider as an arbitrary JSON object. They
//! are kept as a map of `serde_json::Value` (string, number, boolean, null,
//! nested object, array) with typed accessors for the claims the engine
//! itself relies on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims stripped from the ID token before the session is persisted.
pub const DEFAULT_IDENTITY_CLAIM_FILTER: &[&str] = &[
    "aud", "iss", "iat", "exp", "nbf", "nonce", "azp", "auth_time", "s_hash", "at_hash", "c_hash",
];

/// A set of identity claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Empty claim set.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Claim value as a string, if it is one.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Claim value as an integer, if it is one.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Insert or replace a claim, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Remove a claim.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Whether the claim is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// The `org_id` claim.
    pub fn organization_id(&self) -> Option<&str> {
        self.get_str("org_id")
    }

    /// The `email` claim.
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// The `name` claim.
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// Drop every claim named in `filter`.
    pub fn without<S: AsRef<str>>(mut self, filter: &[S]) -> Self {
        for name in filter {
            self.0.remove(name.as_ref());
        }
        self
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no claims.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
