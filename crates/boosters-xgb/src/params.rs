//! Booster parameters.
//!
//! Parameters are forwarded to the native side eagerly, one call per entry, in
//! insertion order. Nothing is cached locally; a key written twice is sent
//! twice and the native side keeps the last value.
//!
//! # Example
//!
//! ```
//! use boosters_xgb::{BoosterConfig, Params};
//!
//! let params = Params::new()
//!     .set("objective", "binary:logistic")
//!     .set("max_depth", 4)
//!     .set("eta", 0.3);
//!
//! let config = BoosterConfig::builder().params(params).build();
//! assert_eq!(config.seed, 0);
//! ```

use std::fmt::Display;

use bon::Builder;

/// Ordered key/value parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, stringifying the value with [`Display`].
    pub fn set(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Display) {
        self.entries.push((key.into(), value.to_string()));
    }

    /// Value of the last entry for `key`, which is the one the native side keeps.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

impl<K: Into<String>, V: Display> Extend<(K, V)> for Params {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.push(k, v);
        }
    }
}

// =============================================================================
// BoosterConfig
// =============================================================================

/// Construction-time configuration of a booster.
///
/// The default `seed` is applied first and `params` afterwards, so a `seed`
/// entry in `params` overrides it.
#[derive(Debug, Clone, Builder)]
#[builder(derive(Clone, Debug))]
pub struct BoosterConfig {
    /// Parameters applied after the default seed.
    #[builder(default)]
    pub params: Params,

    /// Seed set before any caller parameter. Default: 0.
    #[builder(default = 0)]
    pub seed: u64,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BoosterConfig {
    /// Every parameter in the order it is sent to the native side.
    pub fn applied(&self) -> Params {
        let mut all = Params::new().set("seed", self.seed);
        all.extend(self.params.iter());
        all
    }
}
