//! Metadata containers carried across the HTTP/RPC boundary

use crate::error::{MetadataError, MetadataResult};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Ordered (key, value) pairs sent with an outbound RPC call.
///
/// Keys may repeat and insertion order is kept, since it mirrors the order
/// headers arrived in. Keys are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataPairs {
    pairs: Vec<(String, String)>,
}

impl MetadataPairs {
    /// Create an empty pair set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty pair set with room for `capacity` pairs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(capacity),
        }
    }

    /// Append a pair. Returns false (and stores nothing) for an empty key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if key.is_empty() {
            trace!("dropping metadata pair with empty key");
            return false;
        }
        self.pairs.push((key, value.into()));
        true
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value for `key`. RPC metadata keys are case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in insertion order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Encode the pairs as RPC wire metadata.
    ///
    /// Keys are lower-cased; repeated keys become repeated header entries.
    pub fn to_header_map(&self) -> MetadataResult<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(self.pairs.len());
        for (key, value) in &self.pairs {
            let name = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes())
                .map_err(|_| MetadataError::InvalidKey(key.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| MetadataError::InvalidValue { key: key.clone() })?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

impl<K, V> FromIterator<(K, V)> for MetadataPairs
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut pairs = MetadataPairs::new();
        for (key, value) in iter {
            pairs.push(key, value);
        }
        pairs
    }
}

impl IntoIterator for MetadataPairs {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

/// Metadata grouped by key, as returned by an RPC server.
///
/// Keys are stored lower-cased and iterate in sorted order; values for a key
/// keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from received headers. Non-UTF-8 values are decoded lossily.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), header_text(value)))
            .collect()
    }

    /// Add a value under `key`. Returns false for an empty key.
    pub fn append(&mut self, key: &str, value: impl Into<String>) -> bool {
        if key.is_empty() {
            return false;
        }
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        true
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// All values for `key`
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for MetadataMap
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = MetadataMap::new();
        for (key, value) in iter {
            map.append(key.as_ref(), value);
        }
        map
    }
}

impl From<&MetadataPairs> for MetadataMap {
    fn from(pairs: &MetadataPairs) -> Self {
        pairs.iter().collect()
    }
}

/// Copy a header value as an opaque string
pub(crate) fn header_text(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}
