//! Header mapping shared by requests and responses.
//!
//! Keys are unique and compared case-insensitively. Each value is stored as a
//! list of tokens split on commas and spaces, except for a handful of fields
//! whose values carry meaningful spaces or commas (dates, content types,
//! entity tags, URLs); those are kept verbatim as a single token.

use tracing::debug;

/// Fields whose value is never split into tokens.
const VERBATIM_FIELDS: &[&str] = &[
    "date",
    "if-modified-since",
    "last-modified",
    "etag",
    "content-type",
    "server",
    "user-agent",
    "location",
    "content-location",
];

/// Ordered, case-insensitive header mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

fn is_verbatim(key: &str) -> bool {
    VERBATIM_FIELDS
        .iter()
        .any(|field| field.eq_ignore_ascii_case(key))
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header from its textual wire value.
    ///
    /// The value is split into tokens unless the field is kept verbatim.
    /// Blank keys and values that are empty after trimming are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        let values = if is_verbatim(key.trim()) {
            vec![value.trim().to_string()]
        } else {
            split_tokens(value)
        };
        self.set_values(key, values);
    }

    /// Sets a header from an explicit token list, replacing any previous value.
    ///
    /// Header assembly is advisory: a blank key or a list that is empty once
    /// blank entries are removed is logged and ignored.
    pub fn set_values(&mut self, key: &str, values: Vec<String>) {
        let key = key.trim();
        if key.is_empty() {
            debug!("ignoring header with an empty name");
            return;
        }

        let values: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            debug!(header = key, "ignoring header without a value");
            return;
        }

        match self.position(key) {
            Some(index) => self.entries[index].1 = values,
            None => self.entries.push((key.to_string(), values)),
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))
    }

    /// Returns the token list for `key`.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|i| self.entries[i].1.as_slice())
    }

    /// Returns the first token for `key`; for verbatim fields this is the whole value.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the value for `key` rendered the way it goes on the wire.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values(key).map(|values| values.join(","))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
