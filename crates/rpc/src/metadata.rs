//! Call metadata: an ordered multi-map with lowercase keys

/// Inbound key under which the transport stores each request cookie as `name=value`.
pub const INBOUND_COOKIE_KEY: &str = "inbound-cookie";

/// Outbound key under which handlers queue cookies as `name=value`.
pub const SET_COOKIE_KEY: &str = "set-cookie";

/// Key/value side-channel of a call. Keys are case-insensitive and stored
/// lowercased; a key may hold several values, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut md = Self::new();
        for (key, value) in pairs {
            md.append(key.as_ref(), value);
        }
        md
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries.push((key.to_ascii_lowercase(), value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).next()
    }

    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove every value under `key`, returning them in insertion order.
    pub fn remove(&mut self, key: &str) -> Vec<String> {
        let key = key.to_ascii_lowercase();
        let mut removed = Vec::new();
        self.entries.retain(|(k, v)| {
            if *k == key {
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
