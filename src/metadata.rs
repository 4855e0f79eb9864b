//! Ordered RPC metadata.
//!
//! A [`Metadata`] array preserves insertion order and permits duplicate keys;
//! consumers must not assume key uniqueness. Keys are lowercased on insertion
//! (HTTP/2 forbids uppercase header names). Values are byte strings: keys with
//! a `-bin` suffix carry arbitrary bytes and are base64-coded on the wire.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl MetadataEntry {
    /// True when the key names a binary-valued entry (`-bin` suffix).
    pub fn is_binary(&self) -> bool {
        self.key.ends_with("-bin")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Metadata {
        Metadata::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry. The key is lowercased; the value is copied.
    pub fn add(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.push(MetadataEntry {
            key: key.to_ascii_lowercase(),
            value: value.into(),
        });
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_slice())
    }

    /// First value for `key` as UTF-8, if any.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// All values recorded for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.key == key)
            .map(|e| e.value.as_slice())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }

    /// Wire representation of an entry's value: base64 for `-bin` keys,
    /// verbatim otherwise.
    pub(crate) fn wire_value(entry: &MetadataEntry) -> Vec<u8> {
        if entry.is_binary() {
            BASE64.encode(&entry.value).into_bytes()
        } else {
            entry.value.clone()
        }
    }

    /// Insert an entry decoded from the wire, reversing the `-bin` base64
    /// coding. A malformed base64 value is kept verbatim rather than dropped;
    /// the consumer sees exactly what the peer sent.
    pub(crate) fn add_from_wire(&mut self, key: &str, wire_value: &[u8]) {
        let key = key.to_ascii_lowercase();
        let value = if key.ends_with("-bin") {
            BASE64.decode(wire_value).unwrap_or_else(|_| wire_value.to_vec())
        } else {
            wire_value.to_vec()
        };
        self.entries.push(MetadataEntry { key, value });
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, Vec<u8>)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Metadata {
        let mut md = Metadata::new();
        for (key, value) in iter {
            md.add(&key, value);
        }
        md
    }
}
