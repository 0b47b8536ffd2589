//! Multi-segment keys with a byte encoding that preserves their order.
//!
//! A [`Key`] is an ordered list of string segments. Keys compare segment by
//! segment using ordinal string comparison, and a key that is a strict
//! prefix of another sorts before it. [`Key::encode`] maps keys to bytes such
//! that plain byte comparison (SQLite `BLOB` ordering) gives the same order.
//!
//! Each segment is written as its UTF-8 bytes with `00` escaped as `00 FF`,
//! followed by the terminator `00 01`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// An ordered, multi-segment key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<String>);

impl Key {
    /// Build a key from segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The empty key (the root of every prefix).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new key with `other`'s segments appended.
    pub fn join(&self, other: &Key) -> Key {
        let mut segments = Vec::with_capacity(self.0.len() + other.0.len());
        segments.extend_from_slice(&self.0);
        segments.extend_from_slice(&other.0);
        Key(segments)
    }

    /// Return a new key with one segment appended.
    pub fn child(&self, segment: impl Into<String>) -> Key {
        let mut key = self.clone();
        key.0.push(segment.into());
        key
    }

    /// Whether `prefix` is a (not necessarily strict) segment prefix of `self`.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Strip `prefix` from the front, returning the remaining segments.
    pub fn strip_prefix(&self, prefix: &Key) -> Option<Key> {
        self.0.strip_prefix(prefix.0.as_slice()).map(|rest| Key(rest.to_vec()))
    }

    /// Encode into an order-preserving byte string.
    pub fn encode(&self) -> Vec<u8> {
        let capacity = self.0.iter().map(|s| s.len() + 2).sum();
        let mut out = Vec::with_capacity(capacity);
        for segment in &self.0 {
            for &byte in segment.as_bytes() {
                if byte == ESCAPE {
                    out.extend_from_slice(&[ESCAPE, ESCAPED_NUL]);
                } else {
                    out.push(byte);
                }
            }
            out.extend_from_slice(&[ESCAPE, TERMINATOR]);
        }
        out
    }

    /// Decode bytes produced by [`Key::encode`].
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        let mut iter = bytes.iter().copied();

        while let Some(byte) = iter.next() {
            if byte != ESCAPE {
                current.push(byte);
                continue;
            }
            match iter.next() {
                Some(ESCAPED_NUL) => current.push(ESCAPE),
                Some(TERMINATOR) => {
                    let segment = String::from_utf8(std::mem::take(&mut current))
                        .map_err(|e| StoreError::InvalidKey(format!("segment is not utf-8: {e}")))?;
                    segments.push(segment);
                }
                Some(other) => {
                    return Err(StoreError::InvalidKey(format!(
                        "unexpected escape sequence 00 {other:02x}"
                    )));
                }
                None => return Err(StoreError::InvalidKey("dangling escape byte".into())),
            }
        }

        if !current.is_empty() {
            return Err(StoreError::InvalidKey("unterminated segment".into()));
        }
        Ok(Key(segments))
    }

    /// Exclusive byte bounds covering every key strictly under `self`.
    ///
    /// The lower bound is the encoded prefix itself (which is excluded), the
    /// upper bound appends `FF`, a byte no encoded segment starts with.
    pub fn prefix_range(&self) -> (Vec<u8>, Vec<u8>) {
        let lower = self.encode();
        let mut upper = lower.clone();
        upper.push(0xFF);
        (lower, upper)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl<S: Into<String>> FromIterator<S> for Key {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl From<Vec<String>> for Key {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for Key {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key(segments: &[&str]) -> Key {
        Key::from(segments)
    }

    #[test]
    fn shorter_prefix_sorts_first() {
        assert!(key(&["a"]) < key(&["a", "b"]));
        assert!(key(&["a"]).encode() < key(&["a", "b"]).encode());
    }

    #[test]
    fn segments_compare_before_length() {
        // "a" < "ab" as segments, even though ["a", "z"] is longer.
        assert!(key(&["a", "z"]) < key(&["ab"]));
        assert!(key(&["a", "z"]).encode() < key(&["ab"]).encode());
    }

    #[test]
    fn encoding_order_matches_key_order() {
        let mut keys = vec![
            key(&["feed", "2"]),
            key(&["feed", "my", "sub", "1"]),
            key(&["feed", "1"]),
            key(&["feed", ""]),
            key(&["feed", "a\0b"]),
            key(&["feed", "a"]),
            key(&["feed"]),
            key(&["feed", "é"]),
            key(&["feed", "z"]),
        ];
        let mut by_bytes = keys.clone();

        keys.sort();
        by_bytes.sort_by_key(Key::encode);

        assert_eq!(keys, by_bytes);
    }

    #[test]
    fn decode_inverts_encode() {
        let original = key(&["my", "", "nul\0inside", "ünïcødé"]);
        assert_eq!(Key::decode(&original.encode()).unwrap(), original);
        assert_eq!(Key::decode(&[]).unwrap(), Key::root());
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(matches!(
            Key::decode(b"abc"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            Key::decode(&[b'a', 0x00]),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            Key::decode(&[b'a', 0x00, 0x02]),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            Key::decode(&[0xC3, 0x00, 0x01]),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn prefix_range_covers_children_only() {
        let prefix = key(&["my", "feed"]);
        let (lower, upper) = prefix.prefix_range();

        let inside = [key(&["my", "feed", "1"]), key(&["my", "feed", "", "x"])];
        for k in &inside {
            let bytes = k.encode();
            assert!(bytes > lower && bytes < upper, "{k} should be in range");
        }

        let outside = [
            key(&["my", "feed"]),
            key(&["my", "feed2", "1"]),
            key(&["my", "fee"]),
            key(&["my2", "feed", "1"]),
        ];
        for k in &outside {
            let bytes = k.encode();
            assert!(!(bytes > lower && bytes < upper), "{k} should be out of range");
        }
    }

    #[test]
    fn join_and_strip_prefix() {
        let prefix = key(&["my", "feed"]);
        let full = prefix.join(&key(&["sub"])).child("1");

        assert_eq!(full, key(&["my", "feed", "sub", "1"]));
        assert!(full.starts_with(&prefix));
        assert_eq!(full.strip_prefix(&prefix), Some(key(&["sub", "1"])));
        assert_eq!(full.strip_prefix(&key(&["other"])), None);
        assert_eq!(full.to_string(), "my/feed/sub/1");
    }
}
