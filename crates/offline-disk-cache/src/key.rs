//! Cache key derivation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a key in hex characters (SHA-256)
pub const KEY_LEN: usize = 64;

/// Opaque identifier for a cached entry, used both as its filename and as
/// its manifest identity.
///
/// Always 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse a previously derived key, rejecting anything that is not a
    /// well-formed digest.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == KEY_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| CacheKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CacheKey::parse(&value).ok_or_else(|| format!("invalid cache key: {:?}", value))
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Derive the cache key for a canonical URL string.
pub fn derive_key(url: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_is_deterministic() {
        let key1 = derive_key("foo://bar");
        let key2 = derive_key("foo://bar");
        let key3 = derive_key("foo://baz");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);

        assert_eq!(key1.as_str().len(), KEY_LEN);
        assert!(key1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_known_digest() {
        // sha256("") is a fixed value; guards against the scheme drifting
        assert_eq!(
            derive_key("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_distinct_urls_have_distinct_keys() {
        let urls: Vec<String> = (0..500)
            .map(|i| format!("https://example.com/assets/{}.js?v={}", i, i % 7))
            .collect();
        let keys: std::collections::HashSet<_> = urls.iter().map(|u| derive_key(u)).collect();
        assert_eq!(keys.len(), urls.len());
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        let key = derive_key("https://example.com/");
        assert_eq!(CacheKey::parse(key.as_str()), Some(key.clone()));

        assert!(CacheKey::parse("manifest.json").is_none());
        assert!(CacheKey::parse(&key.as_str().to_uppercase()).is_none());
        assert!(CacheKey::parse(&key.as_str()[1..]).is_none());
        assert!(CacheKey::parse("../../etc/passwd").is_none());
    }

    #[test]
    fn test_key_serializes_as_plain_string() {
        let key = derive_key("foo://bar");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));

        let parsed: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);

        assert!(serde_json::from_str::<CacheKey>("\"not-a-key\"").is_err());
    }
}
