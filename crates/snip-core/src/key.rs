use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use std::fmt::Display;

/// Number of digest bytes kept before base58 encoding.
const DIGEST_PREFIX_LEN: usize = 16;
const MAX_LENGTH: usize = 32;

/// A short key identifying a stored URL.
///
/// Keys produced by [`ShortKey::derive`] are content-addressed: the same
/// original URL always maps to the same key, which is what lets a backend
/// detect a re-submitted URL as a conflict instead of minting a new key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortKey(SmolStr);

impl ShortKey {
    /// Derives the key for an original URL.
    ///
    /// The key is the base58 encoding of the first 16 bytes of the SHA-256
    /// digest of the URL. It depends on nothing but the URL bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use snip_core::ShortKey;
    ///
    /// let a = ShortKey::derive("https://a.example");
    /// let b = ShortKey::derive("https://a.example");
    /// assert_eq!(a, b);
    /// ```
    pub fn derive(original_url: &str) -> Self {
        let digest = Sha256::digest(original_url.as_bytes());
        let encoded = bs58::encode(&digest[..DIGEST_PREFIX_LEN]).into_string();
        Self(SmolStr::new(encoded))
    }

    /// Parses a client-supplied key.
    ///
    /// Valid keys are 1-32 characters from the base58 alphabet.
    pub fn parse(key: impl AsRef<str>) -> Result<Self, CoreError> {
        let key = key.as_ref();
        Self::validate(key)?;
        Ok(Self(SmolStr::new(key)))
    }

    /// Creates a `ShortKey` without validation.
    ///
    /// Use this only for keys read back from a trusted store.
    pub fn new_unchecked(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key.as_ref()))
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(key: &str) -> Result<(), CoreError> {
        if key.is_empty() || key.len() > MAX_LENGTH {
            return Err(CoreError::InvalidShortKey(format!(
                "length must be between 1 and {}, got {}",
                MAX_LENGTH,
                key.len()
            )));
        }

        if bs58::decode(key).into_vec().is_err() {
            return Err(CoreError::InvalidShortKey(format!(
                "must contain only base58 characters: '{}'",
                key
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ShortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ShortKey").field(&self.0).finish()
    }
}

impl Display for ShortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ShortKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ShortKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = SmolStr::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let first = ShortKey::derive("https://a.example");
        let second = ShortKey::derive("https://a.example");
        assert_eq!(first, second);
    }

    #[test]
    fn derive_separates_distinct_urls() {
        let a = ShortKey::derive("https://a.example");
        let b = ShortKey::derive("https://b.example");
        assert_ne!(a, b);
    }

    #[test]
    fn derived_keys_parse_back() {
        for url in ["", "https://a.example", "http://x.y/z?q=1#frag"] {
            let key = ShortKey::derive(url);
            assert!(key.as_str().len() <= 22);
            assert_eq!(ShortKey::parse(key.as_str()).unwrap(), key);
        }
    }

    #[test]
    fn parse_rejects_empty_and_long() {
        assert!(ShortKey::parse("").is_err());
        assert!(ShortKey::parse("a".repeat(33)).is_err());
    }

    #[test]
    fn parse_rejects_non_base58() {
        // 0, O, I and l are outside the base58 alphabet
        assert!(ShortKey::parse("abc0").is_err());
        assert!(ShortKey::parse("OIl").is_err());
        assert!(ShortKey::parse("abc/def").is_err());
    }

    #[test]
    fn to_url_joins_base() {
        let key = ShortKey::new_unchecked("abc123");
        assert_eq!(key.to_url("http://localhost:8080"), "http://localhost:8080/abc123");
        assert_eq!(key.to_url("http://localhost:8080/"), "http://localhost:8080/abc123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = ShortKey::new_unchecked("abc123");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc123\"");
    }
}
