//! Salted password digests for stored user records.
//!
//! A [`PasswordDigest`] serializes to a single string of the form
//! `b3$<salt hex>$<digest hex>` so it fits in the `password` field of a user
//! record without changing the document shape.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SCHEME: &str = "b3";
const SALT_LEN: usize = 16;
const CONTEXT: &str = "ghdb 2024-06 password digest v1";

/// Salted BLAKE3 digest of a password.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    salt: [u8; SALT_LEN],
    digest: [u8; 32],
}

impl PasswordDigest {
    /// Derive a digest with a fresh random salt.
    pub fn derive(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::derive_with_salt(password, salt)
    }

    /// Derive a digest with an explicit salt.
    pub fn derive_with_salt(password: &str, salt: [u8; SALT_LEN]) -> Self {
        Self {
            salt,
            digest: compute(password, &salt),
        }
    }

    /// Check a candidate password. Comparison is constant-time.
    pub fn verify(&self, password: &str) -> bool {
        blake3::Hash::from(compute(password, &self.salt)) == blake3::Hash::from(self.digest)
    }

    /// Encoded `b3$salt$digest` form.
    pub fn encode(&self) -> String {
        format!(
            "{SCHEME}${}${}",
            hex::encode(self.salt),
            hex::encode(self.digest)
        )
    }
}

fn compute(password: &str, salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(CONTEXT);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Errors from parsing an encoded digest.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("unsupported digest scheme: {0:?}")]
    UnsupportedScheme(String),

    #[error("malformed digest: {0}")]
    Malformed(String),
}

impl FromStr for PasswordDigest {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('$');
        let scheme = parts.next().unwrap_or_default();
        if scheme != SCHEME {
            return Err(SecretError::UnsupportedScheme(scheme.to_string()));
        }
        let (Some(salt_hex), Some(digest_hex), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SecretError::Malformed("expected three '$'-separated fields".into()));
        };

        let salt: [u8; SALT_LEN] = decode_fixed(salt_hex, "salt")?;
        let digest: [u8; 32] = decode_fixed(digest_hex, "digest")?;
        Ok(Self { salt, digest })
    }
}

fn decode_fixed<const N: usize>(field: &str, what: &str) -> Result<[u8; N], SecretError> {
    let bytes = hex::decode(field).map_err(|e| SecretError::Malformed(format!("{what}: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        SecretError::Malformed(format!("{what}: expected {N} bytes, got {}", b.len()))
    })
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(..)")
    }
}

impl Serialize for PasswordDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for PasswordDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_correct_password() {
        let d = PasswordDigest::derive("hunter22");
        assert!(d.verify("hunter22"));
        assert!(!d.verify("hunter23"));
        assert!(!d.verify(""));
    }

    #[test]
    fn salts_differ_between_derivations() {
        let a = PasswordDigest::derive("same");
        let b = PasswordDigest::derive("same");
        assert_ne!(a.encode(), b.encode());
        assert!(a.verify("same") && b.verify("same"));
    }

    #[test]
    fn fixed_salt_is_deterministic() {
        let a = PasswordDigest::derive_with_salt("pw", [7; SALT_LEN]);
        let b = PasswordDigest::derive_with_salt("pw", [7; SALT_LEN]);
        assert_eq!(a, b);
    }

    #[test]
    fn encode_parse_roundtrip() {
        let d = PasswordDigest::derive("123456");
        let parsed: PasswordDigest = d.encode().parse().unwrap();
        assert_eq!(parsed, d);
        assert!(parsed.verify("123456"));
    }

    #[test]
    fn parse_rejects_plaintext_and_garbage() {
        assert!(matches!(
            "123456".parse::<PasswordDigest>(),
            Err(SecretError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            "b3$zz$00".parse::<PasswordDigest>(),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            "b3$00".parse::<PasswordDigest>(),
            Err(SecretError::Malformed(_))
        ));
    }

    #[test]
    fn serde_as_string() {
        let d = PasswordDigest::derive_with_salt("pw", [1; SALT_LEN]);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.starts_with("\"b3$01010101"));
        let back: PasswordDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn debug_hides_material() {
        let d = PasswordDigest::derive("secret");
        assert_eq!(format!("{d:?}"), "PasswordDigest(..)");
    }
}
