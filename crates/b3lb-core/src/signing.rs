//! Checksum signing and verification for the backend protocol.
//!
//! Canonical string is `endpoint || urlencode(params, safe='*') || secret`.
//! Inbound requests are verified against whichever of a Secret's two keys
//! matches (supports key rotation); outbound requests to a Node are always
//! signed with the algorithm fixed by the Node's Cluster.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{B3lbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShaAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ShaAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShaAlgorithm::Sha1 => "sha1",
            ShaAlgorithm::Sha256 => "sha256",
            ShaAlgorithm::Sha384 => "sha384",
            ShaAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(ShaAlgorithm::Sha1),
            "sha256" => Some(ShaAlgorithm::Sha256),
            "sha384" => Some(ShaAlgorithm::Sha384),
            "sha512" => Some(ShaAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Dispatch on hex digest length: 40/64/96/128 for sha1/256/384/512.
    pub fn from_digest_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(ShaAlgorithm::Sha1),
            64 => Some(ShaAlgorithm::Sha256),
            96 => Some(ShaAlgorithm::Sha384),
            128 => Some(ShaAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            ShaAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            ShaAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            ShaAlgorithm::Sha384 => {
                let mut hasher = Sha384::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            ShaAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
        }
    }
}

/// Builds the canonical string to hash: `endpoint || query_string || secret`.
/// `query_string` must already be percent-encoded with `*` left unescaped,
/// matching the client's literal `QUERY_STRING` bytes minus `checksum=`.
pub fn canonical_string(endpoint: &str, query_string: &str, secret: &str) -> String {
    format!("{endpoint}{query_string}{secret}")
}

/// Percent-encodes a single query value the way the backend protocol
/// expects: the usual unreserved set, plus `*` left untouched.
pub fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'*' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Encodes a full parameter list (already ordered) into a query string
/// using [`encode_query_value`] for both keys and values.
pub fn encode_query_string(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_query_value(k), encode_query_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Verifies an inbound checksum against either of the secret's two keys.
/// Algorithm is resolved from an explicit `checksumHash` parameter first,
/// then by digest length, else rejected.
pub fn verify_checksum(
    endpoint: &str,
    query_string: &str,
    checksum: &str,
    checksum_hash_param: Option<&str>,
    secret: &str,
    secret2: &str,
) -> Result<()> {
    let algorithm = checksum_hash_param
        .and_then(ShaAlgorithm::from_name)
        .or_else(|| ShaAlgorithm::from_digest_len(checksum.len()))
        .ok_or_else(|| B3lbError::AuthFailure("unrecognized checksum algorithm".into()))?;

    for candidate in [secret, secret2] {
        if candidate.is_empty() {
            continue;
        }
        let expected = algorithm.digest_hex(
            canonical_string(endpoint, query_string, candidate).as_bytes(),
        );
        if constant_time_eq(expected.as_bytes(), checksum.as_bytes()) {
            return Ok(());
        }
    }

    Err(B3lbError::AuthFailure("checksum mismatch".into()))
}

/// Signs an outbound request to a Node using the algorithm fixed by the
/// Node's Cluster.
pub fn sign_outbound(
    endpoint: &str,
    query_string: &str,
    secret: &str,
    algorithm: ShaAlgorithm,
) -> String {
    algorithm.digest_hex(canonical_string(endpoint, query_string, secret).as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_length_dispatch() {
        assert_eq!(ShaAlgorithm::from_digest_len(40), Some(ShaAlgorithm::Sha1));
        assert_eq!(
            ShaAlgorithm::from_digest_len(64),
            Some(ShaAlgorithm::Sha256)
        );
        assert_eq!(
            ShaAlgorithm::from_digest_len(96),
            Some(ShaAlgorithm::Sha384)
        );
        assert_eq!(
            ShaAlgorithm::from_digest_len(128),
            Some(ShaAlgorithm::Sha512)
        );
        assert_eq!(ShaAlgorithm::from_digest_len(12), None);
    }

    #[test]
    fn round_trip_sign_and_verify() {
        let secret = "s3cr3t";
        let checksum = sign_outbound("create", "name=Test", secret, ShaAlgorithm::Sha256);
        assert!(verify_checksum("create", "name=Test", &checksum, None, secret, "").is_ok());
    }

    #[test]
    fn verify_accepts_rotated_secret() {
        let secret2 = "new-secret";
        let checksum = sign_outbound("create", "name=Test", secret2, ShaAlgorithm::Sha1);
        assert!(verify_checksum("create", "name=Test", &checksum, Some("sha1"), "old-secret", secret2).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let checksum = sign_outbound("create", "name=Test", "right", ShaAlgorithm::Sha256);
        assert!(verify_checksum("create", "name=Test", &checksum, None, "wrong", "").is_err());
    }

    #[test]
    fn encode_query_value_preserves_star() {
        assert_eq!(encode_query_value("a*b c"), "a*b%20c");
    }
}
