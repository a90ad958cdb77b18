use crate::error::{ProxyError, Result};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::fmt;

const SHA256_PREFIX: &str = "sha256:";
const SHA256_HEX_LEN: usize = 64;

/// Content address of a blob or manifest, canonical form `sha256:<hex>`.
///
/// Parsing validates the shape so handlers can map a failure straight to
/// `NAME_INVALID`. Serializes as the plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Digest(String);

impl Digest {
    /// Parse a digest reference, e.g. `sha256:74af7…`.
    pub fn parse(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix(SHA256_PREFIX)
            .ok_or_else(|| ProxyError::Digest(s.to_string()))?;
        if hex.len() != SHA256_HEX_LEN
            || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(ProxyError::Digest(s.to_string()));
        }
        Ok(Digest(s.to_string()))
    }

    /// Compute the digest of a byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        Digest(format!("sha256:{:x}", Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex portion without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0[SHA256_PREFIX.len()..]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
