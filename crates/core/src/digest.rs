//! Content-addressed blob digests

use anyhow::{bail, Result};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::Read;

/// Stable message prefix for malformed digest errors
pub const INVALID_DIGEST_FORMAT: &str = "invalid digest format";

/// A `sha256:<64 hex>` blob identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CompactString", into = "CompactString")]
pub struct Digest(CompactString);

impl Digest {
    /// The digest algorithm prefix
    pub const PREFIX: &'static str = "sha256:";

    /// Parse and validate a `sha256:<hex>` string
    pub fn parse(s: &str) -> Result<Self> {
        let Some(hex) = s.strip_prefix(Self::PREFIX) else {
            bail!("{INVALID_DIGEST_FORMAT}: {s:?}");
        };
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            bail!("{INVALID_DIGEST_FORMAT}: {s:?}");
        }
        Ok(Self(s.into()))
    }

    /// Compute the digest of a byte slice
    pub fn of(bytes: &[u8]) -> Self {
        Self::from_sha256(Sha256::digest(bytes).as_slice())
    }

    /// Build a digest from a finished SHA-256 state
    pub fn from_sha256(sum: &[u8]) -> Self {
        let mut s = CompactString::from(Self::PREFIX);
        for b in sum {
            s.push_str(&format!("{b:02x}"));
        }
        Self(s)
    }

    /// The full `sha256:<hex>` form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare hex portion
    pub fn hex(&self) -> &str {
        &self.0[Self::PREFIX.len()..]
    }

    /// The on-disk blob filename, `sha256-<hex>`
    pub fn filename(&self) -> String {
        self.0.replace(':', "-")
    }

    /// Parse a blob filename back into a digest
    pub fn from_filename(name: &str) -> Result<Self> {
        Self::parse(&name.replacen('-', ":", 1))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<CompactString> for Digest {
    type Error = anyhow::Error;

    fn try_from(s: CompactString) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for CompactString {
    fn from(d: Digest) -> Self {
        d.0
    }
}

/// A reader tee that hashes everything it yields.
///
/// Wraps an inner reader so callers can decode a stream and recover its
/// digest afterwards without a second pass.
pub struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> DigestReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Finish hashing and return the digest of the bytes read so far
    pub fn digest(self) -> Digest {
        Digest::from_sha256(self.hasher.finalize().as_slice())
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
