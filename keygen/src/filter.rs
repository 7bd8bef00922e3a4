//! Candidate filter for Spring '83 public keys
//!
//! A valid key's hex encoding ends in `83e`, a month `01`-`12`, then `23`
//! (the key's expiry year). Almost every candidate is rejected by a mask
//! over two raw bytes before anything is hex-encoded.

use crate::error::{KeygenError, Result};
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use regex::Regex;

/// Suffix every accepted key's hex encoding must end with
pub const KEY_PATTERN: &str = r"83e(0[1-9]|1[0-2])23$";

const MARKER_MASK: u16 = 0x0fff;
const MARKER: u16 = 0x083e;

/// A textual matcher over the hex encoding of a public key
pub trait Pattern: Send + Sync {
    fn is_match(&self, haystack: &str) -> bool;
}

impl Pattern for Regex {
    fn is_match(&self, haystack: &str) -> bool {
        Regex::is_match(self, haystack)
    }
}

/// Immutable filter shared read-only by every worker
#[derive(Debug)]
pub struct CandidateFilter<P = Regex> {
    key_pattern: P,
    vanity: Option<P>,
}

impl CandidateFilter<Regex> {
    /// Compile the mandatory pattern plus an optional vanity regex.
    ///
    /// An empty vanity string means no extra constraint.
    pub fn new(vanity: Option<&str>) -> Result<Self> {
        let key_pattern = compile("key", KEY_PATTERN)?;
        let vanity = vanity
            .filter(|v| !v.is_empty())
            .map(|v| compile("vanity", v))
            .transpose()?;

        Ok(Self::with_patterns(key_pattern, vanity))
    }
}

impl<P: Pattern> CandidateFilter<P> {
    pub fn with_patterns(key_pattern: P, vanity: Option<P>) -> Self {
        Self {
            key_pattern,
            vanity,
        }
    }

    pub fn has_vanity(&self) -> bool {
        self.vanity.is_some()
    }

    /// Check a public key against the marker, the vanity pattern and the key pattern
    pub fn is_valid(&self, public_key: &[u8; PUBLIC_KEY_LENGTH]) -> bool {
        if !has_marker(public_key) {
            return false;
        }

        let encoded = hex::encode(public_key);

        if let Some(vanity) = &self.vanity {
            if !vanity.is_match(&encoded) {
                return false;
            }
        }

        self.key_pattern.is_match(&encoded)
    }
}

/// Fast pre-check: the big-endian u16 starting four bytes from the end
/// must carry `83e` in its low 12 bits.
pub fn has_marker(public_key: &[u8; PUBLIC_KEY_LENGTH]) -> bool {
    let at = PUBLIC_KEY_LENGTH - 4;
    let word = u16::from_be_bytes([public_key[at], public_key[at + 1]]);
    word & MARKER_MASK == MARKER
}

fn compile(kind: &'static str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| KeygenError::InvalidPattern {
        kind,
        pattern: pattern.to_string(),
        source,
    })
}
