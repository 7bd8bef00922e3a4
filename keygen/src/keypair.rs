//! Ed25519 keypairs and the sources that produce them
//!
//! A worker never touches an RNG directly: it asks its own [`KeySource`]
//! for the next candidate. Production uses [`RngKeySource::os`]; tests feed
//! a seeded RNG or a scripted sequence instead.

use crate::error::Result;
use ed25519_dalek::{SigningKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::fmt;

/// A generated keypair: the 32-byte seed and the public key derived from it
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    secret: [u8; SECRET_KEY_LENGTH],
    public: [u8; PUBLIC_KEY_LENGTH],
}

impl Keypair {
    /// Build a keypair from raw parts without checking that they belong together
    pub fn from_parts(secret: [u8; SECRET_KEY_LENGTH], public: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { secret, public }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public
    }

    pub fn secret_key(&self) -> &[u8; SECRET_KEY_LENGTH] {
        &self.secret
    }

    /// The private key blob: `seed || public`, the layout Spring '83 clients import
    pub fn private_key_blob(&self) -> [u8; KEYPAIR_LENGTH] {
        let mut blob = [0u8; KEYPAIR_LENGTH];
        blob[..SECRET_KEY_LENGTH].copy_from_slice(&self.secret);
        blob[SECRET_KEY_LENGTH..].copy_from_slice(&self.public);
        blob
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn private_hex(&self) -> String {
        hex::encode(self.private_key_blob())
    }
}

impl From<&SigningKey> for Keypair {
    fn from(signing_key: &SigningKey) -> Self {
        Self {
            secret: signing_key.to_bytes(),
            public: signing_key.verifying_key().to_bytes(),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

/// Produces candidate keypairs for one worker
pub trait KeySource {
    fn generate(&mut self) -> Result<Keypair>;
}

impl<S: KeySource + ?Sized> KeySource for Box<S> {
    fn generate(&mut self) -> Result<Keypair> {
        (**self).generate()
    }
}

/// Draws Ed25519 seeds from a cryptographically secure RNG
pub struct RngKeySource<R> {
    rng: R,
}

impl<R> RngKeySource<R>
where
    R: RngCore + CryptoRng,
{
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngKeySource<OsRng> {
    /// Source backed by the operating system's entropy pool
    pub fn os() -> Self {
        Self::new(OsRng)
    }
}

impl<R> KeySource for RngKeySource<R>
where
    R: RngCore + CryptoRng,
{
    fn generate(&mut self) -> Result<Keypair> {
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        self.rng.try_fill_bytes(&mut seed)?;
        let signing_key = SigningKey::from_bytes(&seed);
        Ok(Keypair::from(&signing_key))
    }
}
