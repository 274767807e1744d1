//! Hotel Crypto -- scrypt password digests.
//!
//! Digest format: `scrypt$<logN>$<salt hex>$<key hex>`, r=8, p=1, 32-byte key.
//! The parameters travel with the digest, so raising `log_n` later does not
//! invalidate stored passwords.

use ring::rand::{SecureRandom, SystemRandom};

const SCHEME: &str = "scrypt";
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const KEY_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;

/// Production work factor: 2^14 = 16384.
pub const DEFAULT_LOG_N: u8 = 14;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
    #[error("system RNG failure")]
    RngFailure,
    #[error("malformed password digest")]
    MalformedDigest,
}

/// Opaque password hashing capability.
pub trait PasswordHasher: Send + Sync {
    /// Hash a cleartext password into a self-describing digest string.
    fn hash(&self, password: &str) -> Result<String, CryptoError>;

    /// Check a cleartext password against a stored digest.
    ///
    /// Unparseable digests verify as `false`.
    fn verify(&self, password: &str, digest: &str) -> bool;
}

/// scrypt-backed [`PasswordHasher`].
pub struct ScryptHasher {
    log_n: u8,
    rng: SystemRandom,
}

impl ScryptHasher {
    pub fn new(log_n: u8) -> Self {
        Self {
            log_n,
            rng: SystemRandom::new(),
        }
    }

    pub fn log_n(&self) -> u8 {
        self.log_n
    }
}

impl Default for ScryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_N)
    }
}

impl PasswordHasher for ScryptHasher {
    fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let mut salt = [0u8; SALT_LENGTH];
        self.rng.fill(&mut salt).map_err(|_| CryptoError::RngFailure)?;

        let key = derive_key(password.as_bytes(), &salt, self.log_n)?;
        Ok(format!(
            "{SCHEME}${}${}${}",
            self.log_n,
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok((log_n, salt, expected)) = parse_digest(digest) else {
            return false;
        };
        match derive_key(password.as_bytes(), &salt, log_n) {
            Ok(key) => constant_time_eq(&key, &expected),
            Err(_) => false,
        }
    }
}

/// Derive a 256-bit key from password + salt using scrypt.
pub fn derive_key(password: &[u8], salt: &[u8], log_n: u8) -> Result<[u8; KEY_LENGTH], CryptoError> {
    let params = scrypt::Params::new(log_n, SCRYPT_R, SCRYPT_P, KEY_LENGTH)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    let mut key = [0u8; KEY_LENGTH];
    scrypt::scrypt(password, salt, &params, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    Ok(key)
}

fn parse_digest(digest: &str) -> Result<(u8, Vec<u8>, Vec<u8>), CryptoError> {
    let mut parts = digest.split('$');
    let (Some(SCHEME), Some(log_n), Some(salt), Some(key), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CryptoError::MalformedDigest);
    };

    let log_n = log_n.parse().map_err(|_| CryptoError::MalformedDigest)?;
    let salt = hex::decode(salt).map_err(|_| CryptoError::MalformedDigest)?;
    let key = hex::decode(key).map_err(|_| CryptoError::MalformedDigest)?;
    if key.len() != KEY_LENGTH {
        return Err(CryptoError::MalformedDigest);
    }
    Ok((log_n, salt, key))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
