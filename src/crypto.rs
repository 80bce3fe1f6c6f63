//! Password hashing and email digests.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that may occur while hashing.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid argon2 parameters")]
    Params,
    #[error("password hashing failed")]
    Hash,
}

/// Hashing facilities shared by the whole application.
#[derive(Clone)]
pub struct Crypto {
    params: Params,
}

impl Crypto {
    /// Create a new [`Crypto`] from configuration.
    pub fn new(config: Option<crate::config::Argon2>) -> Result<Self, CryptoError> {
        let config = config.unwrap_or_default();
        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|_| CryptoError::Params)?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with Argon2id and a random salt.
    pub fn hash_password(&self, password: &str) -> Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| CryptoError::Hash)?;

        Ok(hash.to_string())
    }

    /// Check a password against a stored hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Deterministic digest used for email uniqueness lookups.
    ///
    /// Emails are lowercased first so `Foo@ex.com` and `foo@ex.com`
    /// collide.
    pub fn digest(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.to_lowercase().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> Crypto {
        // Cheap parameters, unit tests only.
        Crypto::new(Some(crate::config::Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_password_roundtrip() {
        let crypto = crypto();
        let hash = crypto.hash_password("correct horse").unwrap();
        assert!(crypto.verify_password("correct horse", &hash));
        assert!(!crypto.verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_digest_is_case_insensitive() {
        let crypto = crypto();
        assert_eq!(
            crypto.digest("Jane@Example.com"),
            crypto.digest("jane@example.com")
        );
    }
}
