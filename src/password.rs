//! Argon2id password hashing.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use derive_more::{Display, Error};
use tracing::{debug, instrument};

/// Password hashing error.
#[derive(Debug, Clone, Display, Error)]
#[display("Password error: {}", message)]
pub struct PasswordError {
    /// Error message.
    pub message: String,
}

impl PasswordError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Hashes and verifies passwords as PHC strings.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Creates a hasher with the given Argon2 memory cost (KiB) and iteration count.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError`] if Argon2 rejects the parameters.
    #[instrument]
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| PasswordError::new(format!("Invalid Argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError`] if hashing fails.
    #[instrument(skip_all)]
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
            .map_err(|e| PasswordError::new(format!("Salt generation failed: {}", e)))?;
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::new(format!("Hashing failed: {}", e)))?;
        debug!("Password hashed");
        Ok(hash.to_string())
    }

    /// Checks a password against a stored PHC hash.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError`] if the stored hash is malformed.
    #[instrument(skip_all)]
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(stored)
            .map_err(|e| PasswordError::new(format!("Stored hash is malformed: {}", e)))?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::new(format!("Verification failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(1024, 1).expect("params")
    }

    #[test]
    fn hash_then_verify() {
        let hasher = hasher();
        let hash = hasher.hash("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash).expect("verify"));
        assert!(!hasher.verify("wrong horse", &hash).expect("verify"));
    }

    #[test]
    fn salts_differ() {
        let hasher = hasher();
        let a = hasher.hash("same").expect("hash");
        let b = hasher.hash("same").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_error() {
        assert!(hasher().verify("x", "not-a-phc-string").is_err());
    }
}
