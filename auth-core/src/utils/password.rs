use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version,
};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error("Invalid password hash format: {0}")]
    CorruptHash(String),
}

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash (PHC string format)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingParams {
    /// Cheapest parameters argon2 accepts. Only for tests and local tooling.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

const DUMMY_PASSWORD: &str = "timing-equalisation-placeholder";

/// One-way password hashing with a configurable work factor.
///
/// Every hash embeds its own random salt and parameters, so hashes produced
/// under older parameters keep verifying after the work factor is raised.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    dummy_hash: PasswordHashString,
}

impl CredentialHasher {
    pub fn new(params: HashingParams) -> Result<Self, PasswordError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, &Password::new(DUMMY_PASSWORD.to_string()))?;

        Ok(Self { argon2, dummy_hash })
    }

    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, PasswordError> {
        hash_with(&self.argon2, password)
    }

    /// Returns `Ok(false)` on mismatch; errors only on an unparseable stored hash.
    pub fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(password_hash.as_str())
            .map_err(|e| PasswordError::CorruptHash(e.to_string()))?;

        match self
            .argon2
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::CorruptHash(e.to_string())),
        }
    }

    /// Burn one verification against a fixed hash so a missing account costs
    /// the same as a wrong password.
    pub fn dummy_verify(&self, password: &Password) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

fn hash_with(
    argon2: &Argon2<'static>,
    password: &Password,
) -> Result<PasswordHashString, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}
