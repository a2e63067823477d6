//! Salted one-way hashing of credentials.
//!
//! Uses Argon2id for new digests. Verification accepts any Argon2 variant and
//! parameter set that can be parsed from the stored digest.

use crate::error::{CryptoError, CryptoResult};
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use zeroize::Zeroize;

/// Size of the random salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Size of the derived hash in bytes.
pub const OUTPUT_SIZE: usize = 32;

/// Argon2 cost parameters used for new digests.
///
/// Default values are tuned for interactive logins on modern hardware.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Time cost (iterations).
    pub time_cost: u32,
    /// Parallelism factor.
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        // OWASP recommendations for Argon2id (2023)
        Self {
            memory_cost: 19 * 1024, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl HashParams {
    fn to_argon2(&self) -> CryptoResult<Params> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(OUTPUT_SIZE),
        )
        .map_err(|e| CryptoError::InvalidParams(e.to_string()))
    }
}

/// A stored credential digest in PHC string form.
///
/// The plaintext secret is never part of this value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Wraps a digest loaded from storage, checking that it parses.
    pub fn from_phc(digest: impl Into<String>) -> CryptoResult<Self> {
        let digest = digest.into();
        PasswordHash::new(&digest).map_err(|e| CryptoError::MalformedDigest(e.to_string()))?;
        Ok(Self(digest))
    }

    /// Returns the PHC string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialHash")
            .field(&"[REDACTED]")
            .finish()
    }
}

impl TryFrom<String> for CredentialHash {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_phc(value)
    }
}

impl From<CredentialHash> for String {
    fn from(hash: CredentialHash) -> Self {
        hash.0
    }
}

/// Produces and checks credential digests.
#[derive(Clone)]
pub struct CredentialHasher {
    params: HashParams,
    argon2: Argon2<'static>,
}

impl fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", &self.params)
            .finish()
    }
}

impl CredentialHasher {
    /// Creates a hasher that writes digests with `params`.
    pub fn new(params: HashParams) -> CryptoResult<Self> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
        Ok(Self { params, argon2 })
    }

    /// The parameter set used for new digests.
    pub fn params(&self) -> &HashParams {
        &self.params
    }

    /// Hashes `secret` under a fresh random salt.
    pub fn hash(&self, secret: &str) -> CryptoResult<CredentialHash> {
        let mut salt_bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes);
        salt_bytes.zeroize();
        let salt = salt.map_err(|e| CryptoError::Hashing(e.to_string()))?;

        let digest = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;
        Ok(CredentialHash(digest.to_string()))
    }

    /// Checks `candidate` against `digest`.
    ///
    /// The algorithm, version and cost parameters are taken from the digest
    /// itself. The final comparison of derived bytes is constant time.
    pub fn verify(digest: &CredentialHash, candidate: &str) -> bool {
        let parsed = match PasswordHash::new(digest.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Credential digest could not be parsed");
                return false;
            }
        };

        match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => true,
            Err(password_hash::Error::Password) => false,
            Err(e) => {
                debug!(error = %e, "Credential verification failed");
                false
            }
        }
    }

    /// Whether `digest` was produced with something other than the current
    /// algorithm and parameters, and should be replaced after the next
    /// successful verification.
    pub fn needs_rehash(&self, digest: &CredentialHash) -> bool {
        let Ok(parsed) = PasswordHash::new(digest.as_str()) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident()
            || parsed.version != Some(Version::V0x13.into())
        {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(params) => {
                params.m_cost() != self.params.memory_cost
                    || params.t_cost() != self.params.time_cost
                    || params.p_cost() != self.params.parallelism
                    || params.output_len() != Some(OUTPUT_SIZE)
            }
            Err(_) => true,
        }
    }
}
