//! Credential hashing for StoreKit.
//!
//! Secrets are hashed with Argon2id into self-describing PHC strings
//! (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`). Verification reads the
//! algorithm and parameters back out of the digest, so digests produced under
//! older parameter sets keep verifying after the defaults are raised.

mod error;
mod hash;

pub use error::{CryptoError, CryptoResult};
pub use hash::{CredentialHash, CredentialHasher, HashParams, OUTPUT_SIZE, SALT_SIZE};
pub use zeroize::Zeroizing;

/// Hashes `secret` with the default parameter set.
pub fn hash_secret(secret: &str) -> CryptoResult<CredentialHash> {
    CredentialHasher::new(HashParams::default())?.hash(secret)
}

/// Checks `candidate` against a stored digest.
pub fn verify_secret(digest: &CredentialHash, candidate: &str) -> bool {
    CredentialHasher::verify(digest, candidate)
}
