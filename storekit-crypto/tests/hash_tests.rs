use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use storekit_crypto::{
    hash_secret, verify_secret, CredentialHash, CredentialHasher, HashParams, CryptoError,
};

fn test_params() -> HashParams {
    HashParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

fn hasher() -> CredentialHasher {
    CredentialHasher::new(test_params()).unwrap()
}

// ── hash / verify ────────────────────────────────────────────────

#[test]
fn verify_accepts_the_hashed_secret() {
    let digest = hasher().hash("p@ss1").unwrap();
    assert!(CredentialHasher::verify(&digest, "p@ss1"));
}

#[test]
fn verify_rejects_a_different_secret() {
    let digest = hasher().hash("p@ss1").unwrap();
    assert!(!CredentialHasher::verify(&digest, "p@ss2"));
    assert!(!CredentialHasher::verify(&digest, ""));
}

#[test]
fn equal_secrets_produce_different_digests() {
    let h = hasher();
    let first = h.hash("p@ss1").unwrap();
    let second = h.hash("p@ss1").unwrap();
    assert_ne!(first, second);
    assert!(CredentialHasher::verify(&first, "p@ss1"));
    assert!(CredentialHasher::verify(&second, "p@ss1"));
}

#[test]
fn digest_is_self_describing() {
    let digest = hasher().hash("secret").unwrap();
    let text = digest.as_str();
    assert!(text.starts_with("$argon2id$v=19$"));
    assert!(text.contains("m=1024,t=1,p=1"));
    assert!(!text.contains("secret"));
}

#[test]
fn empty_secret_is_hashable() {
    let digest = hasher().hash("").unwrap();
    assert!(CredentialHasher::verify(&digest, ""));
    assert!(!CredentialHasher::verify(&digest, " "));
}

#[test]
fn default_helpers_roundtrip() {
    let digest = hash_secret("correct horse").unwrap();
    assert!(verify_secret(&digest, "correct horse"));
    assert!(!verify_secret(&digest, "battery staple"));
}

#[test]
fn invalid_params_are_rejected() {
    let err = CredentialHasher::new(HashParams {
        memory_cost: 1,
        time_cost: 0,
        parallelism: 1,
    })
    .unwrap_err();
    assert!(matches!(err, CryptoError::InvalidParams(_)));
}

#[test]
fn debug_output_redacts_digest() {
    let digest = hasher().hash("secret").unwrap();
    let debug = format!("{digest:?}");
    assert!(debug.contains("REDACTED"));
    assert!(!debug.contains("argon2id"));
}

#[test]
fn digest_serializes_as_phc_string() {
    let digest = hasher().hash("secret").unwrap();
    let json = serde_json::to_string(&digest).unwrap();
    let parsed: CredentialHash = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, digest);
    assert!(CredentialHasher::verify(&parsed, "secret"));
}

// ── older parameter sets ─────────────────────────────────────────

#[test]
fn verify_accepts_digests_from_older_params() {
    let old = CredentialHasher::new(HashParams {
        memory_cost: 2048,
        time_cost: 3,
        parallelism: 2,
    })
    .unwrap();
    let digest = old.hash("legacy").unwrap();

    let current = hasher();
    assert!(CredentialHasher::verify(&digest, "legacy"));
    assert!(current.needs_rehash(&digest));
}

#[test]
fn verify_accepts_argon2i_digests() {
    let params = Params::new(1024, 2, 1, Some(32)).unwrap();
    let legacy = Argon2::new(Algorithm::Argon2i, Version::V0x13, params);
    let salt = SaltString::encode_b64(&[7u8; 16]).unwrap();
    let phc = legacy.hash_password(b"legacy", &salt).unwrap().to_string();
    let digest = CredentialHash::from_phc(phc).unwrap();

    assert!(CredentialHasher::verify(&digest, "legacy"));
    assert!(!CredentialHasher::verify(&digest, "Legacy"));
    assert!(hasher().needs_rehash(&digest));
}

#[test]
fn current_digests_do_not_need_rehash() {
    let h = hasher();
    let digest = h.hash("fresh").unwrap();
    assert!(!h.needs_rehash(&digest));
}
