use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash a password using Argon2id (19MB memory, 2 iterations, parallelism 1).
pub fn hash(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params::new(19 * 1024, 2, 1, None).map_err(|e| format!("Invalid params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Hashing failed: {e}"))
}

/// Verify a password against a stored hash.
///
/// Accepts PHC-encoded Argon2 hashes and the legacy format: a bare hex
/// SHA-256 digest with no salt. Use [`needs_rehash`] after a successful
/// verification to migrate legacy rows.
pub fn verify(password: &str, hash: &str) -> Result<bool, String> {
    if is_legacy_digest(hash) {
        let computed = legacy_digest(password);
        return Ok(computed
            .as_bytes()
            .ct_eq(hash.to_ascii_lowercase().as_bytes())
            .into());
    }

    let parsed = PasswordHash::new(hash).map_err(|e| format!("Invalid hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// True when the stored hash predates Argon2 and should be replaced.
pub fn needs_rehash(hash: &str) -> bool {
    is_legacy_digest(hash)
}

fn is_legacy_digest(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

fn legacy_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Hex SHA-256 of an opaque token, used for refresh and one-time login tokens.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
