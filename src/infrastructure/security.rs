use argon2::password_hash::{Error, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;

// Argon2id parameters, roughly 50-150ms per hash
const ARGON2_M_COST: u32 = 19456; // 19 MiB
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

fn hasher() -> Result<Argon2<'static>, Error> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, None)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `plain` with a fresh random salt, returning a PHC string.
pub fn hash_password(plain: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?.hash_password(plain.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks `plain` against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; only an unparseable `hash` is an error.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(hash)?;
    match hasher()?.verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}
