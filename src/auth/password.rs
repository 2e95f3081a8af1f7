use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub const MIN_LEN: usize = 8;
pub const MAX_LEN: usize = 128;

/// Argon2id with a fresh random salt; returns the PHC string.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Sign-up password rules: 8–128 chars with lower, upper, digit and symbol.
pub fn check_strength(plain: &str) -> Result<(), &'static str> {
    let len = plain.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return Err("Password must be between 8 and 128 characters.");
    }
    let lower = plain.chars().any(|c| c.is_ascii_lowercase());
    let upper = plain.chars().any(|c| c.is_ascii_uppercase());
    let digit = plain.chars().any(|c| c.is_ascii_digit());
    let symbol = plain.chars().any(|c| !c.is_ascii_alphanumeric());
    if lower && upper && digit && symbol {
        Ok(())
    } else {
        Err("Password must include upper and lower case letters, a number, and a symbol.")
    }
}
