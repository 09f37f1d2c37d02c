//! Password utilities

use argon2::Argon2;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use rand_core::OsRng;

/// Minimum length of a user chosen password
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Generate a new password
pub fn generate() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Hash a given password
///
/// # Errors
///
/// Will return `Err` when argon2 can not hash the password
pub fn hash(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = Argon2::default();

    let hashed_password = argon2.hash_password(password.as_bytes(), &salt)?;

    Ok(hashed_password.to_string())
}

/// Verify a given password against a given hash
///
/// An unparsable hash never verifies.
pub fn verify(hashed_password: &str, password: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hashed_password) else {
        tracing::warn!("Stored password hash could not be parsed");
        return false;
    };

    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = generate();
        assert!(password.len() >= MIN_PASSWORD_LENGTH);

        let hashed_password = hash(&password).unwrap();
        assert!(verify(&hashed_password, &password));
        assert!(!verify(&hashed_password, "not the password"));
        assert!(!verify("garbage", &password));
    }
}
