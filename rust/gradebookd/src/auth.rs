use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;

pub use argon2::password_hash::Error as PasswordHashError;

/// Hashes with argon2id and a fresh random salt. The result is a PHC string
/// (`$argon2id$v=19$...`) carrying the salt and parameters.
pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Unparseable stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Login state for the connected client.
#[derive(Debug, Default, Clone)]
pub struct Session {
    user: Option<String>,
}

impl Session {
    pub fn login(&mut self, username: impl Into<String>) {
        self.user = Some(username.into());
    }

    pub fn logout(&mut self) {
        self.user = None;
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}
