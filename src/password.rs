use argon2rs::verifier::Encoded;
use rand::RngCore;

use crate::error::{ServiceError, ServiceResult};

const SALT_LENGTH: usize = 16;

/// Hash a password with argon2i and a random salt.
///
/// The result is a self describing encoded string (`$argon2i$m=...`) that contains the salt and
/// parameters and can be stored as is.
pub fn password_hash_create(password: &str) -> ServiceResult<String> {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);

    let encoded = Encoded::default2i(password.as_bytes(), &salt, b"", b"");
    String::from_utf8(encoded.to_u8())
        .map_err(|e| ServiceError::InternalServerError(format!("Could not encode hash: {e}")))
}

pub fn password_hash_verify(hash: &str, password: &str) -> ServiceResult<bool> {
    let encoded = Encoded::from_u8(hash.as_bytes()).map_err(|e| {
        ServiceError::InternalServerError(format!("Could not decode password hash: {e:?}"))
    })?;

    Ok(encoded.verify(password.as_bytes()))
}

/// Random password for accounts that are created without one.
pub fn generate_password() -> String {
    use base64::engine::general_purpose;
    use base64::Engine;

    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = password_hash_create("correct horse").unwrap();

        assert!(hash.starts_with("$argon2i$"));
        assert!(!hash.contains("correct horse"));
        assert!(password_hash_verify(&hash, "correct horse").unwrap());
        assert!(!password_hash_verify(&hash, "battery staple").unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let a = password_hash_create("admin").unwrap();
        let b = password_hash_create("admin").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_plaintext_is_rejected() {
        assert!(password_hash_verify("admin123", "admin123").is_err());
    }

    #[test]
    fn test_generated_passwords_differ() {
        let a = generate_password();
        assert_eq!(a.len(), 16);
        assert_ne!(a, generate_password());
    }
}
