//! Master password hash generation.
//!
//! Odoo stores the master password hashed with passlib's pbkdf2-sha512
//! scheme; the output here is byte-compatible so it can be pasted straight
//! into the `admin_passwd` line of odoo.conf.

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

/// passlib's default round count for pbkdf2-sha512.
const ROUNDS: u32 = 25_000;
const SALT_LEN: usize = 16;

pub fn run() -> Result<()> {
    let password = rpassword::prompt_password("New master password: ")?;
    if password.is_empty() {
        bail!("Empty master password");
    }
    let confirm = rpassword::prompt_password("Repeat: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let salt: [u8; SALT_LEN] = rand::random();
    println!("{}", hash_master_password(&password, &salt, ROUNDS));
    Ok(())
}

/// `$pbkdf2-sha512$rounds$salt$checksum` with passlib's adapted base64
/// (`+` becomes `.`, no padding).
pub fn hash_master_password(password: &str, salt: &[u8], rounds: u32) -> String {
    let mut derived = [0u8; 64];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, rounds, &mut derived);
    format!(
        "$pbkdf2-sha512${rounds}${}${}",
        ab64_encode(salt),
        ab64_encode(&derived)
    )
}

fn ab64_encode(data: &[u8]) -> String {
    STANDARD_NO_PAD.encode(data).replace('+', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_has_passlib_shape() {
        let salt = [7u8; SALT_LEN];
        let hash = hash_master_password("secret", &salt, ROUNDS);
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts[0], "");
        assert_eq!(parts[1], "pbkdf2-sha512");
        assert_eq!(parts[2], "25000");
        assert_eq!(parts[3].len(), 22); // 16 bytes
        assert_eq!(parts[4].len(), 86); // 64 bytes
        assert!(!hash.contains('+'));
        assert!(!hash.contains('='));
    }

    #[test]
    fn hash_is_deterministic_per_salt() {
        let salt = [1u8; SALT_LEN];
        assert_eq!(
            hash_master_password("secret", &salt, 1000),
            hash_master_password("secret", &salt, 1000)
        );
        assert_ne!(
            hash_master_password("secret", &salt, 1000),
            hash_master_password("secret", &[2u8; SALT_LEN], 1000)
        );
        assert_ne!(
            hash_master_password("secret", &salt, 1000),
            hash_master_password("other", &salt, 1000)
        );
    }

    #[test]
    fn ab64_replaces_plus() {
        // 0xfb 0xef produces '+' in standard base64
        let encoded = ab64_encode(&[0xfb, 0xef, 0xbe]);
        assert!(encoded.contains('.') || !encoded.contains('+'));
        assert!(!encoded.contains('='));
    }
}
