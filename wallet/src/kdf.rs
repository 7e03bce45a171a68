//! Argon2id key derivation (§4.9). No PBKDF2 fallback: the implementation
//! commits to the spec's preferred KDF rather than supporting both.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::{Error, Result};
use crate::file::KdfParams;

pub const SALT_LEN: usize = 16; // 128-bit salt, per §4.9
pub const KEY_LEN: usize = 32; // AES-256 key material

pub fn derive_key(password: &str, salt: &[u8], params: KdfParams) -> Result<[u8; KEY_LEN]> {
    let argon2_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| Error::InvalidFormat(format!("bad kdf_params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::InvalidFormat(format!("argon2id derivation failed: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_derive_same_key() {
        let params = KdfParams::default();
        let salt = [7u8; SALT_LEN];
        let a = derive_key("Correct-Horse9", &salt, params).unwrap();
        let b = derive_key("Correct-Horse9", &salt, params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let params = KdfParams::default();
        let salt = [7u8; SALT_LEN];
        let a = derive_key("Correct-Horse9", &salt, params).unwrap();
        let b = derive_key("Correct-Horse8", &salt, params).unwrap();
        assert_ne!(a, b);
    }
}
