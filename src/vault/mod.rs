//! Credential vault: symmetric encryption of platform credentials at rest.
//!
//! Ciphertexts are serialized as `nonceHex:tagHex:ciphertextHex` so the
//! format stays self-describing across key rotation.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Length of the random nonce field carried on the wire.
const NONCE_LEN: usize = 16;
/// AES-GCM consumes a 96-bit nonce; the leading bytes of the wire field.
const CIPHER_NONCE_LEN: usize = 12;
/// GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Vault operation errors
#[derive(Error, Debug)]
pub enum VaultError {
    /// Key material is not exactly 32 bytes
    #[error("Vault key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Random nonce generation failed
    #[error("Failed to generate nonce")]
    NonceGeneration,

    /// Encryption failed
    #[error("Encryption failed")]
    EncryptFailed,

    /// Ciphertext is malformed, tampered, or encrypted under another key
    #[error("Decryption failed: credential is malformed or tampered")]
    DecryptFailed,
}

/// Encrypts and decrypts long-lived tenant credentials with AES-256-GCM.
pub struct CredentialVault {
    key: [u8; 32],
    rng: SystemRandom,
}

impl CredentialVault {
    /// Build a vault from raw key material. Refuses anything but a
    /// 256-bit key so a misconfigured secret store fails at startup.
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != 32 {
            return Err(VaultError::InvalidKeyLength(key.len()));
        }
        let mut k = [0u8; 32];
        k.copy_from_slice(key);
        Ok(Self {
            key: k,
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a credential, producing `nonceHex:tagHex:ciphertextHex`.
    /// A fresh random nonce is drawn per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_field = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_field)
            .map_err(|_| VaultError::NonceGeneration)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(&nonce_field[..CIPHER_NONCE_LEN]);

        // aes-gcm appends the 16-byte tag to the ciphertext
        let mut sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptFailed)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_field),
            hex::encode(&tag),
            hex::encode(&sealed)
        ))
    }

    /// Decrypt a serialized credential. Any malformed field, wrong key, or
    /// modified byte fails the GCM tag check and returns an error; this
    /// never yields unauthenticated plaintext.
    pub fn decrypt(&self, token: &str) -> Result<String, VaultError> {
        let mut parts = token.split(':');
        let (nonce_hex, tag_hex, body_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(t), Some(b)) if parts.next().is_none() => (n, t, b),
            _ => return Err(VaultError::DecryptFailed),
        };

        let nonce_field = hex::decode(nonce_hex).map_err(|_| VaultError::DecryptFailed)?;
        let tag = hex::decode(tag_hex).map_err(|_| VaultError::DecryptFailed)?;
        let body = hex::decode(body_hex).map_err(|_| VaultError::DecryptFailed)?;

        if nonce_field.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(VaultError::DecryptFailed);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(&nonce_field[..CIPHER_NONCE_LEN]);

        let mut sealed = body;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| VaultError::DecryptFailed)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptFailed)
    }
}

/// Constant-time equality for secondary secret verification (webhook
/// signatures, shared secrets). Unequal lengths compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(matches!(
            CredentialVault::new(&[0u8; 16]),
            Err(VaultError::InvalidKeyLength(16))
        ));
        assert!(matches!(
            CredentialVault::new(&[0u8; 33]),
            Err(VaultError::InvalidKeyLength(33))
        ));
    }

    #[test]
    fn round_trip() {
        let v = vault();
        let token = v.encrypt("shpat_secret_credential").unwrap();
        assert_eq!(token.split(':').count(), 3);
        assert_eq!(v.decrypt(&token).unwrap(), "shpat_secret_credential");
    }

    #[test]
    fn fresh_nonce_per_call() {
        let v = vault();
        let a = v.encrypt("same").unwrap();
        let b = v.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_tag_fails() {
        let v = vault();
        let token = v.encrypt("credential").unwrap();
        let mut parts: Vec<String> = token.split(':').map(str::to_owned).collect();
        // Flip one bit of the tag
        let mut tag = hex::decode(&parts[1]).unwrap();
        tag[0] ^= 0x01;
        parts[1] = hex::encode(tag);
        assert!(v.decrypt(&parts.join(":")).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let v = vault();
        let token = v.encrypt("credential").unwrap();
        let mut parts: Vec<String> = token.split(':').map(str::to_owned).collect();
        let mut body = hex::decode(&parts[2]).unwrap();
        body[0] ^= 0x80;
        parts[2] = hex::encode(body);
        assert!(v.decrypt(&parts.join(":")).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let token = vault().encrypt("credential").unwrap();
        let other = CredentialVault::new(&[8u8; 32]).unwrap();
        assert!(other.decrypt(&token).is_err());
    }

    #[test]
    fn malformed_token_fails() {
        let v = vault();
        assert!(v.decrypt("").is_err());
        assert!(v.decrypt("abc").is_err());
        assert!(v.decrypt("zz:zz:zz").is_err());
        assert!(v.decrypt("00:00:00:00").is_err());
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
