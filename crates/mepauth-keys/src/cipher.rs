//! AES-256-GCM primitives.
//!
//! Ciphertexts carry the 16-byte authentication tag appended; nonces are
//! stored separately by the caller.

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use rand::RngExt;
use zeroize::Zeroizing;

use crate::error::KeyError;

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Fill a fresh wiping buffer with `N` random bytes.
#[must_use]
pub fn random_bytes<const N: usize>() -> Zeroizing<[u8; N]> {
    let mut buf = Zeroizing::new([0u8; N]);
    rand::rng().fill(&mut *buf);
    buf
}

/// Generate a random 256-bit key.
#[must_use]
pub fn generate_key() -> Zeroizing<[u8; KEY_LEN]> {
    random_bytes::<KEY_LEN>()
}

/// Generate a random GCM nonce.
#[must_use]
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce);
    nonce
}

fn aead_key(key: &[u8], err: KeyError) -> Result<LessSafeKey, KeyError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| err)
}

/// Encrypt `plaintext` under `key` with `nonce`.
///
/// # Examples
///
/// ```
/// use mepauth_keys::cipher::{decrypt, encrypt, generate_key, generate_nonce};
///
/// let key = generate_key();
/// let nonce = generate_nonce();
/// let sealed = encrypt(b"secret", &*key, &nonce).unwrap();
/// assert_eq!(decrypt(&sealed, &*key, &nonce).unwrap().as_slice(), b"secret");
/// ```
pub fn encrypt(plaintext: &[u8], key: &[u8], nonce: &[u8]) -> Result<Vec<u8>, KeyError> {
    let key = aead_key(key, KeyError::Encryption)?;
    let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| KeyError::Encryption)?;

    // Reserve room for the tag so sealing never reallocates away from the
    // wiping buffer while it still holds plaintext.
    let mut in_out = Zeroizing::new(Vec::with_capacity(
        plaintext.len() + AES_256_GCM.tag_len(),
    ));
    in_out.extend_from_slice(plaintext);
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut *in_out)
        .map_err(|_| KeyError::Encryption)?;

    Ok(std::mem::take(&mut *in_out))
}

/// Decrypt and authenticate `ciphertext` under `key` with `nonce`.
///
/// Any failure, including a wrong key or a tampered ciphertext or nonce, is
/// reported as [`KeyError::Decryption`].
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    nonce: &[u8],
) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let key = aead_key(key, KeyError::Decryption)?;
    let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| KeyError::Decryption)?;

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| KeyError::Decryption)?
        .len();
    in_out.truncate(plaintext_len);

    Ok(in_out)
}
