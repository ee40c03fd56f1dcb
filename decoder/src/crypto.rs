//
// Copyright 2024 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Per-stream key derivation and the AES-256-GCM wrapper used for media
//! payloads.

use aes_gcm::{aead::generic_array::GenericArray, AeadInPlace, Aes256Gcm, KeyInit};
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::stream_class::StreamClass;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub type Key = Zeroizing<[u8; KEY_LEN]>;
pub type Iv = [u8; IV_LEN];
pub type Tag = [u8; TAG_LEN];

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("shared key or secret nonce is empty")]
    MissingKeyMaterial,
    #[error("authentication tag did not verify")]
    AuthenticationFailed,
    #[error("IV must be {IV_LEN} bytes but was {0}")]
    InvalidIvLength(usize),
    #[error("plaintext too long to encrypt")]
    EncryptionFailed,
}

/// key = HMAC-SHA256(shared_key, secret_nonce || class tag)
pub fn derive_key(
    shared_key: &[u8],
    secret_nonce: &[u8],
    class: StreamClass,
) -> Result<Key, CryptoError> {
    if shared_key.is_empty() || secret_nonce.is_empty() {
        return Err(CryptoError::MissingKeyMaterial);
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(shared_key)
        .map_err(|_| CryptoError::MissingKeyMaterial)?;
    mac.update(secret_nonce);
    mac.update(&[class.key_tag()]);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&mac.finalize().into_bytes());
    trace!(
        "derived {} key from {}-byte shared key and {}-byte nonce",
        class,
        shared_key.len(),
        secret_nonce.len()
    );
    Ok(key)
}

/// AES-256-GCM with a 12-byte IV, a 16-byte tag and no associated data.
pub struct StreamCipher {
    cipher: Aes256Gcm,
}

impl StreamCipher {
    pub fn new(key: &Key) -> Self {
        Self {
            cipher: Aes256Gcm::new(GenericArray::from_slice(&key[..])),
        }
    }

    /// Returns ciphertext || tag.
    pub fn encrypt(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (mut ciphertext, tag) = self.encrypt_detached(iv, plaintext)?;
        ciphertext.extend_from_slice(&tag);
        Ok(ciphertext)
    }

    pub fn encrypt_detached(
        &self,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Tag), CryptoError> {
        check_iv_len(iv)?;
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(iv), &[], &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let mut detached = [0u8; TAG_LEN];
        detached.copy_from_slice(&tag);
        Ok((buffer, detached))
    }

    /// Takes ciphertext || tag.
    pub fn decrypt(&self, iv: &[u8], ciphertext_and_tag: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < TAG_LEN {
            return Err(CryptoError::AuthenticationFailed);
        }
        let (ciphertext, tag) = ciphertext_and_tag.split_at(ciphertext_and_tag.len() - TAG_LEN);
        self.decrypt_detached(iv, ciphertext, tag)
    }

    pub fn decrypt_detached(
        &self,
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        check_iv_len(iv)?;
        if tag.len() != TAG_LEN {
            return Err(CryptoError::AuthenticationFailed);
        }
        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(iv),
                &[],
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        Ok(buffer)
    }
}

fn check_iv_len(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() == IV_LEN {
        Ok(())
    } else {
        Err(CryptoError::InvalidIvLength(iv.len()))
    }
}
