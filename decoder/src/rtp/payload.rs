//
// Copyright 2024 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The AEAD framing carried in every media payload:
//!
//! ```text
//! [version u16][ciphertext len u16][iv len u8 = 12][iv][reserved u8][ciphertext][tag][trailing]
//! ```

use log::*;
use thiserror::Error;
use tunnel_common::{parse_u16, CheckedSplitAt, Writer};

use crate::crypto::{CryptoError, Iv, StreamCipher, Tag, IV_LEN, TAG_LEN};

pub const PAYLOAD_HEADER_LEN: usize = 2 + 2 + 1 + IV_LEN + 1;
const PAYLOAD_VERSION_0: u16 = 0x0000;
const PAYLOAD_VERSION_1: u16 = 0x0001;
const PAYLOAD_RESERVED: u8 = 0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload of {0} bytes is shorter than the header")]
    TooShort(usize),
    #[error("unsupported payload version 0x{0:04x}")]
    UnsupportedVersion(u16),
    #[error("payload IV must be {IV_LEN} bytes but was declared as {0}")]
    InvalidIvLength(u8),
    #[error("payload declares {declared} bytes of ciphertext and tag but only {available} remain")]
    TruncatedPayload { declared: usize, available: usize },
    #[error("ciphertext of {0} bytes does not fit the length field")]
    CiphertextTooLong(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadVersion {
    #[default]
    V0,
    V1,
}

impl PayloadVersion {
    fn from_u16(version: u16) -> Option<Self> {
        match version {
            PAYLOAD_VERSION_0 => Some(Self::V0),
            PAYLOAD_VERSION_1 => Some(Self::V1),
            _ => None,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::V0 => PAYLOAD_VERSION_0,
            Self::V1 => PAYLOAD_VERSION_1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub version: PayloadVersion,
    pub iv: Iv,
    pub ciphertext: Vec<u8>,
    pub tag: Tag,
    /// Undocumented bytes some senders append after the tag.
    pub trailing: Vec<u8>,
}

impl EncryptedPayload {
    /// Splits ciphertext || tag as produced by [`StreamCipher::encrypt`].
    pub fn new(iv: Iv, ciphertext_and_tag: &[u8]) -> Result<Self, PayloadError> {
        let ciphertext_len = ciphertext_and_tag
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(PayloadError::TooShort(ciphertext_and_tag.len()))?;
        if ciphertext_len > u16::MAX as usize {
            return Err(PayloadError::CiphertextTooLong(ciphertext_len));
        }
        let (ciphertext, tag) = ciphertext_and_tag.split_at(ciphertext_len);
        let mut detached = [0u8; TAG_LEN];
        detached.copy_from_slice(tag);
        Ok(Self {
            version: PayloadVersion::V0,
            iv,
            ciphertext: ciphertext.to_vec(),
            tag: detached,
            trailing: Vec::new(),
        })
    }

    pub fn decode(buffer: &[u8]) -> Result<Self, PayloadError> {
        let (header, body) = buffer
            .checked_split_at(PAYLOAD_HEADER_LEN)
            .ok_or(PayloadError::TooShort(buffer.len()))?;

        let version = parse_u16(&header[0..2]);
        let version =
            PayloadVersion::from_u16(version).ok_or(PayloadError::UnsupportedVersion(version))?;
        let ciphertext_len = parse_u16(&header[2..4]) as usize;
        let iv_len = header[4];
        if iv_len as usize != IV_LEN {
            return Err(PayloadError::InvalidIvLength(iv_len));
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&header[5..5 + IV_LEN]);
        let reserved = header[5 + IV_LEN];
        if reserved != PAYLOAD_RESERVED {
            debug!("payload reserved byte is 0x{:02x}", reserved);
        }

        let declared = ciphertext_len + TAG_LEN;
        let (ciphertext_and_tag, trailing) =
            body.checked_split_at(declared)
                .ok_or(PayloadError::TruncatedPayload {
                    declared,
                    available: body.len(),
                })?;
        // The checked split leaves at least TAG_LEN bytes after the ciphertext.
        let (ciphertext, tag) = ciphertext_and_tag.split_at(ciphertext_len);
        let mut detached = [0u8; TAG_LEN];
        detached.copy_from_slice(tag);
        if !trailing.is_empty() {
            debug!(
                "payload has {} trailing bytes: {}",
                trailing.len(),
                hex::encode(&trailing[..trailing.len().min(32)])
            );
        }

        Ok(Self {
            version,
            iv,
            ciphertext: ciphertext.to_vec(),
            tag: detached,
            trailing: trailing.to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        let ciphertext_len = u16::try_from(self.ciphertext.len())
            .map_err(|_| PayloadError::CiphertextTooLong(self.ciphertext.len()))?;
        let header = (
            self.version.to_u16(),
            ciphertext_len,
            [IV_LEN as u8],
            self.iv,
            [PAYLOAD_RESERVED],
        );
        Ok((header, &self.ciphertext, self.tag, &self.trailing).to_vec())
    }

    pub fn decrypt(&self, cipher: &StreamCipher) -> Result<Vec<u8>, CryptoError> {
        cipher.decrypt_detached(&self.iv, &self.ciphertext, &self.tag)
    }
}
