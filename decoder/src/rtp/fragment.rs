//
// Copyright 2022 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Splitting of encrypted video payloads across packets and putting them
//! back together.
//!
//! The low five bits of the first payload byte are the unit type. Types
//! 0..=23 carry a whole unit after that byte. Type 28 carries a fragment
//! after a second byte whose top bits mark the start and end of the unit.

use log::*;
use thiserror::Error;
use tunnel_common::Bits;

const UNIT_TYPE_MASK: u8 = 0b0001_1111;
const SINGLE_UNIT_TYPES: std::ops::RangeInclusive<u8> = 0..=23;
pub const SINGLE_UNIT_TYPE: u8 = 1;
pub const FRAGMENT_UNIT_TYPE: u8 = 28;
pub const SINGLE_UNIT_HEADER_LEN: usize = 1;
pub const FRAGMENT_HEADER_LEN: usize = 2;
// Bit indexes from the most significant bit of the fragment header.
const FRAGMENT_START_BIT: u8 = 0;
const FRAGMENT_END_BIT: u8 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    #[error("payload of {0} bytes is too short for its framing")]
    TooShort(usize),
    #[error("start fragment received while already collecting")]
    UnexpectedStartBit,
    #[error("continuation fragment received while idle")]
    UnexpectedContinuation,
    #[error("unknown unit type {0}")]
    InvalidFraming(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    Single,
    Fragment { start: bool, end: bool },
}

impl Framing {
    pub fn parse(payload: &[u8]) -> Result<Self, FragmentError> {
        let first = *payload.first().ok_or(FragmentError::TooShort(0))?;
        let unit_type = first & UNIT_TYPE_MASK;
        if SINGLE_UNIT_TYPES.contains(&unit_type) {
            Ok(Self::Single)
        } else if unit_type == FRAGMENT_UNIT_TYPE {
            let header = *payload
                .get(1)
                .ok_or(FragmentError::TooShort(payload.len()))?;
            Ok(Self::Fragment {
                start: header.ms_bit(FRAGMENT_START_BIT),
                end: header.ms_bit(FRAGMENT_END_BIT),
            })
        } else {
            Err(FragmentError::InvalidFraming(unit_type))
        }
    }

    pub fn header_len(self) -> usize {
        match self {
            Self::Single => SINGLE_UNIT_HEADER_LEN,
            Self::Fragment { .. } => FRAGMENT_HEADER_LEN,
        }
    }

    pub fn is_head(self) -> bool {
        match self {
            Self::Single => true,
            Self::Fragment { start, .. } => start,
        }
    }

    pub fn is_tail(self) -> bool {
        match self {
            Self::Single => true,
            Self::Fragment { end, .. } => end,
        }
    }
}

/// Whether the payload begins a unit. Malformed payloads never do.
pub fn is_partition_head(payload: &[u8]) -> bool {
    Framing::parse(payload)
        .map(Framing::is_head)
        .unwrap_or(false)
}

/// Whether the payload ends a unit. The RTP marker bit should agree; it's
/// only logged when it doesn't.
pub fn is_partition_tail(marker: bool, payload: &[u8]) -> bool {
    let is_tail = Framing::parse(payload)
        .map(Framing::is_tail)
        .unwrap_or(false);
    if is_tail != marker {
        debug!(
            "marker bit {} disagrees with end of unit {} ({} bytes)",
            marker,
            is_tail,
            payload.len()
        );
    }
    is_tail
}

/// Collects the fragments of one unit for one SSRC.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    buffer: Vec<u8>,
    collecting: bool,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Returns the unit once its last fragment has been pushed.
    pub fn push(&mut self, payload: &[u8]) -> Result<Option<Vec<u8>>, FragmentError> {
        let framing = Framing::parse(payload)?;
        let body = &payload[framing.header_len()..];
        match framing {
            Framing::Single => Ok(Some(body.to_vec())),
            Framing::Fragment { start, end } => {
                if start {
                    if self.collecting {
                        debug!(
                            "dropping {} bytes of an unfinished unit",
                            self.buffer.len()
                        );
                        self.reset();
                        return Err(FragmentError::UnexpectedStartBit);
                    }
                    self.collecting = true;
                } else if !self.collecting {
                    return Err(FragmentError::UnexpectedContinuation);
                }
                self.buffer.extend_from_slice(body);
                if end {
                    self.collecting = false;
                    Ok(Some(std::mem::take(&mut self.buffer)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.collecting = false;
    }
}

/// Splits `payload` into packet payloads of at most `mtu` bytes, framed so
/// that [`FragmentReassembler`] rebuilds it.
pub fn packetize(payload: &[u8], mtu: usize) -> Vec<Vec<u8>> {
    if payload.len() + SINGLE_UNIT_HEADER_LEN <= mtu {
        let mut single = Vec::with_capacity(SINGLE_UNIT_HEADER_LEN + payload.len());
        single.push(SINGLE_UNIT_TYPE);
        single.extend_from_slice(payload);
        return vec![single];
    }

    let chunk_len = mtu.saturating_sub(FRAGMENT_HEADER_LEN).max(1);
    let chunk_count = payload.len().div_ceil(chunk_len);
    payload
        .chunks(chunk_len)
        .enumerate()
        .map(|(index, chunk)| {
            let header = 0u8
                .with_ms_bit(FRAGMENT_START_BIT, index == 0)
                .with_ms_bit(FRAGMENT_END_BIT, index + 1 == chunk_count);
            let mut fragment = Vec::with_capacity(FRAGMENT_HEADER_LEN + chunk.len());
            fragment.push(FRAGMENT_UNIT_TYPE);
            fragment.push(header);
            fragment.extend_from_slice(chunk);
            fragment
        })
        .collect()
}
