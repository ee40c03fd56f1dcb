//
// Copyright 2024 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Metadata carried in RTP header extensions. Which id means what depends
//! on the stream class; id 6 is the screen share resolution but the audio IV.

use log::*;
use thiserror::Error;
use tunnel_common::{parse_u16, Bits};

use crate::stream_class::StreamClass;

pub const SCREEN_SHARE_EXT_ID_STREAM_ID: u8 = 7;
pub const SCREEN_SHARE_EXT_ID_RESOLUTION: u8 = 6;
pub const SCREEN_SHARE_EXT_ID_FRAME_INFO: u8 = 4;
pub const VIDEO_EXT_ID_FRAME_INFO: u8 = 3;
// Seen on every video packet with constant values.
const VIDEO_EXT_IDS_OPAQUE: [u8; 3] = [1, 5, 7];
pub const AUDIO_EXT_ID_IV: u8 = 6;

pub const FRAME_INFO_LEN: usize = 8;
pub const RESOLUTION_LEN: usize = 4;
pub const AUDIO_IV_LEN: usize = 9;

const FRAME_INFO_VERSION_MASK: u8 = 0b0000_0011;
const FRAME_INFO_TEMPORAL_ID_MASK: u8 = 0b0000_0111;
// Bit indexes from the most significant bit of the flags byte.
const FRAME_INFO_START_BIT: u8 = 0;
const FRAME_INFO_END_BIT: u8 = 1;
const FRAME_INFO_INDEPENDENT_BIT: u8 = 2;
const FRAME_INFO_REQUIRED_BIT: u8 = 3;
const FRAME_INFO_BASE_BIT: u8 = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("extension {id} must be {expected} bytes but was {actual}")]
    InvalidLength {
        id: u8,
        expected: usize,
        actual: usize,
    },
    #[error("{0} out of range")]
    FieldOutOfRange(&'static str),
}

/// Layering and ordering information for a video frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Really u2
    pub version: u8,
    pub start: bool,
    pub end: bool,
    pub independent: bool,
    pub required: bool,
    pub base: bool,
    /// Really u3
    pub temporal_id: u8,
    pub current_frame: u16,
    pub previous_frame: u16,
    pub base_frame: u16,
}

impl FrameInfo {
    pub fn decode(value: &[u8]) -> Result<Self, ExtensionError> {
        let value: &[u8; FRAME_INFO_LEN] =
            value
                .try_into()
                .map_err(|_| ExtensionError::InvalidLength {
                    id: SCREEN_SHARE_EXT_ID_FRAME_INFO,
                    expected: FRAME_INFO_LEN,
                    actual: value.len(),
                })?;
        if value[0] & !FRAME_INFO_VERSION_MASK != 0 {
            debug!("frame info reserved bits set: 0x{:02x}", value[0]);
        }
        let flags = value[1];
        Ok(Self {
            version: value[0] & FRAME_INFO_VERSION_MASK,
            start: flags.ms_bit(FRAME_INFO_START_BIT),
            end: flags.ms_bit(FRAME_INFO_END_BIT),
            independent: flags.ms_bit(FRAME_INFO_INDEPENDENT_BIT),
            required: flags.ms_bit(FRAME_INFO_REQUIRED_BIT),
            base: flags.ms_bit(FRAME_INFO_BASE_BIT),
            temporal_id: flags & FRAME_INFO_TEMPORAL_ID_MASK,
            current_frame: parse_u16(&value[2..4]),
            previous_frame: parse_u16(&value[4..6]),
            base_frame: parse_u16(&value[6..8]),
        })
    }

    pub fn encode(&self) -> Result<[u8; FRAME_INFO_LEN], ExtensionError> {
        if self.version & !FRAME_INFO_VERSION_MASK != 0 {
            return Err(ExtensionError::FieldOutOfRange("frame info version"));
        }
        if self.temporal_id & !FRAME_INFO_TEMPORAL_ID_MASK != 0 {
            return Err(ExtensionError::FieldOutOfRange("frame info temporal id"));
        }
        let flags = self.temporal_id
            | 0u8
                .with_ms_bit(FRAME_INFO_START_BIT, self.start)
                .with_ms_bit(FRAME_INFO_END_BIT, self.end)
                .with_ms_bit(FRAME_INFO_INDEPENDENT_BIT, self.independent)
                .with_ms_bit(FRAME_INFO_REQUIRED_BIT, self.required)
                .with_ms_bit(FRAME_INFO_BASE_BIT, self.base);
        let [current_0, current_1] = self.current_frame.to_be_bytes();
        let [previous_0, previous_1] = self.previous_frame.to_be_bytes();
        let [base_0, base_1] = self.base_frame.to_be_bytes();
        Ok([
            self.version,
            flags,
            current_0,
            current_1,
            previous_0,
            previous_1,
            base_0,
            base_1,
        ])
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub fn decode(value: &[u8]) -> Result<Self, ExtensionError> {
        if value.len() != RESOLUTION_LEN {
            return Err(ExtensionError::InvalidLength {
                id: SCREEN_SHARE_EXT_ID_RESOLUTION,
                expected: RESOLUTION_LEN,
                actual: value.len(),
            });
        }
        Ok(Self {
            width: parse_u16(&value[0..2]),
            height: parse_u16(&value[2..4]),
        })
    }

    pub fn encode(&self) -> [u8; RESOLUTION_LEN] {
        let [width_0, width_1] = self.width.to_be_bytes();
        let [height_0, height_1] = self.height.to_be_bytes();
        [width_0, width_1, height_0, height_1]
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The start of an audio packet's encrypted payload header, moved into an
/// extension by the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioIv(pub [u8; AUDIO_IV_LEN]);

impl AudioIv {
    pub fn decode(value: &[u8]) -> Result<Self, ExtensionError> {
        let value = value
            .try_into()
            .map_err(|_| ExtensionError::InvalidLength {
                id: AUDIO_EXT_ID_IV,
                expected: AUDIO_IV_LEN,
                actual: value.len(),
            })?;
        Ok(Self(value))
    }

    /// The payload the rest of the pipeline expects: the version marker, the
    /// extension value, then the RTP payload.
    pub fn splice(&self, payload: &[u8]) -> Vec<u8> {
        let mut spliced = Vec::with_capacity(AUDIO_SPLICE_PREFIX.len() + AUDIO_IV_LEN + payload.len());
        spliced.extend_from_slice(&AUDIO_SPLICE_PREFIX);
        spliced.extend_from_slice(&self.0);
        spliced.extend_from_slice(payload);
        spliced
    }

    /// The inverse of [`AudioIv::splice`]: takes an encoded encrypted payload
    /// and returns the extension value and the RTP payload.
    pub fn split(encoded: &[u8]) -> Option<(Self, &[u8])> {
        let rest = encoded.strip_prefix(&AUDIO_SPLICE_PREFIX[..])?;
        let (value, payload) = rest.split_first_chunk::<AUDIO_IV_LEN>()?;
        Some((Self(*value), payload))
    }
}

// Payload version 0.
const AUDIO_SPLICE_PREFIX: [u8; 2] = [0x00, 0x00];

/// Everything the header extensions say about one packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamMetadata {
    pub stream_id: Option<Vec<u8>>,
    pub frame_info: Option<FrameInfo>,
    pub resolution: Option<Resolution>,
    pub audio_iv: Option<AudioIv>,
}

impl StreamMetadata {
    /// Unknown ids are logged and skipped.
    pub fn decode<'a>(
        class: StreamClass,
        extensions: impl IntoIterator<Item = (u8, &'a [u8])>,
    ) -> Result<Self, ExtensionError> {
        let mut metadata = Self::default();
        for (id, value) in extensions {
            match (class, id) {
                (StreamClass::ScreenShare, SCREEN_SHARE_EXT_ID_STREAM_ID) => {
                    metadata.stream_id = Some(value.to_vec());
                }
                (StreamClass::ScreenShare, SCREEN_SHARE_EXT_ID_RESOLUTION) => {
                    metadata.resolution = Some(Resolution::decode(value)?);
                }
                (StreamClass::ScreenShare, SCREEN_SHARE_EXT_ID_FRAME_INFO) => {
                    metadata.frame_info = Some(FrameInfo::decode(value)?);
                }
                (StreamClass::Video, VIDEO_EXT_ID_FRAME_INFO) => {
                    // Not always the screen share layout.
                    if value.len() == FRAME_INFO_LEN {
                        metadata.frame_info = Some(FrameInfo::decode(value)?);
                    } else {
                        debug!(
                            "video frame info of {} bytes: {}",
                            value.len(),
                            hex::encode(value)
                        );
                    }
                }
                (StreamClass::Video, id) if VIDEO_EXT_IDS_OPAQUE.contains(&id) => {
                    trace!("video extension {}: {}", id, hex::encode(value));
                }
                (StreamClass::Audio, AUDIO_EXT_ID_IV) => {
                    metadata.audio_iv = Some(AudioIv::decode(value)?);
                }
                (class, id) => {
                    debug!(
                        "unknown {} extension {}: {}",
                        class,
                        id,
                        hex::encode(value)
                    );
                }
            }
        }
        Ok(metadata)
    }
}
