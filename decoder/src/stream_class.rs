//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The kinds of media stream a participant can send.

use strum_macros::{Display, EnumIter, EnumString};

use crate::rtp::PayloadType;

pub const VIDEO_PAYLOAD_TYPE: PayloadType = 98;
pub const SCREEN_SHARE_PAYLOAD_TYPE: PayloadType = 99;
pub const AUDIO_PAYLOAD_TYPE: PayloadType = 112;
pub const ALTERNATE_AUDIO_PAYLOAD_TYPE: PayloadType = 99;
/// Keep-alive and FEC packets that share an SSRC with the media.
pub const AUXILIARY_PAYLOAD_TYPE: PayloadType = 110;

pub const VIDEO_CLOCK_RATE: u32 = 90_000;
pub const AUDIO_CLOCK_RATE: u32 = 48_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum StreamClass {
    Video,
    Audio,
    ScreenShare,
}

impl StreamClass {
    /// The byte appended to the participant's secret nonce when deriving
    /// the stream key.
    pub fn key_tag(self) -> u8 {
        match self {
            StreamClass::Video => 0x00,
            StreamClass::Audio => 0x01,
            StreamClass::ScreenShare => 0x02,
        }
    }

    pub fn accepts_payload_type(self, pt: PayloadType) -> bool {
        match self {
            StreamClass::Video => pt == VIDEO_PAYLOAD_TYPE,
            // Older captures reuse the video payload type.
            StreamClass::ScreenShare => {
                pt == SCREEN_SHARE_PAYLOAD_TYPE || pt == VIDEO_PAYLOAD_TYPE
            }
            StreamClass::Audio => pt == AUDIO_PAYLOAD_TYPE || pt == ALTERNATE_AUDIO_PAYLOAD_TYPE,
        }
    }

    /// The payload type written by the encoder.
    pub fn payload_type(self) -> PayloadType {
        match self {
            StreamClass::Video => VIDEO_PAYLOAD_TYPE,
            StreamClass::ScreenShare => SCREEN_SHARE_PAYLOAD_TYPE,
            StreamClass::Audio => AUDIO_PAYLOAD_TYPE,
        }
    }

    pub fn clock_rate(self) -> u32 {
        match self {
            StreamClass::Video | StreamClass::ScreenShare => VIDEO_CLOCK_RATE,
            StreamClass::Audio => AUDIO_CLOCK_RATE,
        }
    }

    /// Video and screen share payloads are split into fragments; audio
    /// payloads always fit in one packet.
    pub fn is_fragmented(self) -> bool {
        !matches!(self, StreamClass::Audio)
    }
}
