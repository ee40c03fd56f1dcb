//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Classification of the messages received over the media tunnel and
//! removal of the preamble in front of the RTP/RTCP packets they carry.

use log::*;
use thiserror::Error;
use tunnel_common::CheckedSplitAt;

use crate::stream_class::StreamClass;

const PING: u8 = 0x00;
const SCREEN_SHARE_RTP: u8 = 0x4D;
const VIDEO_RTP: u8 = 0x67;
const AUDIO_RTP: u8 = 0x6B;
const RTCP: u8 = 0x4E;
const IV_ANNOUNCEMENT: u8 = 0x42;

const SHORT_PREAMBLE_LEN: usize = 4;
const VIDEO_PREAMBLE_LEN: usize = 28;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Ping,
    ScreenShareRtp,
    VideoRtp,
    /// Framed like screen share: the packet follows a 4 byte preamble.
    /// Some senders instead put a big-endian u16 RTP length at bytes 21..23
    /// and the packet at offset 23; that framing isn't recognized here.
    AudioRtp,
    Rtcp,
    /// Announces an AES-GCM IV; carries nothing the decoder needs.
    IvAnnouncement,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            PING => Self::Ping,
            SCREEN_SHARE_RTP => Self::ScreenShareRtp,
            VIDEO_RTP => Self::VideoRtp,
            AUDIO_RTP => Self::AudioRtp,
            RTCP => Self::Rtcp,
            IV_ANNOUNCEMENT => Self::IvAnnouncement,
            other => Self::Other(other),
        }
    }
}

impl MessageType {
    /// Bytes in front of the body, including the type byte itself.
    pub fn preamble_len(self) -> usize {
        match self {
            Self::VideoRtp => VIDEO_PREAMBLE_LEN,
            Self::ScreenShareRtp | Self::AudioRtp | Self::Rtcp | Self::IvAnnouncement => {
                SHORT_PREAMBLE_LEN
            }
            Self::Ping | Self::Other(_) => 1,
        }
    }

    /// The class of the media packets in this message, if any.
    pub fn stream_class(self) -> Option<StreamClass> {
        match self {
            Self::VideoRtp => Some(StreamClass::Video),
            Self::ScreenShareRtp => Some(StreamClass::ScreenShare),
            Self::AudioRtp => Some(StreamClass::Audio),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("empty message")]
    Empty,
    #[error("{message_type:?} message of {len} bytes is shorter than its {preamble_len} byte preamble")]
    TooShort {
        message_type: MessageType,
        len: usize,
        preamble_len: usize,
    },
}

pub fn classify(message: &[u8]) -> Result<MessageType, TransportError> {
    message
        .first()
        .map(|&value| MessageType::from(value))
        .ok_or(TransportError::Empty)
}

/// Returns the message type and the packet after the preamble.
pub fn strip_preamble(message: &[u8]) -> Result<(MessageType, &[u8]), TransportError> {
    let message_type = classify(message)?;
    let preamble_len = message_type.preamble_len();
    let (preamble, body) =
        message
            .checked_split_at(preamble_len)
            .ok_or(TransportError::TooShort {
                message_type,
                len: message.len(),
                preamble_len,
            })?;
    trace!(
        "{:?} message preamble {} with {} byte body",
        message_type,
        hex::encode(preamble),
        body.len()
    );
    Ok((message_type, body))
}
