//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Turns plaintext samples into encrypted RTP packets the way senders in a
//! session do, so that decoders can be checked against known input.

use std::time::Duration;

use log::*;
use thiserror::Error;

use crate::{
    crypto::{CryptoError, Iv, StreamCipher, IV_LEN},
    roster::{KeyLookupError, SharedRoster},
    rtp::{
        self, packetize, write_extension, AudioIv, EncryptedPayload, ExtensionError, FrameInfo,
        PayloadError, Resolution, Ssrc, TruncatedSequenceNumber, TruncatedTimestamp,
        AUDIO_EXT_ID_IV, SCREEN_SHARE_EXT_ID_FRAME_INFO, SCREEN_SHARE_EXT_ID_RESOLUTION,
        SCREEN_SHARE_EXT_ID_STREAM_ID, VIDEO_EXT_ID_FRAME_INFO,
    },
    stream_class::StreamClass,
};

const FRAME_INFO_VERSION: u8 = 2;
const SCREEN_SHARE_STREAM_ID: [u8; 1] = [0x01];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("cannot encode packets for ssrc {ssrc}: {source}")]
    CannotEncode { ssrc: Ssrc, source: KeyLookupError },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Largest RTP payload to produce. Larger samples are fragmented.
    pub mtu: usize,
    pub width: u16,
    pub height: u16,
    /// Defaults to the clock rate of the stream class.
    pub clock_rate: Option<u32>,
    pub first_seqnum: TruncatedSequenceNumber,
    pub first_timestamp: TruncatedTimestamp,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            mtu: 1200,
            width: 1280,
            height: 720,
            clock_rate: None,
            first_seqnum: 0,
            first_timestamp: 2746202358,
        }
    }
}

/// Encodes the samples of one SSRC.
pub struct StreamEncoder {
    class: StreamClass,
    ssrc: Ssrc,
    config: EncoderConfig,
    clock_rate: u32,
    cipher: StreamCipher,
    message_counter: u16,
    next_seqnum: TruncatedSequenceNumber,
    current_frame: u16,
    base_frame: u16,
}

impl StreamEncoder {
    /// The SSRC's owner and the shared key must already be in the roster.
    pub fn new(
        class: StreamClass,
        ssrc: Ssrc,
        roster: &SharedRoster,
        config: EncoderConfig,
    ) -> Result<Self, EncodeError> {
        let key = roster
            .read()
            .stream_key(ssrc, class)
            .map_err(|source| EncodeError::CannotEncode { ssrc, source })?;
        let clock_rate = config
            .clock_rate
            .filter(|rate| *rate > 0)
            .unwrap_or_else(|| class.clock_rate());
        Ok(Self {
            class,
            ssrc,
            next_seqnum: config.first_seqnum,
            config,
            clock_rate,
            cipher: StreamCipher::new(&key),
            message_counter: 0,
            current_frame: 0,
            base_frame: 0,
        })
    }

    pub fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    /// Returns the serialized RTP packets carrying `sample`, which is taken
    /// `elapsed` after the first sample.
    pub fn encode(
        &mut self,
        sample: &[u8],
        elapsed: Duration,
    ) -> Result<Vec<Vec<u8>>, EncodeError> {
        let iv = self.next_iv();
        let sealed = self.cipher.encrypt(&iv, sample)?;
        let encoded = EncryptedPayload::new(iv, &sealed)?.encode()?;
        let timestamp = self
            .config
            .first_timestamp
            .wrapping_add(duration_to_ticks(elapsed, self.clock_rate) as u32);

        let packets = match self.class {
            StreamClass::Audio => {
                let (audio_iv, payload) =
                    AudioIv::split(&encoded).ok_or(PayloadError::TooShort(encoded.len()))?;
                let extensions = vec![write_extension(AUDIO_EXT_ID_IV, audio_iv.0.to_vec())];
                vec![self.write(false, timestamp, extensions, payload)]
            }
            StreamClass::Video | StreamClass::ScreenShare => {
                let fragments = packetize(&encoded, self.config.mtu);
                let count = fragments.len();
                let mut packets = Vec::with_capacity(count);
                for (index, fragment) in fragments.iter().enumerate() {
                    let is_last = index + 1 == count;
                    let frame_info = FrameInfo {
                        version: FRAME_INFO_VERSION,
                        start: index == 0,
                        end: is_last,
                        current_frame: self.current_frame.wrapping_add(1),
                        previous_frame: self.current_frame,
                        base_frame: self.base_frame,
                        ..Default::default()
                    }
                    .encode()?;
                    let extensions = self.video_extensions(frame_info);
                    packets.push(self.write(is_last, timestamp, extensions, fragment));
                }
                self.current_frame = self.current_frame.wrapping_add(1);
                packets
            }
        };
        trace!(
            "encoded {} byte sample for ssrc {} into {} packets",
            sample.len(),
            self.ssrc,
            packets.len()
        );
        Ok(packets)
    }

    fn next_iv(&mut self) -> Iv {
        let mut iv = [0u8; IV_LEN];
        iv[..2].copy_from_slice(&self.message_counter.to_be_bytes());
        self.message_counter = self.message_counter.wrapping_add(1);
        iv
    }

    fn video_extensions(&self, frame_info: [u8; 8]) -> Vec<impl tunnel_common::Writer> {
        match self.class {
            StreamClass::ScreenShare => {
                let resolution = Resolution {
                    width: self.config.width,
                    height: self.config.height,
                };
                vec![
                    write_extension(SCREEN_SHARE_EXT_ID_STREAM_ID, SCREEN_SHARE_STREAM_ID.to_vec()),
                    write_extension(SCREEN_SHARE_EXT_ID_RESOLUTION, resolution.encode().to_vec()),
                    write_extension(SCREEN_SHARE_EXT_ID_FRAME_INFO, frame_info.to_vec()),
                ]
            }
            _ => vec![write_extension(VIDEO_EXT_ID_FRAME_INFO, frame_info.to_vec())],
        }
    }

    fn write(
        &mut self,
        marker: bool,
        timestamp: TruncatedTimestamp,
        extensions: impl tunnel_common::Writer,
        payload: &[u8],
    ) -> Vec<u8> {
        let seqnum = self.next_seqnum;
        self.next_seqnum = self.next_seqnum.wrapping_add(1);
        rtp::write_packet(
            marker,
            self.class.payload_type(),
            seqnum,
            timestamp,
            self.ssrc,
            extensions,
            payload,
        )
    }
}

fn duration_to_ticks(duration: Duration, clock_rate: u32) -> u64 {
    let rate = clock_rate as u64;
    duration.as_secs() * rate + (duration.subsec_nanos() as u64 * rate) / 1_000_000_000
}

#[cfg(test)]
mod test {
    use crate::{
        roster::{ParticipantRoster, RosterError},
        rtp::{Packet, StreamMetadata},
    };

    use super::*;

    const PARTICIPANT: u32 = 16778240;
    const SSRC: Ssrc = 16778242;

    fn roster() -> SharedRoster {
        let mut roster = ParticipantRoster::new();
        roster.set_shared_key(b"shared meeting key");
        roster.add_participant(PARTICIPANT, b"secret nonce").unwrap();
        roster.add_ssrc(PARTICIPANT, SSRC).unwrap();
        roster.into_shared()
    }

    #[test]
    fn unknown_ssrc() {
        let result = StreamEncoder::new(
            StreamClass::Video,
            12345,
            &roster(),
            EncoderConfig::default(),
        );
        assert_eq!(
            Some(EncodeError::CannotEncode {
                ssrc: 12345,
                source: KeyLookupError::Roster(RosterError::UnknownSsrc(12345))
            }),
            result.err()
        );
    }

    #[test]
    fn screen_share_packets() {
        let config = EncoderConfig {
            mtu: 100,
            width: 1024,
            height: 720,
            first_seqnum: 65535,
            ..Default::default()
        };
        let mut encoder =
            StreamEncoder::new(StreamClass::ScreenShare, SSRC, &roster(), config).unwrap();
        let packets = encoder.encode(&[7u8; 250], Duration::ZERO).unwrap();
        // 18 byte header + 250 + 16 byte tag in chunks of 98.
        assert_eq!(3, packets.len());

        let packets: Vec<Packet> = packets
            .iter()
            .map(|packet| Packet::parse(packet).unwrap())
            .collect();
        let seqnums: Vec<u16> = packets.iter().map(Packet::seqnum).collect();
        assert_eq!(vec![65535, 0, 1], seqnums);
        let markers: Vec<bool> = packets.iter().map(Packet::marker).collect();
        assert_eq!(vec![false, false, true], markers);
        for packet in &packets {
            assert_eq!(99, packet.payload_type());
            assert_eq!(SSRC, packet.ssrc());
            assert_eq!(2746202358, packet.timestamp());
            assert!(packet.payload().len() <= 100);
        }

        let first = StreamMetadata::decode(StreamClass::ScreenShare, packets[0].extensions())
            .unwrap();
        assert_eq!(Some(vec![0x01]), first.stream_id);
        assert_eq!(
            Some(Resolution {
                width: 1024,
                height: 720
            }),
            first.resolution
        );
        let frame_info = first.frame_info.unwrap();
        assert!(frame_info.start);
        assert!(!frame_info.end);
        assert_eq!(1, frame_info.current_frame);
        assert_eq!(0, frame_info.previous_frame);

        let last =
            StreamMetadata::decode(StreamClass::ScreenShare, packets[2].extensions()).unwrap();
        assert!(last.frame_info.unwrap().end);
    }

    #[test]
    fn timestamps_and_counters_advance() {
        let mut encoder = StreamEncoder::new(
            StreamClass::Video,
            SSRC,
            &roster(),
            EncoderConfig {
                first_timestamp: u32::MAX,
                ..Default::default()
            },
        )
        .unwrap();
        encoder.encode(b"first", Duration::ZERO).unwrap();
        let packets = encoder
            .encode(b"second", Duration::from_millis(100))
            .unwrap();
        assert_eq!(1, packets.len());
        let packet = Packet::parse(&packets[0]).unwrap();
        assert_eq!(98, packet.payload_type());
        assert_eq!(1, packet.seqnum());
        assert!(packet.marker());
        // 100ms at 90kHz, wrapped.
        assert_eq!(8999, packet.timestamp());

        let metadata = StreamMetadata::decode(StreamClass::Video, packet.extensions()).unwrap();
        let frame_info = metadata.frame_info.unwrap();
        assert_eq!(2, frame_info.current_frame);
        assert_eq!(1, frame_info.previous_frame);
        assert!(frame_info.start && frame_info.end);
    }

    #[test]
    fn audio_moves_header_into_extension() {
        let mut encoder =
            StreamEncoder::new(StreamClass::Audio, SSRC, &roster(), EncoderConfig::default())
                .unwrap();
        encoder.encode(b"opus", Duration::ZERO).unwrap();
        let packets = encoder.encode(b"opus", Duration::from_millis(20)).unwrap();
        assert_eq!(1, packets.len());
        let packet = Packet::parse(&packets[0]).unwrap();
        assert_eq!(112, packet.payload_type());
        assert!(!packet.marker());
        assert_eq!(2746202358 + 960, packet.timestamp());

        let metadata = StreamMetadata::decode(StreamClass::Audio, packet.extensions()).unwrap();
        let audio_iv = metadata.audio_iv.unwrap();
        // Ciphertext length, IV length, then the start of the IV holding the
        // message counter.
        assert_eq!([0x00, 0x04, 0x0c, 0x00, 0x01, 0, 0, 0, 0], audio_iv.0);

        let encoded = audio_iv.splice(packet.payload());
        let payload = EncryptedPayload::decode(&encoded).unwrap();
        assert_eq!(4, payload.ciphertext.len());
        assert_eq!([0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], payload.iv);
    }

    #[test]
    fn ticks() {
        assert_eq!(0, duration_to_ticks(Duration::ZERO, 90_000));
        assert_eq!(90_000, duration_to_ticks(Duration::from_secs(1), 90_000));
        assert_eq!(960, duration_to_ticks(Duration::from_millis(20), 48_000));
        assert_eq!(
            135_000,
            duration_to_ticks(Duration::from_millis(1500), 90_000)
        );
    }
}
