//
// Copyright 2022 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Turns the encrypted RTP packets of one stream class back into samples.
//!
//! Each SSRC gets its own state the first time one of its packets arrives:
//! a cipher keyed through the roster, a depacketizer for the stream class
//! and a reorder buffer. Packets go into the reorder buffer in sequence
//! number order; complete units come out, get reassembled, decoded and
//! decrypted.

use std::{
    collections::{hash_map::Entry, HashMap},
    time::Duration,
};

use log::*;
use strum_macros::Display;
use thiserror::Error;

use crate::{
    crypto::{CryptoError, StreamCipher},
    roster::{KeyLookupError, SharedRoster},
    rtp::{
        expand_seqnum, expand_timestamp, is_partition_head, is_partition_tail, EncryptedPayload,
        ExtensionError, FragmentError, FragmentReassembler, FrameInfo, FullSequenceNumber,
        FullTimestamp, Packet, PayloadError, PayloadType, ReorderBuffer, Resolution, Ssrc,
        StreamMetadata, TruncatedTimestamp, AUDIO_EXT_ID_IV, AUDIO_IV_LEN,
    },
    stream_class::{StreamClass, AUXILIARY_PAYLOAD_TYPE},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ErrorKind {
    ProtocolFraming,
    Cryptographic,
    RosterLookup,
    UnexpectedPayloadType,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid RTP packet of {0} bytes")]
    InvalidRtp(usize),
    #[error("unexpected payload type {payload_type} in {class} stream")]
    UnexpectedPayloadType {
        payload_type: PayloadType,
        class: StreamClass,
    },
    #[error("cannot decode packets of ssrc {ssrc}: {source}")]
    CannotDecodePacket { ssrc: Ssrc, source: KeyLookupError },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRtp(_) | Self::Payload(_) | Self::Fragment(_) | Self::Extension(_) => {
                ErrorKind::ProtocolFraming
            }
            Self::UnexpectedPayloadType { .. } => ErrorKind::UnexpectedPayloadType,
            Self::CannotDecodePacket {
                source: KeyLookupError::Roster(_),
                ..
            } => ErrorKind::RosterLookup,
            Self::CannotDecodePacket {
                source: KeyLookupError::Crypto(_),
                ..
            }
            | Self::Crypto(_) => ErrorKind::Cryptographic,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    /// How many packets may arrive after a missing one before it's given up.
    pub max_late: u16,
    /// Defaults to the clock rate of the stream class.
    pub clock_rate: Option<u32>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_late: 400,
            clock_rate: None,
        }
    }
}

/// One decrypted unit of an elementary stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub ssrc: Ssrc,
    pub data: Vec<u8>,
    /// The RTP timestamp of the first packet, as sent.
    pub timestamp: TruncatedTimestamp,
    /// Since the previous sample of this SSRC.
    pub duration: Duration,
    /// Since the first sample of this SSRC.
    pub elapsed: Duration,
    /// Sequence numbers expanded past rollover. The first packet of an SSRC
    /// is expanded into the second cycle (1 << 16 onwards) so packets sent
    /// just before it still sort below it.
    pub first_seqnum: FullSequenceNumber,
    pub last_seqnum: FullSequenceNumber,
    pub frame_info: Option<FrameInfo>,
    pub resolution: Option<Resolution>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub packets: u64,
    /// Auxiliary packets skipped without decoding.
    pub skipped: u64,
    pub late: u64,
    pub orphaned: u64,
    pub lost: u64,
    pub samples: u64,
    pub failed: u64,
}

/// A packet waiting in the reorder buffer.
struct Pending {
    timestamp: FullTimestamp,
    payload: Vec<u8>,
    metadata: StreamMetadata,
}

enum Depacketizer {
    Fragmented(FragmentReassembler),
    Whole,
}

impl Depacketizer {
    fn for_class(class: StreamClass) -> Self {
        if class.is_fragmented() {
            Self::Fragmented(FragmentReassembler::new())
        } else {
            Self::Whole
        }
    }

    fn is_head(&self, payload: &[u8]) -> bool {
        match self {
            Self::Fragmented(_) => is_partition_head(payload),
            Self::Whole => true,
        }
    }

    fn is_tail(&self, marker: bool, payload: &[u8]) -> bool {
        match self {
            Self::Fragmented(_) => is_partition_tail(marker, payload),
            Self::Whole => true,
        }
    }

    fn reassemble<'a>(
        &mut self,
        payloads: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<Vec<u8>, FragmentError> {
        match self {
            Self::Fragmented(reassembler) => {
                reassembler.reset();
                let mut unit = None;
                for payload in payloads {
                    unit = reassembler.push(payload)?;
                }
                // Units handed out by the reorder buffer end in a tail.
                unit.ok_or(FragmentError::UnexpectedContinuation)
            }
            Self::Whole => Ok(payloads.into_iter().flatten().copied().collect()),
        }
    }
}

#[derive(Clone, Copy)]
struct SampleClock {
    first: FullTimestamp,
    previous: FullTimestamp,
}

/// Exists once the key for the SSRC is known. Until the first sample comes
/// out the clock is unset; after that it's decoding.
struct SsrcState {
    cipher: StreamCipher,
    clock: Option<SampleClock>,
    depacketizer: Depacketizer,
    reorder: ReorderBuffer<Pending>,
    max_seqnum: Option<FullSequenceNumber>,
    max_timestamp: Option<FullTimestamp>,
}

impl SsrcState {
    fn new(class: StreamClass, max_late: u16, cipher: StreamCipher) -> Self {
        Self {
            cipher,
            clock: None,
            depacketizer: Depacketizer::for_class(class),
            reorder: ReorderBuffer::new(max_late),
            max_seqnum: None,
            max_timestamp: None,
        }
    }

    fn push(&mut self, packet: &Packet, metadata: StreamMetadata) {
        // Start one cycle in to leave room for packets sent before the first.
        let max_seqnum = self
            .max_seqnum
            .get_or_insert((1 << 16) | packet.seqnum() as u64);
        let seqnum = expand_seqnum(packet.seqnum(), max_seqnum);
        let max_timestamp = self
            .max_timestamp
            .get_or_insert((1 << 32) | packet.timestamp() as u64);
        let timestamp = expand_timestamp(packet.timestamp(), max_timestamp);
        let payload = match &metadata.audio_iv {
            Some(audio_iv) => audio_iv.splice(packet.payload()),
            None => packet.payload().to_vec(),
        };
        let is_head = self.depacketizer.is_head(&payload);
        let is_tail = self.depacketizer.is_tail(packet.marker(), &payload);
        self.reorder.push(
            seqnum,
            is_head,
            is_tail,
            Pending {
                timestamp,
                payload,
                metadata,
            },
        );
    }

    fn finish(
        &mut self,
        ssrc: Ssrc,
        unit: Vec<(FullSequenceNumber, Pending)>,
        clock_rate: u32,
    ) -> Result<Sample, DecodeError> {
        let (first_seqnum, first) = unit.first().ok_or(FragmentError::TooShort(0))?;
        let first_seqnum = *first_seqnum;
        let timestamp = first.timestamp;
        let last_seqnum = unit.last().map_or(first_seqnum, |(seqnum, _)| *seqnum);
        let frame_info = unit
            .iter()
            .find_map(|(_, pending)| pending.metadata.frame_info);
        let resolution = unit
            .iter()
            .find_map(|(_, pending)| pending.metadata.resolution);

        let encoded = self
            .depacketizer
            .reassemble(unit.iter().map(|(_, pending)| &pending.payload[..]))?;
        let payload = EncryptedPayload::decode(&encoded)?;
        let data = payload.decrypt(&self.cipher)?;

        let (duration, elapsed) = self.advance_clock(timestamp, clock_rate);
        Ok(Sample {
            ssrc,
            data,
            timestamp: timestamp as TruncatedTimestamp,
            duration,
            elapsed,
            first_seqnum,
            last_seqnum,
            frame_info,
            resolution,
        })
    }

    /// Returns the (duration, elapsed) of a sample with the given timestamp.
    fn advance_clock(&mut self, timestamp: FullTimestamp, clock_rate: u32) -> (Duration, Duration) {
        let Some(clock) = self.clock else {
            self.clock = Some(SampleClock {
                first: timestamp,
                previous: timestamp,
            });
            return (Duration::ZERO, Duration::ZERO);
        };
        self.clock = Some(SampleClock {
            first: clock.first,
            previous: timestamp.max(clock.previous),
        });
        (
            ticks_to_duration(timestamp.saturating_sub(clock.previous), clock_rate),
            ticks_to_duration(timestamp.saturating_sub(clock.first), clock_rate),
        )
    }
}

fn ticks_to_duration(ticks: u64, clock_rate: u32) -> Duration {
    let rate = clock_rate as u64;
    Duration::from_secs(ticks / rate) + Duration::from_nanos((ticks % rate) * 1_000_000_000 / rate)
}

/// Decodes every SSRC of one stream class.
pub struct StreamDecoder {
    class: StreamClass,
    roster: SharedRoster,
    config: DecoderConfig,
    clock_rate: u32,
    ssrcs: HashMap<Ssrc, SsrcState>,
    stats: DecoderStats,
}

impl StreamDecoder {
    pub fn new(class: StreamClass, roster: SharedRoster, config: DecoderConfig) -> Self {
        let clock_rate = config
            .clock_rate
            .filter(|rate| *rate > 0)
            .unwrap_or_else(|| class.clock_rate());
        Self {
            class,
            roster,
            config,
            clock_rate,
            ssrcs: HashMap::new(),
            stats: DecoderStats::default(),
        }
    }

    pub fn class(&self) -> StreamClass {
        self.class
    }

    /// Takes one RTP packet and returns at most one sample. The sample may
    /// come from earlier packets, since packets are reordered first.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Option<Sample>, DecodeError> {
        let packet = Packet::parse(packet).ok_or(DecodeError::InvalidRtp(packet.len()))?;
        self.stats.packets += 1;
        trace!(
            "rtp header [M={}] [PT={}] [SN={}] [TS={}] [ssrc={}] payload {} bytes",
            packet.marker(),
            packet.payload_type(),
            packet.seqnum(),
            packet.timestamp(),
            packet.ssrc(),
            packet.payload().len()
        );

        let payload_type = packet.payload_type();
        if payload_type == AUXILIARY_PAYLOAD_TYPE {
            debug!(
                "skipping auxiliary packet {} of ssrc {}",
                packet.seqnum(),
                packet.ssrc()
            );
            self.stats.skipped += 1;
            return Ok(None);
        }
        if !self.class.accepts_payload_type(payload_type) {
            return Err(DecodeError::UnexpectedPayloadType {
                payload_type,
                class: self.class,
            });
        }

        let metadata = StreamMetadata::decode(self.class, packet.extensions())?;
        if self.class == StreamClass::Audio && metadata.audio_iv.is_none() {
            return Err(ExtensionError::InvalidLength {
                id: AUDIO_EXT_ID_IV,
                expected: AUDIO_IV_LEN,
                actual: 0,
            }
            .into());
        }

        let ssrc = packet.ssrc();
        let class = self.class;
        let state = match self.ssrcs.entry(ssrc) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                // Nothing is kept for an SSRC until its key resolves.
                let key = match self.roster.read().stream_key(ssrc, class) {
                    Ok(key) => key,
                    Err(source) => {
                        let err = DecodeError::CannotDecodePacket { ssrc, source };
                        debug!("dropping packet {}: {}", packet.seqnum(), err);
                        return Err(err);
                    }
                };
                info!("decoding {} stream of ssrc {}", class, ssrc);
                entry.insert(SsrcState::new(
                    class,
                    self.config.max_late,
                    StreamCipher::new(&key),
                ))
            }
        };
        state.push(&packet, metadata);

        let Some(unit) = state.reorder.pop() else {
            return Ok(None);
        };
        let result = state.finish(ssrc, unit, self.clock_rate);
        self.record(ssrc, result).map(Some)
    }

    /// Hands out every remaining sample, giving up on missing packets. Call
    /// once no more packets will arrive.
    pub fn flush(&mut self) -> Vec<Result<Sample, DecodeError>> {
        let clock_rate = self.clock_rate;
        let mut ssrcs: Vec<Ssrc> = self.ssrcs.keys().copied().collect();
        ssrcs.sort_unstable();

        let mut results = Vec::new();
        for ssrc in ssrcs {
            if let Some(state) = self.ssrcs.get_mut(&ssrc) {
                while let Some(unit) = state.reorder.drain_next() {
                    results.push((ssrc, state.finish(ssrc, unit, clock_rate)));
                }
            }
        }
        results
            .into_iter()
            .map(|(ssrc, result)| self.record(ssrc, result))
            .collect()
    }

    pub fn stats(&self) -> DecoderStats {
        let mut stats = self.stats;
        for state in self.ssrcs.values() {
            let reorder = state.reorder.stats();
            stats.late += reorder.late;
            stats.orphaned += reorder.orphaned;
            stats.lost += reorder.lost;
        }
        stats
    }

    fn record(
        &mut self,
        ssrc: Ssrc,
        result: Result<Sample, DecodeError>,
    ) -> Result<Sample, DecodeError> {
        match &result {
            Ok(sample) => {
                self.stats.samples += 1;
                trace!(
                    "sample of ssrc {} from packets {}..={} at {}: {} bytes",
                    ssrc,
                    sample.first_seqnum,
                    sample.last_seqnum,
                    sample.timestamp,
                    sample.data.len()
                );
            }
            Err(err) => {
                self.stats.failed += 1;
                warn!("dropping sample of ssrc {}: {}", ssrc, err);
            }
        }
        result
    }
}

#[cfg(test)]
mod test {
    use rand::{seq::SliceRandom, thread_rng};

    use super::*;
    use crate::{
        encoder::{EncoderConfig, StreamEncoder},
        roster::{ParticipantRoster, RosterError},
        rtp::write_packet,
    };

    const SHARED_KEY: &[u8] = b"shared meeting key";
    const ALICE: u32 = 16778240;
    const ALICE_SSRC: Ssrc = 16778242;
    const BOB: u32 = 16779264;
    const BOB_SSRC: Ssrc = 16779265;

    fn roster() -> SharedRoster {
        let mut roster = ParticipantRoster::new();
        roster.set_shared_key(SHARED_KEY);
        roster.add_participant(ALICE, b"alice nonce").unwrap();
        roster.add_ssrc(ALICE, ALICE_SSRC).unwrap();
        roster.add_participant(BOB, b"bob nonce").unwrap();
        roster.add_ssrc(BOB, BOB_SSRC).unwrap();
        roster.into_shared()
    }

    fn samples(count: usize, len: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|index| (0..len + index).map(|byte| (byte + index) as u8).collect())
            .collect()
    }

    fn frame_interval(index: usize) -> Duration {
        Duration::from_millis(33 * index as u64)
    }

    fn encode_all(
        class: StreamClass,
        ssrc: Ssrc,
        samples: &[Vec<u8>],
        config: EncoderConfig,
    ) -> Vec<Vec<u8>> {
        let mut encoder = StreamEncoder::new(class, ssrc, &roster(), config).unwrap();
        samples
            .iter()
            .enumerate()
            .flat_map(|(index, sample)| encoder.encode(sample, frame_interval(index)).unwrap())
            .collect()
    }

    fn decode_all(
        decoder: &mut StreamDecoder,
        packets: &[Vec<u8>],
    ) -> Vec<Result<Sample, DecodeError>> {
        let mut results: Vec<_> = packets
            .iter()
            .filter_map(|packet| decoder.decode(packet).transpose())
            .collect();
        results.extend(decoder.flush());
        results
    }

    fn data(results: Vec<Result<Sample, DecodeError>>) -> Vec<Vec<u8>> {
        results
            .into_iter()
            .map(|result| result.unwrap().data)
            .collect()
    }

    fn small_mtu() -> EncoderConfig {
        EncoderConfig {
            mtu: 100,
            ..Default::default()
        }
    }

    #[test]
    fn video_in_order() {
        let samples = samples(10, 200);
        let packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples, small_mtu());
        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());

        // Each sample comes out with its last packet.
        let mut decoded = vec![];
        for packet in &packets {
            let marker = Packet::parse(packet).unwrap().marker();
            let sample = decoder.decode(packet).unwrap();
            assert_eq!(marker, sample.is_some());
            decoded.extend(sample);
        }
        assert!(decoder.flush().is_empty());

        assert_eq!(samples, decoded.iter().map(|s| s.data.clone()).collect::<Vec<_>>());
        assert_eq!(Duration::ZERO, decoded[0].elapsed);
        assert_eq!(Duration::from_millis(33), decoded[1].duration);
        assert_eq!(Duration::from_millis(33 * 9), decoded[9].elapsed);
        assert_eq!(decoded[0].last_seqnum + 1, decoded[1].first_seqnum);
        assert!(decoded[0].last_seqnum > decoded[0].first_seqnum);
        assert_eq!(ALICE_SSRC, decoded[0].ssrc);

        let stats = decoder.stats();
        assert_eq!(packets.len() as u64, stats.packets);
        assert_eq!(10, stats.samples);
        assert_eq!(0, stats.failed + stats.late + stats.orphaned + stats.lost);
    }

    #[test]
    fn video_reordered() {
        let samples = samples(20, 300);
        let mut packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples, small_mtu());
        // The first packet marks where the stream starts.
        packets[1..].shuffle(&mut thread_rng());

        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        assert_eq!(samples, data(decode_all(&mut decoder, &packets)));
    }

    #[test]
    fn screen_share_metadata() {
        let samples = samples(2, 50);
        let config = EncoderConfig {
            width: 1024,
            height: 720,
            ..Default::default()
        };
        let packets = encode_all(StreamClass::ScreenShare, ALICE_SSRC, &samples, config);
        let mut decoder =
            StreamDecoder::new(StreamClass::ScreenShare, roster(), DecoderConfig::default());
        let decoded: Vec<Sample> = decode_all(&mut decoder, &packets)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(2, decoded.len());
        assert_eq!(
            Some(Resolution {
                width: 1024,
                height: 720
            }),
            decoded[0].resolution
        );
        let frame_info = decoded[1].frame_info.unwrap();
        assert_eq!(2, frame_info.version);
        assert_eq!(2, frame_info.current_frame);
        assert_eq!(1, frame_info.previous_frame);
    }

    #[test]
    fn audio() {
        let samples = samples(5, 60);
        let mut encoder = StreamEncoder::new(
            StreamClass::Audio,
            BOB_SSRC,
            &roster(),
            EncoderConfig::default(),
        )
        .unwrap();
        let mut decoder = StreamDecoder::new(StreamClass::Audio, roster(), DecoderConfig::default());
        for (index, sample) in samples.iter().enumerate() {
            let packets = encoder
                .encode(sample, Duration::from_millis(20 * index as u64))
                .unwrap();
            assert_eq!(1, packets.len());
            let decoded = decoder.decode(&packets[0]).unwrap().unwrap();
            assert_eq!(sample, &decoded.data);
            assert_eq!(BOB_SSRC, decoded.ssrc);
            if index > 0 {
                assert_eq!(Duration::from_millis(20), decoded.duration);
            }
        }
    }

    #[test]
    fn two_ssrcs() {
        let alice_samples = samples(4, 150);
        let bob_samples = samples(4, 80);
        let alice = encode_all(StreamClass::Video, ALICE_SSRC, &alice_samples, small_mtu());
        let bob = encode_all(StreamClass::Video, BOB_SSRC, &bob_samples, small_mtu());
        let mut interleaved = vec![];
        for index in 0..alice.len().max(bob.len()) {
            interleaved.extend(alice.get(index).cloned());
            interleaved.extend(bob.get(index).cloned());
        }

        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        let decoded: Vec<Sample> = decode_all(&mut decoder, &interleaved)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let of = |ssrc: Ssrc| {
            decoded
                .iter()
                .filter(|sample| sample.ssrc == ssrc)
                .map(|sample| sample.data.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(alice_samples, of(ALICE_SSRC));
        assert_eq!(bob_samples, of(BOB_SSRC));
    }

    #[test]
    fn roster_failure_is_retriable() {
        let samples = samples(1, 10);
        let packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples, small_mtu());
        assert_eq!(1, packets.len());

        let mut roster = ParticipantRoster::new();
        roster.add_participant(ALICE, b"alice nonce").unwrap();
        let roster = roster.into_shared();
        let mut decoder =
            StreamDecoder::new(StreamClass::Video, roster.clone(), DecoderConfig::default());

        let err = decoder.decode(&packets[0]).unwrap_err();
        assert_eq!(
            DecodeError::CannotDecodePacket {
                ssrc: ALICE_SSRC,
                source: KeyLookupError::Roster(RosterError::KeyNotSet)
            },
            err
        );
        assert_eq!(ErrorKind::RosterLookup, err.kind());
        assert!(decoder.ssrcs.is_empty());

        // The ssrc was never added, but it's close enough to the participant id.
        roster.write().set_shared_key(SHARED_KEY);
        let sample = decoder.decode(&packets[0]).unwrap().unwrap();
        assert_eq!(samples[0], sample.data);
    }

    #[test]
    fn unknown_ssrc() {
        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        let packet = write_packet(true, 98, 1, 2, 5000, None::<[u8; 0]>, &[1, 2, 3]);
        let err = decoder.decode(&packet).unwrap_err();
        assert_eq!(
            DecodeError::CannotDecodePacket {
                ssrc: 5000,
                source: KeyLookupError::Roster(RosterError::UnknownSsrc(5000))
            },
            err
        );
    }

    #[test]
    fn unresolved_ssrcs_keep_no_state() {
        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        for ssrc in 5000..5100 {
            let packet = write_packet(true, 98, 1, 2, ssrc, None::<[u8; 0]>, &[1, 2, 3]);
            assert_eq!(ErrorKind::RosterLookup, decoder.decode(&packet).unwrap_err().kind());
        }
        assert!(decoder.ssrcs.is_empty());
        assert!(decoder.flush().is_empty());

        let packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples(1, 10), small_mtu());
        decoder.decode(&packets[0]).unwrap();
        assert_eq!(1, decoder.ssrcs.len());
    }

    #[test]
    fn audio_without_iv_extension_rejected() {
        let mut decoder = StreamDecoder::new(StreamClass::Audio, roster(), DecoderConfig::default());
        let packet = write_packet(true, 112, 1, 2, BOB_SSRC, None::<[u8; 0]>, &[0; 40]);
        let err = decoder.decode(&packet).unwrap_err();
        assert_eq!(
            DecodeError::Extension(ExtensionError::InvalidLength {
                id: AUDIO_EXT_ID_IV,
                expected: AUDIO_IV_LEN,
                actual: 0
            }),
            err
        );
        assert_eq!(ErrorKind::ProtocolFraming, err.kind());
        assert!(decoder.ssrcs.is_empty());
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn payload_types() {
        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        let auxiliary = write_packet(false, 110, 1, 2, ALICE_SSRC, None::<[u8; 0]>, &[0; 20]);
        assert_eq!(Ok(None), decoder.decode(&auxiliary));
        assert_eq!(1, decoder.stats().skipped);

        let audio = write_packet(false, 112, 1, 2, ALICE_SSRC, None::<[u8; 0]>, &[0; 20]);
        let err = decoder.decode(&audio).unwrap_err();
        assert_eq!(
            DecodeError::UnexpectedPayloadType {
                payload_type: 112,
                class: StreamClass::Video
            },
            err
        );
        assert_eq!(ErrorKind::UnexpectedPayloadType, err.kind());

        let err = decoder.decode(&[0x80, 98, 0]).unwrap_err();
        assert_eq!(DecodeError::InvalidRtp(3), err);
        assert_eq!(ErrorKind::ProtocolFraming, err.kind());
    }

    #[test]
    fn failed_sample_does_not_stop_decoding() {
        let samples = samples(3, 40);
        let mut packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples, EncoderConfig::default());
        assert_eq!(3, packets.len());
        // Last byte of the tag.
        if let Some(byte) = packets[1].last_mut() {
            *byte ^= 0x01;
        }

        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        let results = decode_all(&mut decoder, &packets);
        assert_eq!(3, results.len());
        assert_eq!(samples[0], results[0].as_ref().unwrap().data);
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(&DecodeError::Crypto(CryptoError::AuthenticationFailed), err);
        assert_eq!(ErrorKind::Cryptographic, err.kind());
        assert_eq!(samples[2], results[2].as_ref().unwrap().data);
        assert_eq!(1, decoder.stats().failed);
        assert_eq!(2, decoder.stats().samples);
    }

    #[test]
    fn late_packets_dropped() {
        let samples = samples(5, 40);
        let packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples, EncoderConfig::default());
        assert_eq!(5, packets.len());
        let config = DecoderConfig {
            max_late: 2,
            ..Default::default()
        };
        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), config);

        let mut decoded = vec![];
        for index in [0, 2, 3, 4, 1] {
            decoded.extend(decoder.decode(&packets[index]).unwrap());
        }
        decoded.extend(decoder.flush().into_iter().map(Result::unwrap));

        let expected = vec![
            samples[0].clone(),
            samples[2].clone(),
            samples[3].clone(),
            samples[4].clone(),
        ];
        assert_eq!(expected, decoded.into_iter().map(|s| s.data).collect::<Vec<_>>());
        let stats = decoder.stats();
        assert_eq!(1, stats.lost);
        assert_eq!(1, stats.late);
    }

    #[test]
    fn sequence_number_rollover() {
        let samples = samples(6, 200);
        let config = EncoderConfig {
            first_seqnum: 65530,
            first_timestamp: u32::MAX - 3000,
            ..small_mtu()
        };
        let packets = encode_all(StreamClass::Video, ALICE_SSRC, &samples, config);
        let mut decoder = StreamDecoder::new(StreamClass::Video, roster(), DecoderConfig::default());
        let decoded: Vec<Sample> = decode_all(&mut decoder, &packets)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(samples, decoded.iter().map(|s| s.data.clone()).collect::<Vec<_>>());
        assert_eq!(Duration::from_millis(33 * 5), decoded[5].elapsed);
        assert!(decoded[5].first_seqnum > decoded[0].last_seqnum);
        // Timestamps come out as they were sent, across the wrap.
        assert_eq!(u32::MAX - 3000, decoded[0].timestamp);
        assert_eq!((u32::MAX - 3000).wrapping_add(2970 * 5), decoded[5].timestamp);
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            ErrorKind::ProtocolFraming,
            DecodeError::Fragment(FragmentError::UnexpectedStartBit).kind()
        );
        assert_eq!(
            ErrorKind::ProtocolFraming,
            DecodeError::Payload(PayloadError::UnsupportedVersion(7)).kind()
        );
        assert_eq!(
            ErrorKind::Cryptographic,
            DecodeError::CannotDecodePacket {
                ssrc: 1,
                source: KeyLookupError::Crypto(CryptoError::MissingKeyMaterial)
            }
            .kind()
        );
    }

    #[test]
    fn clock_durations() {
        assert_eq!(Duration::ZERO, ticks_to_duration(0, 90_000));
        assert_eq!(Duration::from_millis(20), ticks_to_duration(960, 48_000));
        assert_eq!(Duration::from_millis(1500), ticks_to_duration(135_000, 90_000));
    }
}
