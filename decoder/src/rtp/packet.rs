//
// Copyright 2024 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

use std::ops::Range;

use anyhow::anyhow;
use log::*;
use tunnel_common::{parse_u16, parse_u32, round_up_to_multiple_of, CheckedSplitAt, Writer};

use super::{types::*, VERSION};

pub const RTP_MIN_HEADER_LEN: usize = 12;
pub const RTP_PAYLOAD_TYPE_OFFSET: usize = 1;
const RTP_SEQNUM_RANGE: Range<usize> = 2..4;
const RTP_TIMESTAMP_RANGE: Range<usize> = 4..8;
const RTP_SSRC_RANGE: Range<usize> = 8..12;
const RTP_EXTENSIONS_HEADER_LEN: usize = 4;
const RTP_ONE_BYTE_EXTENSIONS_PROFILE: u16 = 0xBEDE;
const RTP_TWO_BYTE_EXTENSIONS_PROFILE: u16 = 0x1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderExtensionsProfile {
    /// https://www.rfc-editor.org/rfc/rfc8285#section-4.2
    OneByte,
    /// https://www.rfc-editor.org/rfc/rfc8285#section-4.3
    TwoByte,
}

impl TryFrom<u16> for HeaderExtensionsProfile {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value == RTP_ONE_BYTE_EXTENSIONS_PROFILE {
            Ok(Self::OneByte)
        } else if value & 0xFFF0 == RTP_TWO_BYTE_EXTENSIONS_PROFILE {
            Ok(Self::TwoByte)
        } else {
            Err(anyhow!(
                "not using 1-byte or 2-byte extensions; profile = 0x{:x}",
                value
            ))
        }
    }
}

impl HeaderExtensionsProfile {
    fn len(&self) -> usize {
        match self {
            HeaderExtensionsProfile::OneByte => 1,
            HeaderExtensionsProfile::TwoByte => 2,
        }
    }
}

/// Where one header extension's value lives in the serialized packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionRange {
    pub id: u8,
    pub range: Range<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub marker: bool,
    pub has_padding: bool,
    pub payload_type: PayloadType,
    pub seqnum: TruncatedSequenceNumber,
    pub timestamp: TruncatedTimestamp,
    pub ssrc: Ssrc,
    pub extensions: Vec<ExtensionRange>,
    // The payload start is the same as the header len.
    // The end excludes any padding.
    pub payload_range: Range<usize>,
}

impl Header {
    pub fn parse(packet: &[u8]) -> Option<Self> {
        let (main_header, csrcs_extensions_payload) =
            packet.checked_split_at(RTP_MIN_HEADER_LEN)?;

        if (main_header[0] >> 6) != VERSION {
            debug!("Invalid RTP: version {}", main_header[0] >> 6);
            return None;
        }
        let has_padding = (main_header[0] & 0b0010_0000) > 0;
        let has_extensions = ((main_header[0] & 0b0001_0000) >> 4) > 0;
        let csrc_count = main_header[0] & 0b0000_1111;
        let payload_type = main_header[RTP_PAYLOAD_TYPE_OFFSET] & 0b01111111;
        let marker = ((main_header[RTP_PAYLOAD_TYPE_OFFSET] & 0b1000_0000) >> 7) != 0;
        let seqnum = parse_u16(&main_header[RTP_SEQNUM_RANGE.clone()]);
        let timestamp = parse_u32(&main_header[RTP_TIMESTAMP_RANGE.clone()]);
        let ssrc = parse_u32(&main_header[RTP_SSRC_RANGE.clone()]);

        let csrcs_len = 4 * csrc_count as usize;
        let (_csrcs, extensions_payload) = csrcs_extensions_payload.checked_split_at(csrcs_len)?;

        let mut extensions = Vec::new();
        let extensions_start = RTP_MIN_HEADER_LEN + csrcs_len;
        let mut payload_start = extensions_start;
        if has_extensions {
            let (extensions_header, extensions_payload) =
                extensions_payload.checked_split_at(RTP_EXTENSIONS_HEADER_LEN)?;
            let extensions_profile = parse_u16(&extensions_header[0..2]);
            let extensions_len = (parse_u16(&extensions_header[2..4]) as usize) * 4;

            let extensions_profile = match HeaderExtensionsProfile::try_from(extensions_profile) {
                Ok(extensions_profile) => extensions_profile,
                Err(err) => {
                    debug!("Invalid RTP: {err}");
                    debug!("{}", hex::encode(&packet[..packet.len().min(100)]));
                    return None;
                }
            };

            let (extensions_bytes, _payload) =
                extensions_payload.checked_split_at(extensions_len)?;

            // extension_start is relative to extensions_bytes
            let mut extension_start = 0;
            while extensions_bytes.len() > extension_start {
                if extensions_bytes[extension_start] == 0 {
                    // Padding between or after extensions.
                    extension_start += 1;
                    continue;
                }
                let (extension_header, extension_val) = extensions_bytes[extension_start..]
                    .checked_split_at(extensions_profile.len())?;
                let extension_id = match extensions_profile {
                    HeaderExtensionsProfile::OneByte => extension_header[0] >> 4,
                    HeaderExtensionsProfile::TwoByte => extension_header[0],
                };
                if extensions_profile == HeaderExtensionsProfile::OneByte && extension_id == 15 {
                    // Reserved; stop parsing.
                    break;
                }
                let extension_len = match extensions_profile {
                    HeaderExtensionsProfile::OneByte => ((extension_header[0] & 0x0F) as usize) + 1,
                    HeaderExtensionsProfile::TwoByte => extension_header[1] as usize,
                };
                if extension_val.len() < extension_len {
                    debug!(
                        "Invalid RTP: extension too short: {} < {}.  ID = {}",
                        extension_val.len(),
                        extension_len,
                        extension_id,
                    );
                    debug!("{}", hex::encode(&packet[..packet.len().min(100)]));
                    return None;
                }
                let extension_val_start = extensions_start
                    + RTP_EXTENSIONS_HEADER_LEN
                    + extension_start
                    + extensions_profile.len();
                extensions.push(ExtensionRange {
                    id: extension_id,
                    range: extension_val_start..(extension_val_start + extension_len),
                });
                extension_start += extensions_profile.len() + extension_len;
            }
            payload_start = extensions_start + RTP_EXTENSIONS_HEADER_LEN + extensions_len;
        }

        let mut payload_end = packet.len();
        if has_padding {
            let padding_len = match packet[payload_start..].last() {
                Some(&padding_len) if padding_len > 0 => padding_len as usize,
                _ => {
                    debug!(
                        "Invalid RTP: has padding, but padding byte count is missing; packet len = {}",
                        packet.len()
                    );
                    return None;
                }
            };
            if padding_len > payload_end - payload_start {
                debug!(
                    "Invalid RTP: padding of {} bytes longer than payload of {} bytes",
                    padding_len,
                    payload_end - payload_start
                );
                return None;
            }
            payload_end -= padding_len;
        }

        Some(Self {
            marker,
            has_padding,
            payload_type,
            seqnum,
            timestamp,
            ssrc,
            extensions,
            payload_range: payload_start..payload_end,
        })
    }
}

/// A parsed RTP packet that owns its serialized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    header: Header,
    serialized: Vec<u8>,
}

impl Packet {
    pub fn parse(serialized: &[u8]) -> Option<Self> {
        let header = Header::parse(serialized)?;
        Some(Self {
            header,
            serialized: serialized.to_vec(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn marker(&self) -> bool {
        self.header.marker
    }

    pub fn payload_type(&self) -> PayloadType {
        self.header.payload_type
    }

    pub fn seqnum(&self) -> TruncatedSequenceNumber {
        self.header.seqnum
    }

    pub fn timestamp(&self) -> TruncatedTimestamp {
        self.header.timestamp
    }

    pub fn ssrc(&self) -> Ssrc {
        self.header.ssrc
    }

    pub fn payload(&self) -> &[u8] {
        &self.serialized[self.header.payload_range.clone()]
    }

    /// In the order they appear in the header.
    pub fn extensions(&self) -> impl Iterator<Item = (u8, &[u8])> + '_ {
        self.header
            .extensions
            .iter()
            .map(|extension| (extension.id, &self.serialized[extension.range.clone()]))
    }

    pub fn extension(&self, id: u8) -> Option<&[u8]> {
        self.extensions()
            .find(|(extension_id, _)| *extension_id == id)
            .map(|(_, value)| value)
    }
}

/// Encodes a one-byte RTP extension.
pub fn write_extension(id: u8, value: impl Writer) -> impl Writer {
    assert!(id & 0xF == id, "id must fit in 4 bits");
    let length = value.written_len();
    assert!(
        length > 0,
        "one-byte extensions do not support empty values"
    );
    assert!(length <= 16, "length must fit in 4 bits");
    let header = (id << 4) | (length as u8 - 1);
    ([header], value)
}

/// Encodes a two-byte RTP extension.
pub fn write_two_byte_extension(id: u8, value: impl Writer) -> impl Writer {
    assert_ne!(id, 0, "id must not be 0");
    let length = value.written_len();
    assert!(length <= u8::MAX as usize, "length must fit in 8 bits");
    ([id, length as u8], value)
}

/// Writes a valid RTP packet using one-byte header extensions.
///
/// The packet will not have padding, and the CSRC count will be zero.
pub fn write_packet(
    marker: bool,
    pt: PayloadType,
    seqnum: TruncatedSequenceNumber,
    timestamp: TruncatedTimestamp,
    ssrc: Ssrc,
    extensions: impl Writer,
    payload: &[u8],
) -> Vec<u8> {
    write_packet_with_profile(
        marker,
        pt,
        seqnum,
        timestamp,
        ssrc,
        extensions,
        HeaderExtensionsProfile::OneByte,
        payload,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn write_packet_with_profile(
    marker: bool,
    pt: PayloadType,
    seqnum: TruncatedSequenceNumber,
    timestamp: TruncatedTimestamp,
    ssrc: Ssrc,
    extensions: impl Writer,
    extensions_profile: HeaderExtensionsProfile,
    payload: &[u8],
) -> Vec<u8> {
    let has_padding = 0u8;
    let extensions_len = extensions.written_len();
    let has_extensions = extensions_len != 0;
    let csrc_count = 0u8;
    let header = (
        [(VERSION << 6)
            | (has_padding << 5)
            | ((has_extensions as u8) << 4)
            | (csrc_count & 0b1111)],
        [((marker as u8) << 7) | (pt & 0b1111111)],
        seqnum,
        timestamp,
        ssrc,
    );
    let extensions = if has_extensions {
        let profile = match extensions_profile {
            HeaderExtensionsProfile::OneByte => RTP_ONE_BYTE_EXTENSIONS_PROFILE,
            HeaderExtensionsProfile::TwoByte => RTP_TWO_BYTE_EXTENSIONS_PROFILE,
        };
        let padded_len = round_up_to_multiple_of::<4>(extensions_len);
        let padding_len = padded_len - extensions_len;
        let extension_padding = &[0u8, 0, 0][..padding_len];
        Some((
            profile,
            u16::try_from(padded_len / 4).expect("too many extensions"),
            extensions,
            extension_padding,
        ))
    } else {
        None
    };

    let mut serialized = (header, extensions).to_vec();
    serialized.extend_from_slice(payload);
    serialized
}
