//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! RTP framing and the codecs layered under it: the encrypted payload,
//! fragment reassembly, header extension metadata and the reorder buffer.

use std::ops::RangeInclusive;

use tunnel_common::expand_truncated_counter;

mod extensions;
mod fragment;
mod jitter;
mod packet;
mod payload;
mod types;

pub use extensions::*;
pub use fragment::*;
pub use jitter::*;
pub use packet::*;
pub use payload::*;
pub use types::*;

pub const VERSION: u8 = 2;

// RTCP packet types 192..=223 with the marker bit masked off.
const RTCP_PAYLOAD_TYPES: RangeInclusive<u8> = 64..=95;
pub const RTCP_PAYLOAD_TYPE_OFFSET: usize = 1;

pub fn looks_like_rtp(packet: &[u8]) -> bool {
    packet.len() > RTP_PAYLOAD_TYPE_OFFSET
        && (packet[0] >> 6) == VERSION
        && !RTCP_PAYLOAD_TYPES.contains(&(packet[RTP_PAYLOAD_TYPE_OFFSET] & 0b01111111))
}

pub fn looks_like_rtcp(packet: &[u8]) -> bool {
    packet.len() > RTCP_PAYLOAD_TYPE_OFFSET
        && (packet[0] >> 6) == VERSION
        && RTCP_PAYLOAD_TYPES.contains(&(packet[RTCP_PAYLOAD_TYPE_OFFSET] & 0b01111111))
}

pub fn expand_seqnum(
    seqnum: TruncatedSequenceNumber,
    max_seqnum: &mut FullSequenceNumber,
) -> FullSequenceNumber {
    expand_truncated_counter(seqnum, max_seqnum, 16)
}

pub fn expand_timestamp(
    timestamp: TruncatedTimestamp,
    max_timestamp: &mut FullTimestamp,
) -> FullTimestamp {
    expand_truncated_counter(timestamp, max_timestamp, 32)
}
