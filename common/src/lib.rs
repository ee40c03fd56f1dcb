//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Byte-level helpers shared by the tunnel media codecs.

mod bits;
mod collections;
mod serialize;
mod slice;

use std::io::Write;

pub use bits::*;
pub use collections::*;
pub use serialize::*;
pub use slice::*;

/// Panics if `bytes` is shorter than 2. Callers check lengths first.
pub fn parse_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes(bytes[0..2].try_into().unwrap())
}

/// Panics if `bytes` is shorter than 4. Callers check lengths first.
pub fn parse_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(bytes[0..4].try_into().unwrap())
}

pub fn round_up_to_multiple_of<const M: usize>(value: usize) -> usize {
    value.div_ceil(M) * M
}

/// Expands a counter that is truncated on the wire (such as a 16-bit RTP
/// sequence number) into a 64-bit counter, using the largest value seen so
/// far to decide whether the truncated value rolled over.
///
/// `max` is updated when the expanded value is the largest seen so far.
pub fn expand_truncated_counter<Truncated>(truncated: Truncated, max: &mut u64, bits: u8) -> u64
where
    Truncated: Into<u64>,
{
    let truncated: u64 = truncated.into();
    let width = 1u64 << bits;
    let mask = width - 1;
    let max_roc = *max >> bits;
    let max_truncated = *max & mask;

    let roc = if max_truncated > truncated && (max_truncated - truncated) > (width / 2) {
        // Rolled over going forward.
        max_roc + 1
    } else if truncated > max_truncated && (truncated - max_truncated) > (width / 2) {
        // From before the last rollover.
        max_roc.saturating_sub(1)
    } else {
        max_roc
    };

    let expanded = (roc << bits) | truncated;
    if expanded > *max {
        *max = expanded;
    }
    expanded
}

/// Log line format shared by every binary in the workspace.
pub fn format_log_line(
    buf: &mut env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "{} {:5} {}:{} {}",
        buf.timestamp_millis(),
        record.level(),
        record.target(),
        record.line().unwrap_or(0),
        record.args()
    )
}
