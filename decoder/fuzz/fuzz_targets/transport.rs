//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

#![no_main]

use libfuzzer_sys::fuzz_target;
use tunnel_decoder::{rtp, transport};

fuzz_target!(|data: &[u8]| {
    if let Ok((_, packet)) = transport::strip_preamble(data) {
        if rtp::looks_like_rtp(packet) {
            let _ = rtp::Packet::parse(packet);
        }
    }
});
