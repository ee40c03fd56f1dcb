//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

#![no_main]

use arbitrary::Unstructured;
use libfuzzer_sys::fuzz_target;
use tunnel_decoder::rtp::FragmentReassembler;

fuzz_target!(|data: &[u8]| {
    let mut gen = Unstructured::new(data);
    let mut reassembler = FragmentReassembler::new();

    // Consume all available entropy.
    while !gen.is_empty() {
        let Ok(payload) = gen.arbitrary::<&[u8]>() else {
            break;
        };
        if reassembler.push(payload).is_err() {
            reassembler.reset();
        }
    }
});
