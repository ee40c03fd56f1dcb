//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

#![no_main]

use arbitrary::Unstructured;
use hex_literal::hex;
use libfuzzer_sys::fuzz_target;
use tunnel_common::Empty;
use tunnel_decoder::{
    decoder::{DecoderConfig, StreamDecoder},
    roster::ParticipantRoster,
    rtp::write_packet,
    stream_class::StreamClass,
};

const SSRCS: [u32; 2] = [16778242, 16779265];

fn make_packet(gen: &mut Unstructured) -> Result<Vec<u8>, arbitrary::Error> {
    let marker = gen.arbitrary()?;
    let pt = *gen.choose(&[98u8, 99, 110, 112])?;
    // Keep sequence numbers close together so the reorder buffer gets exercised.
    let seqnum = gen.int_in_range(0..=64)?;
    let timestamp = gen.int_in_range(0..=90_000)?;
    let ssrc = *gen.choose(&SSRCS)?;
    let payload: &[u8] = gen.arbitrary()?;
    Ok(write_packet(marker, pt, seqnum, timestamp, ssrc, Empty {}, payload))
}

fuzz_target!(|data: &[u8]| {
    let mut gen = Unstructured::new(data);
    let classes = [StreamClass::Video, StreamClass::ScreenShare, StreamClass::Audio];
    let Ok(&class) = gen.choose(&classes) else {
        return;
    };

    let mut roster = ParticipantRoster::new();
    roster.set_shared_key(&hex!("00112233445566778899aabbccddeeff"));
    roster.add_participant(16778240, b"nonce").unwrap();
    roster.add_ssrc(16778240, SSRCS[0]).unwrap();
    let config = DecoderConfig {
        max_late: 16,
        ..Default::default()
    };
    let mut decoder = StreamDecoder::new(class, roster.into_shared(), config);

    // Consume all available entropy.
    while !gen.is_empty() {
        let Ok(packet) = make_packet(&mut gen) else {
            break;
        };
        let _ = decoder.decode(&packet);
    }
    let _ = decoder.flush();
});
