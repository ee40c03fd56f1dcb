//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

#![no_main]

use libfuzzer_sys::fuzz_target;
use tunnel_decoder::rtp::{EncryptedPayload, PAYLOAD_HEADER_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = EncryptedPayload::decode(data) {
        let encoded = payload.encode().unwrap();
        // Everything but the reserved byte survives.
        assert_eq!(data.len(), encoded.len());
        assert_eq!(data[..PAYLOAD_HEADER_LEN - 1], encoded[..PAYLOAD_HEADER_LEN - 1]);
        assert_eq!(data[PAYLOAD_HEADER_LEN..], encoded[PAYLOAD_HEADER_LEN..]);
    }
});
