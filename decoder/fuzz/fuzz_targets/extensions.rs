//
// Copyright 2023 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

#![no_main]

use libfuzzer_sys::fuzz_target;
use tunnel_decoder::{
    rtp::{AudioIv, FrameInfo, Resolution, StreamMetadata},
    stream_class::StreamClass,
};

fuzz_target!(|input: (u8, &[u8])| {
    let (id, value) = input;
    FrameInfo::decode(value).ok();
    Resolution::decode(value).ok();
    AudioIv::decode(value).ok();
    for class in [StreamClass::Video, StreamClass::ScreenShare, StreamClass::Audio] {
        StreamMetadata::decode(class, [(id & 0x0F, value)]).ok();
    }
});
