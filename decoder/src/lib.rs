//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Decoding of per-participant encrypted RTP media carried over a
//! WebSocket tunnel.

pub mod config;
pub mod crypto;
pub mod decoder;
pub mod encoder;
pub mod roster;
pub mod rtp;
pub mod stream_class;
pub mod transport;
