//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Configuration options for the tunnel decoder.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use base64::{
    alphabet,
    engine::{general_purpose, DecodePaddingMode, GeneralPurpose},
    Engine,
};
use clap;

use crate::{
    decoder::DecoderConfig,
    roster::{ParticipantId, ParticipantRoster},
    rtp::Ssrc,
    stream_class::StreamClass,
};

/// Key material arrives as URL-safe base64, with or without padding.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    general_purpose::NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// General configuration options, set by command line arguments.
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "tunnel_decoder")]
pub struct Config {
    /// Capture file with one hex-encoded tunnel message per line. Lines
    /// starting with '#' are ignored.
    #[clap(long)]
    pub input: PathBuf,

    /// File the decrypted samples are appended to.
    #[clap(long)]
    pub output: PathBuf,

    /// Which stream to decode: video, audio or screen-share.
    #[clap(long, default_value = "video")]
    pub stream_class: StreamClass,

    /// The shared meeting key, URL-safe base64.
    #[clap(long)]
    pub shared_key: String,

    /// A participant and their secret nonce as ID=NONCE, the nonce in
    /// URL-safe base64. May be repeated.
    #[clap(long = "participant", value_parser = parse_participant)]
    pub participants: Vec<ParticipantArg>,

    /// An SSRC sent by a participant as ID=SSRC. May be repeated.
    #[clap(long = "ssrc", value_parser = parse_ssrc)]
    pub ssrcs: Vec<SsrcArg>,

    /// How many packets may arrive after a missing one before it's given up.
    #[clap(long, default_value = "400")]
    pub max_late: u16,

    /// Overrides the RTP clock rate of the stream class.
    #[clap(long)]
    pub clock_rate: Option<u32>,

    /// Input lines are bare RTP packets rather than tunnel messages.
    #[clap(long)]
    pub already_stripped: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantArg {
    pub id: ParticipantId,
    pub secret_nonce: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SsrcArg {
    pub id: ParticipantId,
    pub ssrc: Ssrc,
}

pub fn decode_base64_url(value: &str) -> Result<Vec<u8>> {
    BASE64_URL
        .decode(value.trim())
        .with_context(|| format!("invalid base64: {:?}", value))
}

fn split_assignment(value: &str) -> Result<(&str, &str)> {
    value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected ID=VALUE but got {:?}", value))
}

fn parse_participant(value: &str) -> Result<ParticipantArg> {
    let (id, secret_nonce) = split_assignment(value)?;
    Ok(ParticipantArg {
        id: id.parse().context("invalid participant id")?,
        secret_nonce: decode_base64_url(secret_nonce)?,
    })
}

fn parse_ssrc(value: &str) -> Result<SsrcArg> {
    let (id, ssrc) = split_assignment(value)?;
    Ok(SsrcArg {
        id: id.parse().context("invalid participant id")?,
        ssrc: ssrc.parse().context("invalid ssrc")?,
    })
}

impl Config {
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            max_late: self.max_late,
            clock_rate: self.clock_rate,
        }
    }

    /// Builds the roster of the session the capture was taken from.
    pub fn roster(&self) -> Result<ParticipantRoster> {
        let mut roster = ParticipantRoster::new();
        roster.set_shared_key(&decode_base64_url(&self.shared_key).context("shared key")?);
        for participant in &self.participants {
            roster.add_participant(participant.id, &participant.secret_nonce)?;
        }
        for ssrc in &self.ssrcs {
            roster.add_ssrc(ssrc.id, ssrc.ssrc)?;
        }
        Ok(roster)
    }
}

#[cfg(test)]
pub(crate) fn default_test_config() -> Config {
    Config {
        input: PathBuf::from("capture.txt"),
        output: PathBuf::from("capture.h264"),
        stream_class: StreamClass::ScreenShare,
        shared_key: "c2hhcmVkIG1lZXRpbmcga2V5".to_string(),
        participants: vec![ParticipantArg {
            id: 16778240,
            secret_nonce: b"secret nonce".to_vec(),
        }],
        ssrcs: vec![SsrcArg {
            id: 16778240,
            ssrc: 16778242,
        }],
        max_late: 400,
        clock_rate: None,
        already_stripped: false,
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;
    use crate::roster::RosterError;

    #[test]
    fn parse_command_line() {
        let config = Config::try_parse_from([
            "tunnel_decoder",
            "--input",
            "in.txt",
            "--output",
            "out.opus",
            "--stream-class",
            "audio",
            "--shared-key",
            "c2hhcmVkIG1lZXRpbmcga2V5",
            "--participant",
            "16778240=c2VjcmV0IG5vbmNl",
            "--participant",
            "16779264=_-8",
            "--ssrc",
            "16778240=16778242",
            "--max-late",
            "50",
            "--already-stripped",
        ])
        .unwrap();
        assert_eq!(StreamClass::Audio, config.stream_class);
        assert_eq!(
            vec![
                ParticipantArg {
                    id: 16778240,
                    secret_nonce: b"secret nonce".to_vec()
                },
                ParticipantArg {
                    id: 16779264,
                    secret_nonce: vec![0xff, 0xef]
                }
            ],
            config.participants
        );
        assert_eq!(
            vec![SsrcArg {
                id: 16778240,
                ssrc: 16778242
            }],
            config.ssrcs
        );
        assert_eq!(50, config.max_late);
        assert!(config.already_stripped);
        assert_eq!(None, config.clock_rate);
    }

    #[test]
    fn defaults() {
        let config = Config::try_parse_from([
            "tunnel_decoder",
            "--input",
            "in.txt",
            "--output",
            "out.h264",
            "--shared-key",
            "AAAA",
        ])
        .unwrap();
        assert_eq!(StreamClass::Video, config.stream_class);
        assert_eq!(400, config.max_late);
        assert!(config.participants.is_empty());
        assert!(!config.already_stripped);
        assert_eq!(DecoderConfig::default(), config.decoder_config());
    }

    #[test]
    fn invalid_arguments() {
        let base = ["tunnel_decoder", "--input", "a", "--output", "b", "--shared-key", "AAAA"];
        for extra in [
            ["--participant", "16778240"],
            ["--participant", "abc=AAAA"],
            ["--participant", "1=not base64!"],
            ["--ssrc", "1=-5"],
            ["--stream-class", "data"],
        ] {
            let args = base.iter().chain(extra.iter()).copied();
            assert!(Config::try_parse_from(args).is_err(), "{:?}", extra);
        }
    }

    #[test]
    fn base64_padding_is_optional() {
        assert_eq!(b"ab".to_vec(), decode_base64_url("YWI").unwrap());
        assert_eq!(b"ab".to_vec(), decode_base64_url("YWI=").unwrap());
        assert!(decode_base64_url("YW+/").is_err());
    }

    #[test]
    fn roster_from_config() {
        let config = default_test_config();
        let roster = config.roster().unwrap();
        assert_eq!(b"shared meeting key", roster.shared_key().unwrap());
        assert_eq!(
            b"secret nonce",
            roster.lookup_nonce(16778242).unwrap()
        );

        let mut config = default_test_config();
        config.ssrcs[0].id = 5;
        let err = config.roster().err().unwrap();
        assert_eq!(
            Some(&RosterError::UnknownParticipant(5)),
            err.downcast_ref::<RosterError>()
        );
    }
}
