//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

#[macro_use]
extern crate log;

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use once_cell::sync::Lazy;
use tunnel_decoder::{
    config,
    decoder::{DecodeError, DecoderStats, Sample, StreamDecoder},
    transport::{strip_preamble, MessageType},
};

// Load the config and treat it as a read-only static value.
static CONFIG: Lazy<config::Config> = Lazy::new(config::Config::parse);

#[rustfmt::skip]
fn print_config(config: &'static config::Config) {
    info!("config:");
    info!("  {:38}{}", "input:", config.input.display());
    info!("  {:38}{}", "output:", config.output.display());
    info!("  {:38}{}", "stream_class:", config.stream_class);
    info!("  {:38}<{} chars>", "shared_key:", config.shared_key.len());
    info!("  {:38}{:?}", "participants:", config.participants.iter().map(|p| p.id).collect::<Vec<_>>());
    info!("  {:38}{:?}", "ssrcs:", config.ssrcs.iter().map(|s| (s.id, s.ssrc)).collect::<Vec<_>>());
    info!("  {:38}{}", "max_late:", config.max_late);
    info!("  {:38}{:?}", "clock_rate:", config.clock_rate);
    info!("  {:38}{}", "already_stripped:", config.already_stripped);
}

/// One hex-encoded message per line; blank lines and '#' comments are skipped.
fn parse_capture_line(line: &str) -> Option<Result<Vec<u8>>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(hex::decode(line).context("invalid hex in capture"))
}

struct SampleWriter {
    out: BufWriter<File>,
    written: u64,
}

impl SampleWriter {
    fn write(&mut self, result: Result<Sample, DecodeError>) -> Result<()> {
        // Failed samples were already logged by the decoder.
        if let Ok(sample) = result {
            debug!(
                "sample of ssrc {}: {} bytes at {:?} (+{:?})",
                sample.ssrc,
                sample.data.len(),
                sample.elapsed,
                sample.duration
            );
            self.out.write_all(&sample.data)?;
            self.written += 1;
        }
        Ok(())
    }
}

fn run(config: &'static config::Config) -> Result<DecoderStats> {
    let roster = config.roster()?.into_shared();
    let mut decoder = StreamDecoder::new(config.stream_class, roster, config.decoder_config());

    let input = File::open(&config.input)
        .with_context(|| format!("failed to open {}", config.input.display()))?;
    let output = File::create(&config.output)
        .with_context(|| format!("failed to create {}", config.output.display()))?;
    let mut writer = SampleWriter {
        out: BufWriter::new(output),
        written: 0,
    };

    for (index, line) in BufReader::new(input).lines().enumerate() {
        let line_number = index + 1;
        let message = match parse_capture_line(&line?) {
            None => continue,
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                warn!("line {}: {:#}", line_number, err);
                continue;
            }
        };

        let packet = if config.already_stripped {
            &message[..]
        } else {
            match strip_preamble(&message) {
                Ok((message_type, body)) if message_type.stream_class() == Some(config.stream_class) => {
                    body
                }
                Ok((MessageType::Ping, _)) | Ok((MessageType::IvAnnouncement, _)) => continue,
                Ok((message_type, body)) => {
                    trace!("line {}: skipping {:?} message of {} bytes", line_number, message_type, body.len());
                    continue;
                }
                Err(err) => {
                    warn!("line {}: {}", line_number, err);
                    continue;
                }
            }
        };

        match decoder.decode(packet) {
            Ok(Some(sample)) => writer.write(Ok(sample))?,
            Ok(None) => {}
            Err(err) => {
                // Per-sample failures were logged when they happened.
                if !matches!(
                    err,
                    DecodeError::Crypto(_) | DecodeError::Payload(_) | DecodeError::Fragment(_)
                ) {
                    debug!("line {}: {} ({})", line_number, err, err.kind());
                }
            }
        }
    }

    for result in decoder.flush() {
        writer.write(result)?;
    }
    writer.out.flush()?;
    info!(
        "wrote {} samples to {}",
        writer.written,
        config.output.display()
    );
    Ok(decoder.stats())
}

fn main() -> Result<()> {
    // Initialize logging.
    env_logger::Builder::from_env(
        Env::default()
            .default_filter_or("tunnel_decoder=info")
            .default_write_style_or("never"),
    )
    .format(tunnel_common::format_log_line)
    .init();

    info!(
        "tunnel_decoder: v{}",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
    );

    // Parse the command line arguments.
    let config = &CONFIG;
    print_config(config);

    let stats = run(config)?;
    info!("{:?}", stats);
    Ok(())
}
