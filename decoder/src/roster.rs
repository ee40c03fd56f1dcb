//
// Copyright 2022 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The participants of one media session, their SSRCs and secret nonces,
//! plus the shared meeting key their stream keys are derived from.

use std::{collections::BTreeMap, sync::Arc};

use log::*;
use parking_lot::RwLock;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{
    crypto::{self, CryptoError, Key},
    rtp::Ssrc,
    stream_class::StreamClass,
};

pub type ParticipantId = u32;

/// Shared between every decoder and encoder of a session. Written during
/// signaling, read on the first packet of each SSRC.
pub type SharedRoster = Arc<RwLock<ParticipantRoster>>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterError {
    #[error("participant {0} already exists")]
    DuplicateParticipant(ParticipantId),
    #[error("participant {0} is missing")]
    UnknownParticipant(ParticipantId),
    #[error("shared meeting key is not set")]
    KeyNotSet,
    #[error("no participant owns ssrc {0}")]
    UnknownSsrc(Ssrc),
}

/// Why a stream key couldn't be produced for an SSRC.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLookupError {
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub struct Participant {
    id: ParticipantId,
    ssrcs: Vec<Ssrc>,
    secret_nonce: Zeroizing<Vec<u8>>,
}

impl Participant {
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// In the order they were added.
    pub fn ssrcs(&self) -> &[Ssrc] {
        &self.ssrcs
    }

    pub fn owns(&self, ssrc: Ssrc) -> bool {
        self.ssrcs.contains(&ssrc)
    }

    // Participant ids and the SSRCs of their streams have been observed to
    // differ only in the last decimal digit (17778240 sends 17778242).
    // Unverified: two participants with close ids would collide.
    fn probably_owns(&self, ssrc: Ssrc) -> bool {
        self.id / 10 == ssrc / 10
    }
}

#[derive(Default)]
pub struct ParticipantRoster {
    shared_key: Option<Zeroizing<Vec<u8>>>,
    participants: BTreeMap<ParticipantId, Participant>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedRoster {
        Arc::new(RwLock::new(self))
    }

    pub fn set_shared_key(&mut self, shared_key: &[u8]) {
        if self.shared_key.is_some() {
            debug!("replacing shared meeting key");
        }
        self.shared_key = Some(Zeroizing::new(shared_key.to_vec()));
    }

    pub fn shared_key(&self) -> Result<&[u8], RosterError> {
        match &self.shared_key {
            Some(key) if !key.is_empty() => Ok(&key[..]),
            _ => Err(RosterError::KeyNotSet),
        }
    }

    pub fn add_participant(
        &mut self,
        id: ParticipantId,
        secret_nonce: &[u8],
    ) -> Result<(), RosterError> {
        if self.participants.contains_key(&id) {
            return Err(RosterError::DuplicateParticipant(id));
        }
        self.participants.insert(
            id,
            Participant {
                id,
                ssrcs: Vec::new(),
                secret_nonce: Zeroizing::new(secret_nonce.to_vec()),
            },
        );
        debug!("added participant {}", id);
        Ok(())
    }

    pub fn add_ssrc(&mut self, id: ParticipantId, ssrc: Ssrc) -> Result<(), RosterError> {
        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(RosterError::UnknownParticipant(id))?;
        if participant.owns(ssrc) {
            debug!("participant {} already owns ssrc {}", id, ssrc);
        } else {
            participant.ssrcs.push(ssrc);
        }
        Ok(())
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// An exact SSRC match anywhere in the roster wins over the id heuristic.
    pub fn lookup_nonce(&self, ssrc: Ssrc) -> Result<&[u8], RosterError> {
        if let Some(participant) = self.participants.values().find(|p| p.owns(ssrc)) {
            return Ok(&participant.secret_nonce[..]);
        }
        if let Some(participant) = self.participants.values().find(|p| p.probably_owns(ssrc)) {
            debug!(
                "ssrc {} not registered; guessing participant {} from its id",
                ssrc, participant.id
            );
            return Ok(&participant.secret_nonce[..]);
        }
        Err(RosterError::UnknownSsrc(ssrc))
    }

    /// Looks up everything needed to derive the key for a stream.
    pub fn stream_key(&self, ssrc: Ssrc, class: StreamClass) -> Result<Key, KeyLookupError> {
        let secret_nonce = self.lookup_nonce(ssrc)?;
        let shared_key = self.shared_key()?;
        Ok(crypto::derive_key(shared_key, secret_nonce, class)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_participants_and_ssrcs() {
        let mut roster = ParticipantRoster::new();
        assert!(roster.is_empty());
        roster.add_participant(16778240, b"nonce-a").unwrap();
        assert_eq!(
            Err(RosterError::DuplicateParticipant(16778240)),
            roster.add_participant(16778240, b"nonce-b")
        );
        assert_eq!(
            Err(RosterError::UnknownParticipant(5)),
            roster.add_ssrc(5, 16778241)
        );

        roster.add_ssrc(16778240, 16778242).unwrap();
        roster.add_ssrc(16778240, 16778241).unwrap();
        roster.add_ssrc(16778240, 16778242).unwrap();
        assert_eq!(1, roster.len());
        let participant = roster.participant(16778240).unwrap();
        assert_eq!(16778240, participant.id());
        assert_eq!(&[16778242u32, 16778241][..], participant.ssrcs());
    }

    #[test]
    fn shared_key() {
        let mut roster = ParticipantRoster::new();
        assert_eq!(Err(RosterError::KeyNotSet), roster.shared_key());
        roster.set_shared_key(&[]);
        assert_eq!(Err(RosterError::KeyNotSet), roster.shared_key());
        roster.set_shared_key(b"first");
        roster.set_shared_key(b"second");
        assert_eq!(Ok(&b"second"[..]), roster.shared_key());
    }

    #[test]
    fn lookup_exact_then_heuristic() {
        let mut roster = ParticipantRoster::new();
        roster.add_participant(100, b"exact").unwrap();
        roster.add_participant(200, b"heuristic").unwrap();
        // 205 / 10 == 200 / 10, but participant 100 registered it.
        roster.add_ssrc(100, 205).unwrap();

        assert_eq!(Ok(&b"exact"[..]), roster.lookup_nonce(205));
        assert_eq!(Ok(&b"heuristic"[..]), roster.lookup_nonce(209));
        assert_eq!(Ok(&b"exact"[..]), roster.lookup_nonce(101));
        assert_eq!(Err(RosterError::UnknownSsrc(300)), roster.lookup_nonce(300));
        assert_eq!(Err(RosterError::UnknownSsrc(210)), roster.lookup_nonce(210));
    }

    #[test]
    fn stream_key() {
        let mut roster = ParticipantRoster::new();
        roster.add_participant(16778240, b"nonce").unwrap();
        roster.add_ssrc(16778240, 7).unwrap();
        assert_eq!(
            Some(KeyLookupError::Roster(RosterError::KeyNotSet)),
            roster.stream_key(7, StreamClass::Video).err()
        );
        assert_eq!(
            Some(KeyLookupError::Roster(RosterError::UnknownSsrc(8))),
            roster.stream_key(8, StreamClass::Video).err()
        );

        roster.set_shared_key(b"shared");
        let key = roster.stream_key(7, StreamClass::Video).unwrap();
        let expected = crypto::derive_key(b"shared", b"nonce", StreamClass::Video).unwrap();
        assert_eq!(&expected[..], &key[..]);
    }

    #[test]
    fn shared_between_threads() {
        let roster = ParticipantRoster::new().into_shared();
        let writer = roster.clone();
        std::thread::spawn(move || {
            let mut roster = writer.write();
            roster.set_shared_key(b"shared");
            roster.add_participant(1, b"nonce").unwrap();
        })
        .join()
        .unwrap();
        assert!(roster.read().lookup_nonce(1).is_ok());
    }
}
