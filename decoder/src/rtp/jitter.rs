//
// Copyright 2022 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Reorders the packets of one SSRC and hands out complete units: a run of
//! consecutive sequence numbers from a head packet to a tail packet.

use log::*;
use tunnel_common::KeySortedCache;

use super::types::FullSequenceNumber;

struct Slot<T> {
    is_head: bool,
    is_tail: bool,
    value: T,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReorderStats {
    /// Arrived after their sequence number was already given up on.
    pub late: u64,
    /// Part of a unit whose head or tail never arrived.
    pub orphaned: u64,
    /// Sequence numbers skipped over because they never arrived.
    pub lost: u64,
}

enum Walk {
    Complete(FullSequenceNumber),
    NewHead(FullSequenceNumber),
    Gap(FullSequenceNumber),
}

pub struct ReorderBuffer<T> {
    packets: KeySortedCache<FullSequenceNumber, Slot<T>>,
    max_late: u16,
    /// The next sequence number to hand out. None until the first unit is
    /// handed out, so the first packets may arrive in any order.
    next: Option<FullSequenceNumber>,
    stats: ReorderStats,
}

impl<T> ReorderBuffer<T> {
    /// Waits for a missing packet until `max_late` packets after it have
    /// arrived.
    pub fn new(max_late: u16) -> Self {
        let max_late = max_late.max(1);
        Self {
            // Never hold more than one window past the cursor.
            packets: KeySortedCache::new(2 * max_late as usize),
            max_late,
            next: None,
            stats: ReorderStats::default(),
        }
    }

    pub fn stats(&self) -> ReorderStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Returns false if the packet was dropped for being late or a duplicate.
    pub fn push(
        &mut self,
        seqnum: FullSequenceNumber,
        is_head: bool,
        is_tail: bool,
        value: T,
    ) -> bool {
        if self.next.is_some_and(|next| seqnum < next) {
            debug!("dropping late packet {} (next is {:?})", seqnum, self.next);
            self.stats.late += 1;
            return false;
        }
        if self.packets.contains_key(&seqnum) {
            trace!("dropping duplicate packet {}", seqnum);
            return false;
        }
        let evicted = self.packets.insert(
            seqnum,
            Slot {
                is_head,
                is_tail,
                value,
            },
        );
        if let Some((evicted, _)) = evicted {
            debug!("reorder buffer full; dropped packet {}", evicted);
            self.stats.late += 1;
            self.next = self.next.map(|next| next.max(evicted + 1));
            return evicted != seqnum;
        }
        true
    }

    /// Hands out the next complete unit if it's ready, in sequence number order.
    pub fn pop(&mut self) -> Option<Vec<(FullSequenceNumber, T)>> {
        self.pop_with(false)
    }

    /// Hands out the next complete unit, skipping over any missing packets.
    /// Used once no more packets will arrive.
    pub fn drain_next(&mut self) -> Option<Vec<(FullSequenceNumber, T)>> {
        self.pop_with(true)
    }

    fn pop_with(&mut self, draining: bool) -> Option<Vec<(FullSequenceNumber, T)>> {
        loop {
            let first = *self.packets.first_key()?;
            let last = *self.packets.last_key()?;
            let cursor = self.next.unwrap_or(first);
            let give_up = draining || last - cursor >= self.max_late as u64;

            if first != cursor {
                if !give_up {
                    return None;
                }
                debug!("giving up on packets {}..{}", cursor, first);
                self.stats.lost += first - cursor;
                self.next = Some(first);
                continue;
            }

            let is_head = self.packets.get(&cursor).map(|slot| slot.is_head)?;
            if !is_head {
                if self.next.is_none() && !give_up {
                    // The head may still be on its way.
                    return None;
                }
                debug!("dropping packet {} without a head", cursor);
                self.drop_range(cursor, cursor + 1);
                continue;
            }

            let mut end = cursor;
            let walk = loop {
                match self.packets.get(&end) {
                    None => break Walk::Gap(end),
                    Some(slot) if end != cursor && slot.is_head => break Walk::NewHead(end),
                    Some(slot) if slot.is_tail => break Walk::Complete(end),
                    Some(_) => end += 1,
                }
            };

            match walk {
                Walk::Complete(end) => {
                    let unit = (cursor..=end)
                        .filter_map(|seqnum| {
                            self.packets
                                .remove(&seqnum)
                                .map(|slot| (seqnum, slot.value))
                        })
                        .collect();
                    self.next = Some(end + 1);
                    return Some(unit);
                }
                Walk::NewHead(head) => {
                    debug!("dropping packets {}..{} without a tail", cursor, head);
                    self.drop_range(cursor, head);
                }
                Walk::Gap(missing) => {
                    if !give_up {
                        return None;
                    }
                    debug!("dropping packets {}..{} before a gap", cursor, missing);
                    self.drop_range(cursor, missing);
                }
            }
        }
    }

    fn drop_range(&mut self, start: FullSequenceNumber, end: FullSequenceNumber) {
        for seqnum in start..end {
            if self.packets.remove(&seqnum).is_some() {
                self.stats.orphaned += 1;
            }
        }
        self.next = Some(end);
    }
}
