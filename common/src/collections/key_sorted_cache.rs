//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

use std::collections::BTreeMap;

/// An ordered map holding at most `limit` entries. Once full, inserting
/// pushes out the entry with the smallest key, so the newest sequence
/// numbers are the ones kept.
pub struct KeySortedCache<K, V> {
    limit: usize,
    value_by_key: BTreeMap<K, V>,
}

impl<K: Ord, V> KeySortedCache<K, V> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            value_by_key: BTreeMap::new(),
        }
    }

    /// Iff inserting pushed out the smallest entry, returns it.
    /// That may be the entry just inserted.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.value_by_key.insert(key, value);
        if self.value_by_key.len() > self.limit {
            self.value_by_key.pop_first()
        } else {
            None
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.value_by_key.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.value_by_key.contains_key(key)
    }

    pub fn first_key(&self) -> Option<&K> {
        self.value_by_key.first_key_value().map(|(key, _)| key)
    }

    pub fn last_key(&self) -> Option<&K> {
        self.value_by_key.last_key_value().map(|(key, _)| key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.value_by_key.remove(key)
    }

    pub fn len(&self) -> usize {
        self.value_by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_by_key.is_empty()
    }
}
