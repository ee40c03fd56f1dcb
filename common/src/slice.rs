//
// Copyright 2022 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

/// `split_at` for untrusted lengths: None when `mid` is past the end.
pub trait CheckedSplitAt {
    fn checked_split_at(&self, mid: usize) -> Option<(&Self, &Self)>;
}

impl<T> CheckedSplitAt for [T] {
    fn checked_split_at(&self, mid: usize) -> Option<(&[T], &[T])> {
        (mid <= self.len()).then(|| self.split_at(mid))
    }
}
