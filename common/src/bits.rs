//
// Copyright 2021 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

use std::ops::{BitAnd, BitOr, Shl, Shr};

/// Single-bit access for the flag bytes found in packet headers.
pub trait Bits: Sized + Copy {
    const BIT_WIDTH: u8 = (std::mem::size_of::<Self>() * 8) as u8;

    /// Returns true iff the bit at the index is one.
    ///
    /// # Arguments
    ///
    /// * `index` - The 0 based index starting at the most significant bit.
    fn ms_bit(self, index: u8) -> bool;

    /// Sets the bit to one at the index.
    ///
    /// # Arguments
    ///
    /// * `index` - The 0 based index starting at the most significant bit.
    fn set_ms_bit(self, index: u8) -> Self;

    /// Sets the bit at the index (from the most significant bit) to one iff
    /// `value` is true.
    fn with_ms_bit(self, index: u8, value: bool) -> Self {
        if value {
            self.set_ms_bit(index)
        } else {
            self
        }
    }
}

impl<T> Bits for T
where
    T: Copy
        + Shr<u8, Output = T>
        + Shl<u8, Output = T>
        + BitAnd<T, Output = T>
        + BitOr<T, Output = T>
        + From<u8>
        + Eq,
{
    fn ms_bit(self, index: u8) -> bool {
        assert!(index < Self::BIT_WIDTH);

        self >> (Self::BIT_WIDTH - index - 1) & T::from(1) == T::from(1)
    }

    fn set_ms_bit(self, index: u8) -> Self {
        assert!(index < Self::BIT_WIDTH);

        self | T::from(1) << (Self::BIT_WIDTH - index - 1)
    }
}
