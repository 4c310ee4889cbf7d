//! Logical display state and the 48-bit frame it composes to.

use crate::pin_map::{DIGIT_COUNT, PIN_MAP, PinMap};

/// What the tubes should show: hour and minute digits, four decimal dots, and the colon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayState {
    /// 0..=23
    pub hour: u8,
    /// 0..=59
    pub minute: u8,
    /// 0..=59. Only the parity is read: the colon is lit on odd seconds.
    pub second: u8,
    /// Bit `i` lights the dot under digit `i`.
    pub dot_mask: u8,
}

impl DisplayState {
    /// State with no dots.
    #[must_use]
    pub const fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            dot_mask: 0,
        }
    }

    /// Same state with the given dots lit.
    #[must_use]
    pub const fn with_dots(self, dot_mask: u8) -> Self {
        Self { dot_mask, ..self }
    }

    /// Colon is lit iff the second is odd.
    #[must_use]
    pub const fn colon_lit(&self) -> bool {
        self.second % 2 == 1
    }
}

/// Bit `k` drives shift-register output `k`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame(pub u64);

impl Frame {
    /// All outputs off.
    pub const BLANK: Self = Self(0);

    /// Compose with the Pin Map selected at build time.
    #[must_use]
    pub const fn compose(state: &DisplayState) -> Self {
        Self::compose_with(&PIN_MAP, state)
    }

    /// Compose a frame from a display state.
    ///
    /// Inputs must already be in range; an hour of 24 or more, or a minute of 60 or more,
    /// panics on the table lookup.
    #[must_use]
    pub const fn compose_with(pin_map: &PinMap, state: &DisplayState) -> Self {
        let hour = state.hour as usize;
        let minute = state.minute as usize;

        let mut bits = 0u64;
        bits |= 1 << pin_map.digit_bit(0, hour / 10);
        bits |= 1 << pin_map.digit_bit(1, hour % 10);
        bits |= 1 << pin_map.digit_bit(2, minute / 10);
        bits |= 1 << pin_map.digit_bit(3, minute % 10);

        let mut dot = 0;
        while dot < DIGIT_COUNT {
            if (state.dot_mask >> dot) & 1 == 1 {
                bits |= 1 << pin_map.dot_bit(dot);
            }
            dot += 1;
        }

        if state.colon_lit() {
            bits |= pin_map.leds_mask();
        }

        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Bits of one chip; chip 0 holds frame bits 0..=7.
    #[must_use]
    pub const fn chip_byte(self, chip: u8) -> u8 {
        (self.0 >> (chip as u32 * 8)) as u8
    }

    /// Frame with the bits in `mask` cleared.
    #[must_use]
    pub const fn without(self, mask: u64) -> Self {
        Self(self.0 & !mask)
    }

    /// Whether every bit in `mask` is set.
    #[must_use]
    pub const fn contains(self, mask: u64) -> bool {
        self.0 & mask == mask
    }
}
