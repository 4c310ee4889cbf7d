//! A fully const module that tells which shift-register output drives each cathode.
//!
//! See [`PinMap`] for the two tube families and the build-time checks.

/// Number of outputs in the cascade of six 8-bit shift registers.
pub const FRAME_BITS: u8 = 48;

/// Number of tubes.
pub const DIGIT_COUNT: usize = 4;

/// Numerals per tube.
pub const NUMERAL_COUNT: usize = 10;

/// A fully const table mapping (digit, numeral), decimal dots and the two colon LEDs to bit
/// indices of a 48-bit frame.
///
/// Every bit index is checked at compile time: it must be below 48 and used by exactly one
/// cathode or LED. That makes the ten numerals of a tube distinct and keeps the digit, dot and
/// colon masks pairwise disjoint.
///
/// # Examples
///
/// ```rust
/// use nixie_clock::pin_map::PinMap;
///
/// const MAP: PinMap = PinMap::IN12;
/// const _: () = assert!(MAP.digits_mask() & MAP.dots_mask() == 0);
/// const _: () = assert!(MAP.digits_mask().count_ones() == 40);
/// ```
///
/// Compile-time validation catches wiring errors:
///
/// ```compile_fail
/// # use nixie_clock::pin_map::PinMap;
/// // Numeral 5 of digit 0 reuses the bit of numeral 1
/// const INVALID: PinMap = PinMap::new(
///     [
///         [0, 1, 2, 3, 4, 1, 6, 7, 8, 9],
///         [10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
///         [20, 21, 22, 23, 24, 25, 26, 27, 28, 29],
///         [30, 31, 32, 33, 34, 35, 36, 37, 38, 39],
///     ],
///     [40, 41, 42, 43],
///     [44, 45],
/// );
/// ```
///
/// ```compile_fail
/// # use nixie_clock::pin_map::PinMap;
/// // Bit 48 does not exist in the cascade
/// const INVALID: PinMap = PinMap::new(
///     [
///         [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
///         [10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
///         [20, 21, 22, 23, 24, 25, 26, 27, 28, 29],
///         [30, 31, 32, 33, 34, 35, 36, 37, 38, 39],
///     ],
///     [40, 41, 42, 43],
///     [44, 48],
/// );
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinMap {
    digits: [[u8; NUMERAL_COUNT]; DIGIT_COUNT],
    dots: [u8; DIGIT_COUNT],
    colon: [u8; 2],
}

impl PinMap {
    /// IN-12 board wiring.
    pub const IN12: Self = Self::new(
        [
            [
                bit(1, 5),
                bit(1, 3),
                bit(1, 2),
                bit(1, 1),
                bit(1, 0),
                bit(1, 7),
                bit(1, 6),
                bit(2, 6),
                bit(2, 5),
                bit(2, 4),
            ],
            [
                bit(3, 4),
                bit(2, 3),
                bit(2, 2),
                bit(2, 1),
                bit(2, 7),
                bit(2, 0),
                bit(3, 0),
                bit(3, 1),
                bit(3, 2),
                bit(3, 3),
            ],
            [
                bit(5, 7),
                bit(4, 4),
                bit(4, 3),
                bit(4, 5),
                bit(4, 2),
                bit(4, 6),
                bit(4, 1),
                bit(4, 7),
                bit(4, 0),
                bit(5, 1),
            ],
            [
                bit(6, 0),
                bit(5, 4),
                bit(5, 3),
                bit(5, 5),
                bit(5, 6),
                bit(5, 2),
                bit(6, 5),
                bit(6, 3),
                bit(6, 2),
                bit(6, 1),
            ],
        ],
        [bit(1, 4), bit(3, 5), bit(5, 0), bit(6, 4)],
        [bit(3, 6), bit(3, 7)],
    );

    /// IN-14 board wiring.
    pub const IN14: Self = Self::new(
        [
            [
                bit(1, 7),
                bit(1, 6),
                bit(1, 5),
                bit(1, 4),
                bit(1, 3),
                bit(1, 2),
                bit(1, 1),
                bit(1, 0),
                bit(2, 7),
                bit(2, 6),
            ],
            [
                bit(2, 5),
                bit(2, 4),
                bit(2, 3),
                bit(2, 2),
                bit(2, 1),
                bit(2, 0),
                bit(3, 7),
                bit(3, 6),
                bit(3, 5),
                bit(3, 4),
            ],
            [
                bit(4, 7),
                bit(4, 6),
                bit(4, 5),
                bit(4, 4),
                bit(4, 3),
                bit(4, 2),
                bit(4, 1),
                bit(4, 0),
                bit(5, 7),
                bit(5, 6),
            ],
            [
                bit(5, 5),
                bit(5, 4),
                bit(5, 3),
                bit(5, 2),
                bit(5, 1),
                bit(5, 0),
                bit(6, 7),
                bit(6, 6),
                bit(6, 5),
                bit(6, 4),
            ],
        ],
        [bit(3, 3), bit(3, 2), bit(6, 3), bit(6, 2)],
        [bit(3, 1), bit(3, 0)],
    );

    /// Constructor: verifies every bit is inside the frame and used exactly once.
    #[must_use]
    pub const fn new(
        digits: [[u8; NUMERAL_COUNT]; DIGIT_COUNT],
        dots: [u8; DIGIT_COUNT],
        colon: [u8; 2],
    ) -> Self {
        let mut used = 0u64;

        let mut digit = 0;
        while digit < DIGIT_COUNT {
            let mut numeral = 0;
            while numeral < NUMERAL_COUNT {
                used = claim(used, digits[digit][numeral], "duplicate bit in digit pin map");
                numeral += 1;
            }
            digit += 1;
        }

        let mut dot = 0;
        while dot < DIGIT_COUNT {
            used = claim(used, dots[dot], "dot bit overlaps another output");
            dot += 1;
        }

        used = claim(used, colon[0], "colon bit overlaps another output");
        claim(used, colon[1], "colon bit overlaps another output");

        Self {
            digits,
            dots,
            colon,
        }
    }

    /// Bit that lights `numeral` (0..=9) on tube `digit` (0..=3, left to right).
    #[must_use]
    pub const fn digit_bit(&self, digit: usize, numeral: usize) -> u8 {
        self.digits[digit][numeral]
    }

    /// Bit that lights the decimal dot under tube `digit`.
    #[must_use]
    pub const fn dot_bit(&self, digit: usize) -> u8 {
        self.dots[digit]
    }

    /// Bits of the two colon LEDs.
    #[must_use]
    pub const fn colon_bits(&self) -> [u8; 2] {
        self.colon
    }

    /// Every numeral bit of every tube.
    #[must_use]
    pub const fn digits_mask(&self) -> u64 {
        let mut mask = 0u64;
        let mut digit = 0;
        while digit < DIGIT_COUNT {
            let mut numeral = 0;
            while numeral < NUMERAL_COUNT {
                mask |= 1 << self.digits[digit][numeral];
                numeral += 1;
            }
            digit += 1;
        }
        mask
    }

    /// Every decimal dot bit.
    #[must_use]
    pub const fn dots_mask(&self) -> u64 {
        let mut mask = 0u64;
        let mut dot = 0;
        while dot < DIGIT_COUNT {
            mask |= 1 << self.dots[dot];
            dot += 1;
        }
        mask
    }

    /// Both colon LED bits.
    #[must_use]
    pub const fn leds_mask(&self) -> u64 {
        (1 << self.colon[0]) | (1 << self.colon[1])
    }

    /// Const equality helper.
    #[must_use]
    pub const fn equals(&self, other: &Self) -> bool {
        let mut digit = 0;
        while digit < DIGIT_COUNT {
            let mut numeral = 0;
            while numeral < NUMERAL_COUNT {
                if self.digits[digit][numeral] != other.digits[digit][numeral] {
                    return false;
                }
                numeral += 1;
            }
            if self.dots[digit] != other.dots[digit] {
                return false;
            }
            digit += 1;
        }
        self.colon[0] == other.colon[0] && self.colon[1] == other.colon[1]
    }
}

/// Bit index of output `pin` (0..=7) on `chip` (1..=6, numbered from the controller side).
const fn bit(chip: u8, pin: u8) -> u8 {
    assert!(chip >= 1 && chip <= 6, "chip out of range");
    assert!(pin < 8, "pin out of range");
    (chip - 1) * 8 + pin
}

const fn claim(used: u64, bit: u8, duplicate_message: &str) -> u64 {
    assert!(bit < FRAME_BITS, "bit index outside the 48-bit frame");
    let flag = 1u64 << bit;
    if used & flag != 0 {
        panic!("{}", duplicate_message);
    }
    used | flag
}

#[cfg(all(feature = "in12", feature = "in14"))]
compile_error!("Enable exactly one tube family: `in12` (default) or `in14` (with --no-default-features).");

#[cfg(not(any(feature = "in12", feature = "in14")))]
compile_error!("No tube family selected: enable feature `in12` or `in14`.");

/// The Pin Map selected at build time.
#[cfg(feature = "in12")]
pub const PIN_MAP: PinMap = PinMap::IN12;

/// The Pin Map selected at build time.
#[cfg(all(feature = "in14", not(feature = "in12")))]
pub const PIN_MAP: PinMap = PinMap::IN14;

const _: () = assert!(PIN_MAP.digits_mask() & PIN_MAP.dots_mask() == 0);
const _: () = assert!(PIN_MAP.digits_mask() & PIN_MAP.leds_mask() == 0);
const _: () = assert!(PIN_MAP.dots_mask() & PIN_MAP.leds_mask() == 0);
