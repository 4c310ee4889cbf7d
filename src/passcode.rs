//! Random four-digit passcode shown on the tubes while the provisioning access point is up.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::Result;
use crate::frame::DisplayState;

/// Four decimal digits, left to right.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Passcode([u8; 4]);

impl Passcode {
    /// Passcode from a 4-digit value; values above 9999 wrap.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        let value = value % 10_000;
        Self([
            (value / 1000) as u8,
            (value / 100 % 10) as u8,
            (value / 10 % 10) as u8,
            (value % 10) as u8,
        ])
    }

    /// Passcode from a random word.
    #[must_use]
    pub const fn from_random(random: u64) -> Self {
        Self::new((random % 10_000) as u16)
    }

    /// Digits, left to right.
    #[must_use]
    pub const fn digits(&self) -> [u8; 4] {
        self.0
    }

    /// Access point password: the passcode twice.
    ///
    /// # Errors
    ///
    /// Never fails in practice; eight digits always fit.
    pub fn ap_password(&self) -> Result<String<8>> {
        let mut password = String::new();
        write!(password, "{self}{self}")?;
        Ok(password)
    }

    /// First two digits in the hour position, last two in the minute position, colon off.
    ///
    /// Either pair may exceed 23 or 59; composing still works because each digit is looked up
    /// on its own.
    #[must_use]
    pub const fn display_state(&self) -> DisplayState {
        let [a, b, c, d] = self.0;
        DisplayState::new(a * 10 + b, c * 10 + d, 0)
    }
}

impl fmt::Display for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in self.0 {
            write!(f, "{digit}")?;
        }
        Ok(())
    }
}
