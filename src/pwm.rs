//! Software PWM over the shift-register chain.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::brightness::{Brightness, MAX_BRIGHTNESS};
use crate::frame::Frame;
use crate::pin_map::PIN_MAP;
use crate::shift_register::ShiftRegisterChain;

/// Interval between two refresher ticks.
pub const TICK_PERIOD_MICROS: u64 = 200;

/// Longest PWM period that still looks steady on the tubes.
pub const MAX_PWM_PERIOD_MICROS: u64 = 20_000;

/// One full brightness cycle at the build-time `MAX_BRIGHTNESS`.
pub const PWM_PERIOD_MICROS: u64 = (MAX_BRIGHTNESS as u64 + 1) * TICK_PERIOD_MICROS;

const _: () = assert!(
    PWM_PERIOD_MICROS <= MAX_PWM_PERIOD_MICROS,
    "NIXIE_MAX_BRIGHTNESS too large: the PWM period would flicker"
);

/// Per-channel PWM counters.
///
/// Each [`tick`](Self::tick) masks the frame: digit (and dot) bits stay lit while the digit
/// counter is below `brightness.digits`, colon bits while the led counter is below
/// `brightness.leds`. Counters then advance modulo `max + 1`, so over one period a channel at
/// level `b` is lit for exactly `b` ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PwmRefresher {
    max: u8,
    digit_counter: u8,
    led_counter: u8,
}

impl Default for PwmRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmRefresher {
    /// Counters at 0 with the build-time `MAX_BRIGHTNESS`.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max(MAX_BRIGHTNESS)
    }

    /// Counters at 0 with an explicit period of `max + 1` ticks.
    #[must_use]
    pub const fn with_max(max: u8) -> Self {
        Self {
            max,
            digit_counter: 0,
            led_counter: 0,
        }
    }

    /// Ticks per PWM period.
    #[must_use]
    pub const fn period(&self) -> u16 {
        self.max as u16 + 1
    }

    /// Current (digit, led) counters.
    #[must_use]
    pub const fn counters(&self) -> (u8, u8) {
        (self.digit_counter, self.led_counter)
    }

    /// Frame as it should be emitted at the current counters.
    #[must_use]
    pub const fn mask(&self, frame: Frame, brightness: Brightness) -> Frame {
        let mut dark = 0u64;
        if self.digit_counter >= brightness.digits {
            dark |= PIN_MAP.digits_mask() | PIN_MAP.dots_mask();
        }
        if self.led_counter >= brightness.leds {
            dark |= PIN_MAP.leds_mask();
        }
        frame.without(dark)
    }

    /// Mask, emit, and advance. Returns the emitted frame.
    pub fn tick<L, C, D>(
        &mut self,
        frame: Frame,
        brightness: Brightness,
        chain: &mut ShiftRegisterChain<L, C, D>,
    ) -> Frame
    where
        L: OutputPin<Error = Infallible>,
        C: OutputPin<Error = Infallible>,
        D: OutputPin<Error = Infallible>,
    {
        let masked = self.mask(frame, brightness);
        chain.emit(masked);
        self.advance();
        masked
    }

    /// Move both counters one step, wrapping after `max`.
    pub const fn advance(&mut self) {
        self.digit_counter = self.next(self.digit_counter);
        self.led_counter = self.next(self.led_counter);
    }

    const fn next(&self, counter: u8) -> u8 {
        if counter >= self.max { 0 } else { counter + 1 }
    }
}
