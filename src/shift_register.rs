use core::convert::Infallible;

use embedded_hal::digital::{OutputPin, PinState};

use crate::frame::Frame;

/// Six cascaded 8-bit serial-in/parallel-out high-voltage drivers on three GPIO lines.
///
/// The chip nearest the controller is shifted in last, so [`emit`](Self::emit) sends the
/// highest byte first and each byte MSB-first. Frame bit `k` then lands on physical output `k`
/// when the latch rises.
pub struct ShiftRegisterChain<L, C, D> {
    latch: L,
    clock: C,
    data: D,
}

impl<L, C, D> ShiftRegisterChain<L, C, D>
where
    L: OutputPin<Error = Infallible>,
    C: OutputPin<Error = Infallible>,
    D: OutputPin<Error = Infallible>,
{
    /// Chips in the cascade.
    pub const CHIP_COUNT: u8 = 6;

    /// Take ownership of the LATCH, CLOCK and DATA lines.
    pub fn new(mut latch: L, mut clock: C, mut data: D) -> Self {
        // latch high holds the current outputs until the first frame
        let Ok(()) = latch.set_high();
        let Ok(()) = clock.set_low();
        let Ok(()) = data.set_low();
        Self { latch, clock, data }
    }

    /// Shift `frame` into the cascade and commit it on the rising edge of LATCH.
    pub fn emit(&mut self, frame: Frame) {
        let Ok(()) = self.latch.set_low();
        for chip in (0..Self::CHIP_COUNT).rev() {
            let byte = frame.chip_byte(chip);
            #[cfg(feature = "display-trace")]
            debug!("chip {=u8}: {=u8:b}", chip, byte);
            self.shift_byte(byte);
        }
        let Ok(()) = self.latch.set_high();
    }

    #[inline]
    fn shift_byte(&mut self, byte: u8) {
        for bit in (0..u8::BITS).rev() {
            let level = PinState::from((byte >> bit) & 1 == 1);
            let Ok(()) = self.data.set_state(level);
            let Ok(()) = self.clock.set_high();
            let Ok(()) = self.clock.set_low();
        }
    }
}
