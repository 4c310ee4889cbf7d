//! A device abstraction for the four nixie tubes and their colon.
//!
//! See [`Nixie`] for usage.

use core::{cell::Cell, convert::Infallible};

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embedded_hal::digital::OutputPin;

use crate::brightness::Brightness;
use crate::frame::{DisplayState, Frame};
use crate::pwm::PwmRefresher;
use crate::shift_register::ShiftRegisterChain;

/// What the refresher reads on every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplaySlot {
    pub frame: Frame,
    pub brightness: Brightness,
}

/// Static for the [`Nixie`] device.
///
/// The frame and brightness share one lock so the refresher never sees a new frame with an old
/// brightness or the reverse.
pub struct NixieStatic(Mutex<CriticalSectionRawMutex, Cell<DisplaySlot>>);

impl NixieStatic {
    const fn new() -> Self {
        Self(Mutex::new(Cell::new(DisplaySlot {
            frame: Frame::BLANK,
            brightness: Brightness::MAX,
        })))
    }

    fn load(&self) -> DisplaySlot {
        self.0.lock(Cell::get)
    }

    fn update(&self, f: impl FnOnce(&mut DisplaySlot)) {
        self.0.lock(|cell| {
            let mut slot = cell.get();
            f(&mut slot);
            cell.set(slot);
        });
    }
}

/// The two writes a whole-second update is built from.
pub trait SlotWriter {
    /// Set the PWM targets.
    fn set_brightness(&self, brightness: Brightness);

    /// Make `frame` the frame to refresh.
    fn show_frame(&self, frame: Frame);
}

/// Whole-second update: force full brightness, swap in the composed `state`, then apply the
/// time-of-day policy for `state.hour`. The new frame is never shown at the previous second's
/// dimmed level.
pub fn publish_to(writer: &impl SlotWriter, state: &DisplayState) {
    writer.set_brightness(Brightness::MAX);
    writer.show_frame(Frame::compose(state));
    writer.set_brightness(Brightness::for_hour(state.hour));
}

/// A device abstraction for the nixie tubes.
///
/// Writers ([`show`](Self::show), [`publish`](Self::publish), ...) only touch the shared slot.
/// A refresher task (spawned by `Nixie::new` on hardware) re-emits the slot through software
/// PWM every 200 µs.
///
/// # Example
///
/// ```no_run
/// # #![no_std]
/// # #![no_main]
/// # #[panic_handler]
/// # fn panic(_info: &core::panic::PanicInfo) -> ! { loop {} }
/// use embassy_rp::gpio::{Level, Output};
/// use nixie_clock::{DisplayState, Nixie, NixieStatic};
///
/// async fn example(p: embassy_rp::Peripherals, spawner: embassy_executor::Spawner) -> nixie_clock::Result<()> {
///     static NIXIE_STATIC: NixieStatic = Nixie::new_static();
///     let nixie = Nixie::new(
///         &NIXIE_STATIC,
///         Output::new(p.PIN_5, Level::High),
///         Output::new(p.PIN_4, Level::Low),
///         Output::new(p.PIN_0, Level::Low),
///         spawner,
///     )?;
///
///     // 12:34 with the colon lit
///     nixie.publish(&DisplayState::new(12, 34, 1));
///     Ok(())
/// }
/// ```
#[derive(Clone, Copy)]
pub struct Nixie<'a>(&'a NixieStatic);

impl<'a> Nixie<'a> {
    /// Creates the shared slot for the display.
    #[must_use]
    pub const fn new_static() -> NixieStatic {
        NixieStatic::new()
    }

    /// A handle on a slot whose refresher is driven elsewhere (for example by
    /// [`refresh`](Self::refresh) in a caller-owned loop).
    #[must_use]
    pub const fn from_static(nixie_static: &'a NixieStatic) -> Self {
        Self(nixie_static)
    }

    /// Compose `state` and make it the frame to refresh. Brightness is unchanged.
    pub fn show(&self, state: &DisplayState) {
        self.show_frame(Frame::compose(state));
    }

    /// Make `frame` the frame to refresh.
    pub fn show_frame(&self, frame: Frame) {
        #[cfg(feature = "display-trace")]
        debug!("frame: {=u64:x}", frame.bits());
        self.0.update(|slot| slot.frame = frame);
    }

    /// Set the PWM targets.
    pub fn set_brightness(&self, brightness: Brightness) {
        self.0.update(|slot| slot.brightness = brightness);
    }

    /// Whole-second update; see [`publish_to`].
    pub fn publish(&self, state: &DisplayState) {
        publish_to(self, state);
    }

    /// Blank all tubes.
    pub fn clear(&self) {
        self.show_frame(Frame::BLANK);
    }

    /// Consistent copy of the frame and brightness.
    #[must_use]
    pub fn snapshot(&self) -> DisplaySlot {
        self.0.load()
    }

    /// One PWM tick: snapshot the slot, mask it, and shift it out.
    pub fn refresh<L, C, D>(
        &self,
        pwm: &mut PwmRefresher,
        chain: &mut ShiftRegisterChain<L, C, D>,
    ) -> Frame
    where
        L: OutputPin<Error = Infallible>,
        C: OutputPin<Error = Infallible>,
        D: OutputPin<Error = Infallible>,
    {
        let DisplaySlot { frame, brightness } = self.snapshot();
        pwm.tick(frame, brightness, chain)
    }
}

impl SlotWriter for Nixie<'_> {
    fn set_brightness(&self, brightness: Brightness) {
        Nixie::set_brightness(self, brightness);
    }

    fn show_frame(&self, frame: Frame) {
        Nixie::show_frame(self, frame);
    }
}

#[cfg(feature = "pico1")]
mod device {
    use embassy_executor::{SpawnError, Spawner};
    use embassy_rp::gpio::Output;
    use embassy_time::{Duration, Ticker};

    use super::{Nixie, NixieStatic};
    use crate::pwm::{PwmRefresher, TICK_PERIOD_MICROS};
    use crate::shift_register::ShiftRegisterChain;

    type Chain = ShiftRegisterChain<Output<'static>, Output<'static>, Output<'static>>;

    impl Nixie<'static> {
        /// Creates the display device and spawns its refresher task.
        ///
        /// # Errors
        ///
        /// Returns an error if the task cannot be spawned.
        #[must_use = "Must be used to manage the spawned task"]
        pub fn new(
            nixie_static: &'static NixieStatic,
            latch: Output<'static>,
            clock: Output<'static>,
            data: Output<'static>,
            spawner: Spawner,
        ) -> Result<Self, SpawnError> {
            let chain = ShiftRegisterChain::new(latch, clock, data);
            let token = nixie_device_loop(chain, nixie_static)?;
            spawner.spawn(token);
            Ok(Self(nixie_static))
        }
    }

    #[embassy_executor::task]
    async fn nixie_device_loop(mut chain: Chain, nixie_static: &'static NixieStatic) -> ! {
        let nixie = Nixie::from_static(nixie_static);
        let mut pwm = PwmRefresher::new();
        let mut ticker = Ticker::every(Duration::from_micros(TICK_PERIOD_MICROS));
        loop {
            nixie.refresh(&mut pwm, &mut chain);
            ticker.next().await;
        }
    }
}
