//! Pico W board wiring and board services.

use embassy_rp::gpio::{Level, Output};
#[cfg(feature = "wifi")]
use embassy_rp::{Peri, peripherals::FLASH};

use crate::controller::System;
#[cfg(feature = "wifi")]
use crate::wifi::WifiPeripherals;

/// The peripherals the clock uses.
pub struct Hardware {
    /// Shift-register latch (GPIO 5).
    pub latch: Output<'static>,
    /// Shift-register clock (GPIO 4).
    pub clock: Output<'static>,
    /// Shift-register serial data (GPIO 0).
    pub data: Output<'static>,
    #[cfg(feature = "wifi")]
    pub wifi: WifiPeripherals,
    /// Flash, for the WiFi credential store.
    #[cfg(feature = "wifi")]
    pub flash: Peri<'static, FLASH>,
}

impl Default for Hardware {
    fn default() -> Self {
        let peripherals: embassy_rp::Peripherals =
            embassy_rp::init(embassy_rp::config::Config::default());

        // latch high keeps the drivers' outputs stable until the first frame
        let latch = Output::new(peripherals.PIN_5, Level::High);
        let clock = Output::new(peripherals.PIN_4, Level::Low);
        let data = Output::new(peripherals.PIN_0, Level::Low);

        Self {
            latch,
            clock,
            data,
            #[cfg(feature = "wifi")]
            wifi: WifiPeripherals {
                pin_23: peripherals.PIN_23,
                pin_24: peripherals.PIN_24,
                pin_25: peripherals.PIN_25,
                pin_29: peripherals.PIN_29,
                pio0: peripherals.PIO0,
                dma_ch0: peripherals.DMA_CH0,
            },
            #[cfg(feature = "wifi")]
            flash: peripherals.FLASH,
        }
    }
}

/// Ring-oscillator entropy and a system reset.
#[derive(Debug, Default)]
pub struct PicoSystem;

impl System for PicoSystem {
    fn random(&mut self) -> u64 {
        let mut rng = embassy_rp::clocks::RoscRng;
        rng.next_u64()
    }

    fn restart(&mut self) {
        info!("restarting");
        cortex_m::peripheral::SCB::sys_reset();
    }
}
