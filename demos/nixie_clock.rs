//! Nixie Clock - four IN-12/IN-14 tubes on a Pico W
//!
//! 1. Runs the tube self-test.
//! 2. Joins WiFi, or raises the "Nixie Clock" access point while the passcode walks on the tubes.
//!    Browse to http://192.168.4.1 on that network to save credentials.
//! 3. Starts NTP and takes a timezone lease from timezonedb.com.
//! 4. Shows local hh:mm with a blinking colon, dimmed at night.
//!
//! Run with: `cargo run --example nixie_clock --features pico1,wifi`
//!
//! Set `TZDB_API_KEY` and `TIMEZONE_NAME` in `.env`. `WIFI_SSID` and `WIFI_PASS` are optional
//! and only used when flash holds no credentials.

#![no_std]
#![no_main]
#![allow(clippy::future_not_send, reason = "single-threaded")]

use defmt::info;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_time::Delay;
use nixie_clock::animation::self_test;
use nixie_clock::credential_store::CredentialStore;
use nixie_clock::hardware::{Hardware, PicoSystem};
use nixie_clock::http_client::TcpHttpClient;
use nixie_clock::time_sync::{NtpClock, NtpClockStatic};
use nixie_clock::wifi::{Wifi, WifiStatic};
use nixie_clock::{Controller, Never, Nixie, NixieStatic, Result, TimezoneConfig};
use panic_probe as _;

// ============================================================================
// Main
// ============================================================================

#[embassy_executor::main]
pub async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    core::panic!("{err}");
}

async fn inner_main(spawner: Spawner) -> Result<Never> {
    info!("Nixie clock starting");
    let hardware = Hardware::default();

    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let nixie = Nixie::new(
        &NIXIE_STATIC,
        hardware.latch,
        hardware.clock,
        hardware.data,
        spawner,
    )?;
    self_test(&nixie, &mut Delay).await;

    static WIFI_STATIC: WifiStatic = Wifi::new_static();
    let store = CredentialStore::new(hardware.flash);
    let wifi = Wifi::new(&WIFI_STATIC, hardware.wifi, store, spawner)?;

    static NTP_CLOCK_STATIC: NtpClockStatic = NtpClock::new_static();
    let ntp = NtpClock::new(&NTP_CLOCK_STATIC, wifi, spawner)?;

    let mut controller = Controller::new(
        nixie,
        wifi,
        TcpHttpClient::new(wifi),
        ntp,
        PicoSystem,
        Delay,
        TimezoneConfig::from_build_env(),
    );
    controller.bootstrap().await?;
    info!("Nixie clock running");
    controller.run().await
}
