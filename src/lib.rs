//! Firmware library for a four-digit nixie-tube wall clock.
//!
//! The display engine ([`pin_map`], [`frame`], [`shift_register`], [`pwm`], [`nixie`]) turns a
//! logical hour:minute state into a 48-bit frame and refreshes it with software PWM. The
//! [`controller`] keeps a timezone lease, follows NTP time, and publishes a new state once per
//! wall-clock second. [`provisioning`], [`dhcp`] and [`credential_store`] back the access point
//! that collects WiFi credentials when the clock has none.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod animation;
pub mod brightness;
pub mod controller;
pub mod credential_store;
pub mod dhcp;
mod error;
pub mod frame;
pub mod http;
pub mod mdns;
pub mod nixie;
mod never;
pub mod passcode;
pub mod pin_map;
pub mod provisioning;
pub mod pwm;
pub mod shift_register;
pub mod timezone;
mod unix_seconds;

#[cfg(feature = "pico1")]
pub mod hardware;
#[cfg(all(feature = "pico1", feature = "wifi"))]
pub mod http_client;
#[cfg(all(feature = "pico1", feature = "wifi"))]
pub mod time_sync;
#[cfg(all(feature = "pico1", feature = "wifi"))]
pub mod wifi;

// Re-export commonly used items
pub use brightness::Brightness;
pub use controller::{Controller, ControllerState, HttpClient, Network, NtpClient, System};
pub use error::{Error, Result};
pub use frame::{DisplayState, Frame};
pub use never::Never;
pub use nixie::{Nixie, NixieStatic};
pub use passcode::Passcode;
pub use pin_map::{PIN_MAP, PinMap};
pub use pwm::PwmRefresher;
pub use shift_register::ShiftRegisterChain;
pub use timezone::{TimezoneConfig, TimezoneLease};
pub use unix_seconds::UnixSeconds;
