//! PWM brightness targets and the time-of-day dimming policy.
//!
//! Levels and hours come from build-time environment variables exported by `build.rs`
//! (`NIXIE_MAX_BRIGHTNESS`, `NIXIE_LOW_BRIGHTNESS`, `NIXIE_LOW_BEGIN_HOUR`,
//! `NIXIE_LOW_END_HOUR`) and are parsed at compile time.

/// PWM ticks per brightness period, minus one. Duty is `level / (MAX_BRIGHTNESS + 1)`.
pub const MAX_BRIGHTNESS: u8 = parse_u8(env!("NIXIE_MAX_BRIGHTNESS"));

/// Night level.
pub const LOW_BRIGHTNESS: u8 = parse_u8(env!("NIXIE_LOW_BRIGHTNESS"));

/// First hour (local) of the dim period.
pub const LOW_BEGIN_HOUR: u8 = parse_u8(env!("NIXIE_LOW_BEGIN_HOUR"));

/// First hour (local) after the dim period.
pub const LOW_END_HOUR: u8 = parse_u8(env!("NIXIE_LOW_END_HOUR"));

const _: () = assert!(MAX_BRIGHTNESS > 0, "NIXIE_MAX_BRIGHTNESS must be positive");
const _: () = assert!(
    LOW_BRIGHTNESS <= MAX_BRIGHTNESS,
    "NIXIE_LOW_BRIGHTNESS must not exceed NIXIE_MAX_BRIGHTNESS"
);
const _: () = assert!(LOW_BEGIN_HOUR < 24, "NIXIE_LOW_BEGIN_HOUR must be 0..=23");
const _: () = assert!(LOW_END_HOUR < 24, "NIXIE_LOW_END_HOUR must be 0..=23");

/// Per-channel PWM targets: tube cathodes (and dots) share `digits`, the colon uses `leds`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Brightness {
    pub digits: u8,
    pub leds: u8,
}

impl Brightness {
    /// Full brightness on both channels.
    pub const MAX: Self = Self::uniform(MAX_BRIGHTNESS);

    /// Night brightness on both channels.
    pub const LOW: Self = Self::uniform(LOW_BRIGHTNESS);

    /// Both channels dark.
    pub const OFF: Self = Self::uniform(0);

    /// Same level on both channels.
    #[must_use]
    pub const fn uniform(level: u8) -> Self {
        Self {
            digits: level,
            leds: level,
        }
    }

    /// Policy for a local hour: dim from `LOW_BEGIN_HOUR` until `LOW_END_HOUR`.
    #[must_use]
    pub const fn for_hour(hour: u8) -> Self {
        if is_low_hour(hour) { Self::LOW } else { Self::MAX }
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Self::MAX
    }
}

/// Whether `hour` falls in `[LOW_BEGIN_HOUR, 24) ∪ [0, LOW_END_HOUR)`.
#[must_use]
pub const fn is_low_hour(hour: u8) -> bool {
    hour >= LOW_BEGIN_HOUR || hour < LOW_END_HOUR
}

const fn parse_u8(text: &str) -> u8 {
    let bytes = text.as_bytes();
    assert!(!bytes.is_empty(), "empty numeric build setting");
    let mut value: u16 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        assert!(byte.is_ascii_digit(), "numeric build setting must be decimal digits");
        value = value * 10 + (byte - b'0') as u16;
        assert!(value <= u8::MAX as u16, "numeric build setting must fit in u8");
        i += 1;
    }
    value as u8
}
