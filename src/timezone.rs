//! Timezone lease from the timezonedb.com API.
//!
//! A lease is the (dst flag, UTC offset, expiry) triple returned for the configured zone. It
//! stays authoritative until its expiry, which the service sets to the next DST transition.

use core::fmt::Write as _;

use heapless::String;
use serde::Deserialize;
use time::UtcOffset;

use crate::frame::DisplayState;
use crate::unix_seconds::UnixSeconds;
use crate::{Error, Result};

/// Capacity of the request URL buffer.
pub const URL_CAPACITY: usize = 256;

/// Host serving the timezone API.
pub const TIMEZONE_HOST: &str = "api.timezonedb.com";

const SECONDS_PER_HOUR: i32 = 3600;

/// API key and zone name, fixed at build time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimezoneConfig {
    pub api_key: &'static str,
    pub zone: &'static str,
}

impl TimezoneConfig {
    /// `TZDB_API_KEY` and `TIMEZONE_NAME` as exported by `build.rs`.
    #[must_use]
    pub const fn from_build_env() -> Self {
        Self {
            api_key: env!("TZDB_API_KEY"),
            zone: env!("TIMEZONE_NAME"),
        }
    }

    /// The `get-time-zone` request URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UrlTooLong`] if the key and zone do not fit in [`URL_CAPACITY`].
    pub fn url(&self) -> Result<String<URL_CAPACITY>> {
        let mut url = String::new();
        write!(
            url,
            "http://{TIMEZONE_HOST}/v2.1/get-time-zone?format=json&key={}&by=zone&zone={}",
            self.api_key, self.zone
        )
        .map_err(|_| Error::UrlTooLong)?;
        Ok(url)
    }
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self::from_build_env()
    }
}

/// Local-time offset and how long it stays correct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimezoneLease {
    pub dst_in_effect: bool,
    pub offset_seconds: i32,
    pub valid_until: UnixSeconds,
}

impl TimezoneLease {
    /// Largest accepted `|gmtOffset|`.
    pub const MAX_OFFSET_SECONDS: i32 = 14 * SECONDS_PER_HOUR;

    /// Longest accepted lease.
    pub const MAX_LEASE_SECONDS: i64 = 400 * UnixSeconds::DAY;

    /// Lease length for zones without transitions (`zoneEnd` null or 0).
    pub const STEADY_ZONE_LEASE_SECONDS: i64 = UnixSeconds::DAY;

    /// Whether the offset is still authoritative at `now`.
    #[must_use]
    pub const fn is_valid_at(&self, now: UnixSeconds) -> bool {
        now.as_i64() < self.valid_until.as_i64()
    }

    /// Offset as (whole hours, residual seconds), the split the NTP client takes.
    #[must_use]
    pub const fn ntp_timezone(&self) -> (i32, i32) {
        (
            self.offset_seconds / SECONDS_PER_HOUR,
            self.offset_seconds % SECONDS_PER_HOUR,
        )
    }

    /// Local hour, minute and second at `now`, with no dots.
    #[must_use]
    pub fn local_state(&self, now: UnixSeconds) -> Option<DisplayState> {
        let offset = UtcOffset::from_whole_seconds(self.offset_seconds).ok()?;
        let local = now.to_offset_datetime(offset)?;
        Some(DisplayState::new(
            local.hour(),
            local.minute(),
            local.second(),
        ))
    }
}

#[derive(Deserialize)]
struct TimezoneResponse<'a> {
    status: &'a str,
    #[serde(default)]
    dst: &'a str,
    #[serde(rename = "gmtOffset")]
    gmt_offset: i32,
    #[serde(rename = "zoneEnd", default)]
    zone_end: Option<i64>,
}

/// Parse a `get-time-zone` JSON body into a lease.
///
/// `now` bounds the lease: a missing `zoneEnd` means `now + 1 day`, a far one is clamped to
/// `now + 400 days`, and a lease that has already ended is refused. Without `now` (NTP not yet
/// synchronized) `zoneEnd` is taken as given and a missing one yields a lease that is due at
/// the first whole-second update.
///
/// # Errors
///
/// [`Error::JsonParse`] for malformed JSON, [`Error::TimezoneStatus`] if `status` is not
/// `"OK"`, [`Error::LeaseRejected`] for an offset beyond ±14 h, and [`Error::LeaseExpired`]
/// for a lease ending at or before `now`.
pub fn parse_response(body: &[u8], now: Option<UnixSeconds>) -> Result<TimezoneLease> {
    let (response, _) = serde_json_core::from_slice::<TimezoneResponse<'_>>(body)?;

    if response.status != "OK" {
        return Err(Error::TimezoneStatus);
    }

    let offset_seconds = response.gmt_offset;
    if offset_seconds.unsigned_abs() > TimezoneLease::MAX_OFFSET_SECONDS.unsigned_abs() {
        return Err(Error::LeaseRejected(offset_seconds));
    }

    let zone_end = response.zone_end.filter(|&end| end > 0);
    let valid_until = match (zone_end, now) {
        (Some(end), Some(now)) => {
            UnixSeconds(end.min(now.saturating_add(TimezoneLease::MAX_LEASE_SECONDS).as_i64()))
        }
        (Some(end), None) => UnixSeconds(end),
        (None, Some(now)) => now.saturating_add(TimezoneLease::STEADY_ZONE_LEASE_SECONDS),
        (None, None) => UnixSeconds(0),
    };

    let lease = TimezoneLease {
        dst_in_effect: response.dst == "1",
        offset_seconds,
        valid_until,
    };

    if now.is_some_and(|now| !lease.is_valid_at(now)) {
        return Err(Error::LeaseExpired);
    }

    Ok(lease)
}
