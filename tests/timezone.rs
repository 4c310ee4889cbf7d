//! Host-level tests for the timezone lease: request URL, response parsing, and hardening.

use nixie_clock::timezone::parse_response;
use nixie_clock::{DisplayState, Error, TimezoneConfig, TimezoneLease, UnixSeconds};

const NOW: UnixSeconds = UnixSeconds(1_720_000_000); // 2024-07-03 09:46:40 UTC
const BERLIN_DST_END: i64 = 1_729_990_800; // 2024-10-27 01:00:00 UTC

const BERLIN_SUMMER: &str = r#"{"status":"OK","message":"","countryCode":"DE","countryName":"Germany","regionName":"","cityName":"","zoneName":"Europe/Berlin","abbreviation":"CEST","gmtOffset":7200,"dst":"1","zoneStart":1711846800,"zoneEnd":1729990800,"nextAbbreviation":"CET","timestamp":1720007200,"formatted":"2024-07-03 11:46:40"}"#;

fn body(gmt_offset: i64, dst: &str, zone_end: &str) -> String {
    format!(
        r#"{{"status":"OK","message":"","gmtOffset":{gmt_offset},"dst":"{dst}","zoneEnd":{zone_end}}}"#
    )
}

// ============================================================================
// Request URL
// ============================================================================

#[test]
fn url_carries_key_and_zone() {
    let config = TimezoneConfig {
        api_key: "ABC123",
        zone: "Europe/Berlin",
    };
    assert_eq!(
        config.url().unwrap().as_str(),
        "http://api.timezonedb.com/v2.1/get-time-zone?format=json&key=ABC123&by=zone&zone=Europe/Berlin"
    );
}

#[test]
fn oversized_key_is_refused() {
    let config = TimezoneConfig {
        api_key: Box::leak("k".repeat(300).into_boxed_str()),
        zone: "Europe/Berlin",
    };
    assert_eq!(config.url(), Err(Error::UrlTooLong));
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn parses_a_full_timezonedb_body() {
    let lease = parse_response(BERLIN_SUMMER.as_bytes(), Some(NOW)).unwrap();
    assert_eq!(
        lease,
        TimezoneLease {
            dst_in_effect: true,
            offset_seconds: 7200,
            valid_until: UnixSeconds(BERLIN_DST_END),
        }
    );
}

#[test]
fn parses_negative_offsets_without_dst() {
    let lease = parse_response(body(-18_000, "0", "1741503600").as_bytes(), Some(NOW)).unwrap();
    assert!(!lease.dst_in_effect);
    assert_eq!(lease.offset_seconds, -18_000);
    assert_eq!(lease.ntp_timezone(), (-5, 0));
}

#[test]
fn failed_status_is_refused() {
    let failed = r#"{"status":"FAILED","message":"Invalid API key.","gmtOffset":0,"dst":"0","zoneEnd":0}"#;
    assert_eq!(
        parse_response(failed.as_bytes(), Some(NOW)),
        Err(Error::TimezoneStatus)
    );

    let bare = r#"{"status":"FAILED","message":"Record not found."}"#;
    assert!(parse_response(bare.as_bytes(), Some(NOW)).is_err());
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert_eq!(
        parse_response(b"<html>502 Bad Gateway</html>", Some(NOW)),
        Err(Error::JsonParse)
    );
    assert_eq!(
        parse_response(br#"{"status":"OK","gmtOffset":"7200"}"#, Some(NOW)),
        Err(Error::JsonParse)
    );
}

// ============================================================================
// Hardening
// ============================================================================

#[test]
fn offsets_beyond_fourteen_hours_are_rejected() {
    let limit = TimezoneLease::MAX_OFFSET_SECONDS;
    assert!(parse_response(body(i64::from(limit), "0", "0").as_bytes(), Some(NOW)).is_ok());
    assert!(parse_response(body(-i64::from(limit), "0", "0").as_bytes(), Some(NOW)).is_ok());
    assert_eq!(
        parse_response(body(i64::from(limit) + 1, "0", "0").as_bytes(), Some(NOW)),
        Err(Error::LeaseRejected(limit + 1))
    );
    assert_eq!(
        parse_response(body(-54_000, "0", "0").as_bytes(), Some(NOW)),
        Err(Error::LeaseRejected(-54_000))
    );
}

#[test]
fn far_zone_end_is_clamped_to_400_days() {
    let far = (NOW.as_i64() + 5 * 365 * UnixSeconds::DAY).to_string();
    let lease = parse_response(body(3600, "0", &far).as_bytes(), Some(NOW)).unwrap();
    assert_eq!(
        lease.valid_until,
        NOW.saturating_add(TimezoneLease::MAX_LEASE_SECONDS)
    );
}

#[test]
fn zone_without_transitions_gets_a_day() {
    for zone_end in ["0", "null"] {
        let lease = parse_response(body(0, "0", zone_end).as_bytes(), Some(NOW)).unwrap();
        assert_eq!(lease.valid_until, NOW.saturating_add(UnixSeconds::DAY));
    }
    let missing = r#"{"status":"OK","gmtOffset":19800,"dst":"0"}"#;
    let lease = parse_response(missing.as_bytes(), Some(NOW)).unwrap();
    assert_eq!(lease.valid_until, NOW.saturating_add(UnixSeconds::DAY));
    assert_eq!(lease.ntp_timezone(), (5, 1800));
}

#[test]
fn lease_ending_now_is_expired() {
    let at_now = NOW.as_i64().to_string();
    assert_eq!(
        parse_response(body(3600, "0", &at_now).as_bytes(), Some(NOW)),
        Err(Error::LeaseExpired)
    );
    let before = (NOW.as_i64() - 1).to_string();
    assert_eq!(
        parse_response(body(3600, "0", &before).as_bytes(), Some(NOW)),
        Err(Error::LeaseExpired)
    );
}

#[test]
fn without_a_clock_zone_end_is_taken_as_given() {
    let lease = parse_response(body(7200, "1", "1000").as_bytes(), None).unwrap();
    assert_eq!(lease.valid_until, UnixSeconds(1000));

    let lease = parse_response(body(7200, "1", "null").as_bytes(), None).unwrap();
    assert_eq!(lease.valid_until, UnixSeconds(0));
    assert!(!lease.is_valid_at(UnixSeconds(0)));
}

// ============================================================================
// Local time
// ============================================================================

#[test]
fn lease_is_valid_strictly_before_its_end() {
    let lease = TimezoneLease {
        dst_in_effect: true,
        offset_seconds: 7200,
        valid_until: UnixSeconds(BERLIN_DST_END),
    };
    assert!(lease.is_valid_at(UnixSeconds(BERLIN_DST_END - 1)));
    assert!(!lease.is_valid_at(UnixSeconds(BERLIN_DST_END)));
}

#[test]
fn local_state_applies_the_offset() {
    let summer = TimezoneLease {
        dst_in_effect: true,
        offset_seconds: 7200,
        valid_until: UnixSeconds(BERLIN_DST_END),
    };
    assert_eq!(summer.local_state(NOW), Some(DisplayState::new(11, 46, 40)));

    let new_york = TimezoneLease {
        dst_in_effect: true,
        offset_seconds: -4 * 3600,
        valid_until: UnixSeconds(BERLIN_DST_END),
    };
    assert_eq!(new_york.local_state(NOW), Some(DisplayState::new(5, 46, 40)));

    let kolkata = TimezoneLease {
        dst_in_effect: false,
        offset_seconds: 19_800,
        valid_until: UnixSeconds(BERLIN_DST_END),
    };
    // 23:59:59 UTC is 05:29:59 the next day
    assert_eq!(
        kolkata.local_state(UnixSeconds(1_719_964_799)),
        Some(DisplayState::new(5, 29, 59))
    );
}

#[test]
fn ntp_seconds_convert_to_unix_seconds() {
    assert_eq!(UnixSeconds::from_ntp_seconds(2_208_988_800), Some(UnixSeconds(0)));
    assert_eq!(
        UnixSeconds::from_ntp_seconds(3_928_988_800),
        Some(UnixSeconds(1_720_000_000))
    );
    assert_eq!(UnixSeconds::from_ntp_seconds(0), None);
}
