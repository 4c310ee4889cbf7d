//! Captive-portal side of WiFi provisioning: the credential form served on the access point
//! and the parsing of what comes back.
//!
//! The HTTP server task that drives this lives with the radio in `wifi`; everything here is pure
//! so host tests cover it.

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Port the portal listens on.
pub const PORTAL_PORT: u16 = 80;

/// Largest request the portal reads.
pub const REQUEST_CAPACITY: usize = 1024;

const HEADER_END: &str = "\r\n\r\n";

/// Station credentials, as collected by the portal and kept in flash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String<32>,
    /// Empty for an open network.
    pub password: String<64>,
}

impl WifiCredentials {
    /// # Errors
    ///
    /// Returns [`Error::ProvisioningFailed`] if the SSID is empty or either field is too long.
    pub fn new(ssid: &str, password: &str) -> Result<Self> {
        if ssid.is_empty() {
            return Err(Error::ProvisioningFailed);
        }
        Ok(Self {
            ssid: String::try_from(ssid).map_err(|()| Error::ProvisioningFailed)?,
            password: String::try_from(password).map_err(|()| Error::ProvisioningFailed)?,
        })
    }
}

/// What the portal does with one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortalReply {
    /// Serve the credential form.
    Form,
    /// A complete submission; store it and restart.
    Saved(WifiCredentials),
    /// A submission without a usable SSID.
    Rejected,
}

impl PortalReply {
    /// The full HTTP response to send back.
    #[must_use]
    pub const fn response(&self) -> &'static str {
        match self {
            Self::Form => FORM_PAGE,
            Self::Saved(_) => SAVED_PAGE,
            Self::Rejected => REJECTED_PAGE,
        }
    }
}

/// Decide how to answer `request`. Any `POST` is a form submission; everything else gets the
/// form, which is also where phones land when they check for a captive portal.
#[must_use]
pub fn handle_request(request: &[u8]) -> PortalReply {
    let Ok(text) = core::str::from_utf8(request) else {
        return PortalReply::Rejected;
    };
    if !text.starts_with("POST ") {
        return PortalReply::Form;
    }
    let Some((_, body)) = text.split_once(HEADER_END) else {
        return PortalReply::Rejected;
    };
    parse_form(body).map_or(PortalReply::Rejected, PortalReply::Saved)
}

/// Whether `request` holds the full header block and as much body as `Content-Length` says.
#[must_use]
pub fn request_complete(request: &[u8]) -> bool {
    let Some(header_len) = request
        .windows(HEADER_END.len())
        .position(|window| window == HEADER_END.as_bytes())
    else {
        return false;
    };
    let (head, rest) = request.split_at(header_len);
    let body_len = rest.len().saturating_sub(HEADER_END.len());
    let expected = core::str::from_utf8(head)
        .ok()
        .and_then(|head| {
            head.lines().find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
        })
        .unwrap_or(0);
    body_len >= expected
}

/// Parse an `application/x-www-form-urlencoded` body with `ssid` and `password` fields.
fn parse_form(body: &str) -> Option<WifiCredentials> {
    let mut ssid: Option<String<32>> = None;
    let mut password: String<64> = String::new();
    for pair in body.trim_end_matches(['\r', '\n', '\0']).split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "ssid" => ssid = Some(url_decode(value)?),
            "password" => password = url_decode(value)?,
            _ => {}
        }
    }
    let ssid = ssid.filter(|ssid| !ssid.is_empty())?;
    Some(WifiCredentials { ssid, password })
}

/// Decode `+` and `%XX` escapes. `None` on a bad escape, invalid UTF-8, or overflow.
fn url_decode<const N: usize>(value: &str) -> Option<String<N>> {
    let mut decoded: Vec<u8, N> = Vec::new();
    let mut bytes = value.bytes();
    while let Some(byte) = bytes.next() {
        let byte = match byte {
            b'+' => b' ',
            b'%' => {
                let high = hex_value(bytes.next()?)?;
                let low = hex_value(bytes.next()?)?;
                high.wrapping_mul(16) | low
            }
            other => other,
        };
        decoded.push(byte).ok()?;
    }
    String::from_utf8(decoded).ok()
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit)
        .to_digit(16)
        .and_then(|value| u8::try_from(value).ok())
}

const FORM_PAGE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\
\r\n\
<!DOCTYPE html>\
<html>\
<head>\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Nixie Clock</title>\
<style>\
body { font-family: sans-serif; max-width: 480px; margin: 40px auto; padding: 16px; }\
input { width: 100%; padding: 10px; margin: 8px 0; box-sizing: border-box; }\
button { width: 100%; padding: 12px; background: #d2691e; color: white; border: none; }\
</style>\
</head>\
<body>\
<h1>Nixie Clock</h1>\
<p>Choose the WiFi network the clock should join.</p>\
<form method=\"POST\" action=\"/\">\
<label for=\"ssid\">Network name (SSID)</label>\
<input type=\"text\" id=\"ssid\" name=\"ssid\" maxlength=\"32\" required>\
<label for=\"password\">Password</label>\
<input type=\"password\" id=\"password\" name=\"password\" maxlength=\"64\">\
<button type=\"submit\">Save and connect</button>\
</form>\
</body>\
</html>";

const SAVED_PAGE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\
\r\n\
<!DOCTYPE html>\
<html>\
<head><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>Saved</title></head>\
<body style=\"font-family: sans-serif; text-align: center;\">\
<h1>Saved</h1>\
<p>The clock restarts and joins your network.</p>\
</body>\
</html>";

const REJECTED_PAGE: &str = "HTTP/1.1 400 Bad Request\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\
\r\n\
<!DOCTYPE html>\
<html>\
<head><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>Error</title></head>\
<body style=\"font-family: sans-serif; text-align: center;\">\
<h1>Missing network name</h1>\
<p><a href=\"/\">Try again</a></p>\
</body>\
</html>";
