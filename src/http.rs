//! Minimal HTTP/1.x response framing.

use crate::{Error, Result};

/// `200 OK`
pub const STATUS_OK: u16 = 200;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Split a complete HTTP/1.x response into its status code and body.
///
/// The request side uses HTTP/1.0 without keep-alive, so the body is everything after the
/// header block up to the end of the buffer.
///
/// # Errors
///
/// Returns [`Error::HttpResponseMalformed`] if the header block is unterminated or the status
/// line is not `HTTP/1.x <3-digit code> ...`.
pub fn parse_response(response: &[u8]) -> Result<(u16, &[u8])> {
    let header_len = find(response, HEADER_END).ok_or(Error::HttpResponseMalformed)?;
    let (head, rest) = response.split_at(header_len);
    let body = rest.get(HEADER_END.len()..).unwrap_or_default();

    let status_line = head.split(|&b| b == b'\n').next().unwrap_or_default();
    let mut fields = status_line
        .split(|&b| b == b' ')
        .filter(|field| !field.is_empty());

    let version = fields.next().ok_or(Error::HttpResponseMalformed)?;
    if !version.starts_with(b"HTTP/1.") {
        return Err(Error::HttpResponseMalformed);
    }
    let code = fields.next().ok_or(Error::HttpResponseMalformed)?;
    Ok((parse_status(code)?, body))
}

/// Split `http://host[:port]/path` into (host, port, path). The path keeps its leading `/`
/// and defaults to `/`.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] for other schemes, an empty host, or a bad port.
pub fn split_url(url: &str) -> Result<(&str, u16, &str)> {
    let rest = url.strip_prefix("http://").ok_or(Error::InvalidUrl)?;
    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, "/"),
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| Error::InvalidUrl)?),
        None => (authority, 80),
    };
    if host.is_empty() {
        return Err(Error::InvalidUrl);
    }
    Ok((host, port, path))
}

fn parse_status(code: &[u8]) -> Result<u16> {
    let code = code.strip_suffix(b"\r").unwrap_or(code);
    let [a, b, c] = code else {
        return Err(Error::HttpResponseMalformed);
    };
    if !(a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit()) {
        return Err(Error::HttpResponseMalformed);
    }
    Ok(u16::from(a - b'0') * 100 + u16::from(b - b'0') * 10 + u16::from(c - b'0'))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::{parse_response, split_url};
    use crate::Error;

    #[test]
    fn splits_url() {
        assert_eq!(
            split_url("http://api.timezonedb.com/v2.1/get-time-zone?format=json"),
            Ok(("api.timezonedb.com", 80, "/v2.1/get-time-zone?format=json"))
        );
        assert_eq!(split_url("http://localhost:8080"), Ok(("localhost", 8080, "/")));
        assert_eq!(split_url("https://example.com/"), Err(Error::InvalidUrl));
        assert_eq!(split_url("http:///path"), Err(Error::InvalidUrl));
    }

    #[test]
    fn splits_status_and_body() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"status\":\"OK\"}";
        let (status, body) = parse_response(response).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, b"{\"status\":\"OK\"}");
    }

    #[test]
    fn reports_error_status() {
        let (status, body) = parse_response(b"HTTP/1.0 500 Internal Server Error\r\n\r\n").unwrap();
        assert_eq!(status, 500);
        assert!(body.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_response(b"SSH-2.0-OpenSSH\r\n\r\n"),
            Err(Error::HttpResponseMalformed)
        );
        assert_eq!(
            parse_response(b"HTTP/1.1 2x0 OK\r\n\r\n"),
            Err(Error::HttpResponseMalformed)
        );
        assert_eq!(
            parse_response(b"HTTP/1.1 200 OK\r\n"),
            Err(Error::HttpResponseMalformed)
        );
    }
}
