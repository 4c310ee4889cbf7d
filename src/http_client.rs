//! HTTP/1.0 GET over an embassy-net TCP socket.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::fmt::Write as _;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, with_timeout};
use embedded_io_async::{Read as _, Write as _};
use heapless::String;

use crate::controller::HttpClient;
use crate::http::{parse_response, split_url};
use crate::timezone::URL_CAPACITY;
use crate::wifi::Wifi;
use crate::{Error, Result};

/// Whole-request budget: DNS, connect, send and receive.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const RESPONSE_CAPACITY: usize = 2048;

/// HTTP client on the station network stack.
pub struct TcpHttpClient {
    wifi: Wifi,
}

impl TcpHttpClient {
    /// Requests wait for the WiFi network stack to come up.
    #[must_use]
    pub const fn new(wifi: Wifi) -> Self {
        Self { wifi }
    }

    async fn fetch(&self, url: &str, body: &mut [u8]) -> Result<(u16, usize)> {
        let (host, port, path) = split_url(url)?;
        let stack = self.wifi.stack().await;

        let addresses = stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("DNS lookup for {} failed: {:?}", host, e);
                Error::HttpTransport
            })?;
        let address = *addresses.first().ok_or(Error::HttpTransport)?;

        let mut rx_buffer = [0u8; 1024];
        let mut tx_buffer = [0u8; 512];
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(REQUEST_TIMEOUT));
        socket.connect((address, port)).await.map_err(|e| {
            warn!("connect to {} failed: {:?}", host, e);
            Error::HttpTransport
        })?;

        let mut request: String<{ URL_CAPACITY + 64 }> = String::new();
        write!(
            request,
            "GET {path} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n"
        )
        .map_err(|_| Error::UrlTooLong)?;
        socket
            .write_all(request.as_bytes())
            .await
            .map_err(|_| Error::HttpTransport)?;

        let mut response = [0u8; RESPONSE_CAPACITY];
        let mut len = 0;
        loop {
            let Some(free) = response.get_mut(len..) else {
                return Err(Error::HttpResponseMalformed);
            };
            if free.is_empty() {
                warn!("HTTP response exceeds {} bytes", RESPONSE_CAPACITY);
                return Err(Error::HttpResponseMalformed);
            }
            match socket.read(free).await {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(_) => return Err(Error::HttpTransport),
            }
        }
        socket.close();

        let received = response.get(..len).ok_or(Error::HttpResponseMalformed)?;
        let (status, payload) = parse_response(received)?;
        let target = body
            .get_mut(..payload.len())
            .ok_or(Error::HttpResponseMalformed)?;
        target.copy_from_slice(payload);
        Ok((status, payload.len()))
    }
}

impl HttpClient for TcpHttpClient {
    async fn get(&mut self, url: &str, body: &mut [u8]) -> Result<(u16, usize)> {
        with_timeout(REQUEST_TIMEOUT, self.fetch(url, body))
            .await
            .map_err(|_| {
                warn!("HTTP request timed out");
                Error::HttpTransport
            })?
    }
}
