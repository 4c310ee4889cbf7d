//! A device abstraction for Network Time Protocol (NTP) time synchronization over WiFi.
//!
//! See [`NtpClock`] for usage.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use embassy_executor::Spawner;
use embassy_net::{Stack, dns, udp};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use portable_atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

use crate::Result;
use crate::controller::NtpClient;
use crate::unix_seconds::UnixSeconds;
use crate::wifi::Wifi;

const NTP_PORT: u16 = 123;
const RETRY_DELAYS_SECS: [u64; 4] = [2, 5, 10, 30];

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy)]
struct SyncRequest {
    server: &'static str,
    poll_interval_secs: u32,
}

/// Static for the [`NtpClock`] device.
pub struct NtpClockStatic {
    requests: Signal<CriticalSectionRawMutex, SyncRequest>,
    synced: AtomicBool,
    // unix seconds at boot, as of the last sync
    boot_unix_seconds: AtomicI64,
    timezone_seconds: AtomicI32,
}

impl NtpClockStatic {
    fn now(&self) -> Option<UnixSeconds> {
        if !self.synced.load(Ordering::Acquire) {
            return None;
        }
        let boot = self.boot_unix_seconds.load(Ordering::Acquire);
        let uptime = i64::try_from(Instant::now().as_secs()).ok()?;
        Some(UnixSeconds(boot.saturating_add(uptime)))
    }

    /// [`now`](Self::now) shifted by the display timezone.
    fn local_now(&self) -> Option<UnixSeconds> {
        let offset = self.timezone_seconds.load(Ordering::Relaxed);
        self.now().map(|now| now.saturating_add(i64::from(offset)))
    }
}

// ============================================================================
// NtpClock Virtual Device
// ============================================================================

/// UTC wall clock kept in step with an NTP server.
///
/// Between polls the clock runs on the embassy time driver; each successful poll re-anchors
/// the boot time. [`NtpClient::now`] is `None` until the first sync.
///
/// # Sync Timing
///
/// - **After `start`**: sync immediately; on failure retry after 2 s, 5 s, 10 s, then every 30 s.
/// - **Steady state**: poll every `poll_interval_secs` (63 s for the clock).
///
/// # Example
///
/// ```no_run
/// # #![no_std]
/// # #![no_main]
/// # use panic_probe as _;
/// use nixie_clock::NtpClient as _;
/// use nixie_clock::time_sync::{NtpClock, NtpClockStatic};
///
/// fn example(wifi: nixie_clock::wifi::Wifi, spawner: embassy_executor::Spawner) -> nixie_clock::Result<()> {
///     static NTP_CLOCK_STATIC: NtpClockStatic = NtpClock::new_static();
///     let mut clock = NtpClock::new(&NTP_CLOCK_STATIC, wifi, spawner)?;
///     clock.start("pool.ntp.org", 63);
///     Ok(())
/// }
/// ```
pub struct NtpClock {
    ntp_clock_static: &'static NtpClockStatic,
}

impl NtpClock {
    /// Create [`NtpClock`] resources.
    #[must_use]
    pub const fn new_static() -> NtpClockStatic {
        NtpClockStatic {
            requests: Signal::new(),
            synced: AtomicBool::new(false),
            boot_unix_seconds: AtomicI64::new(0),
            timezone_seconds: AtomicI32::new(0),
        }
    }

    /// Create the clock and spawn its sync task. Nothing is sent until [`NtpClient::start`]
    /// and the WiFi network stack is up.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be spawned.
    pub fn new(
        ntp_clock_static: &'static NtpClockStatic,
        wifi: Wifi,
        spawner: Spawner,
    ) -> Result<Self> {
        let token = time_sync_loop(wifi, ntp_clock_static)?;
        spawner.spawn(token);
        Ok(Self { ntp_clock_static })
    }
}

impl NtpClient for NtpClock {
    fn start(&mut self, server: &'static str, poll_interval_secs: u32) {
        self.ntp_clock_static.requests.signal(SyncRequest {
            server,
            poll_interval_secs,
        });
    }

    fn now(&self) -> Option<UnixSeconds> {
        self.ntp_clock_static.now()
    }

    fn set_timezone(&mut self, hours: i32, residual_seconds: i32) {
        let offset = hours
            .saturating_mul(3600)
            .saturating_add(residual_seconds);
        self.ntp_clock_static
            .timezone_seconds
            .store(offset, Ordering::Relaxed);
    }
}

#[embassy_executor::task]
async fn time_sync_loop(wifi: Wifi, ntp_clock_static: &'static NtpClockStatic) -> ! {
    let SyncRequest {
        server,
        poll_interval_secs,
    } = ntp_clock_static.requests.wait().await;
    let stack = wifi.stack().await;
    info!("NTP sync against {} every {} s", server, poll_interval_secs);

    let mut failures = 0usize;
    loop {
        let delay_secs = match fetch_ntp_time(stack, server).await {
            Ok((unix_seconds, received_at)) => {
                let uptime = i64::try_from(received_at.as_secs()).unwrap_or(i64::MAX);
                ntp_clock_static
                    .boot_unix_seconds
                    .store(unix_seconds.as_i64().saturating_sub(uptime), Ordering::Release);
                ntp_clock_static.synced.store(true, Ordering::Release);
                debug!(
                    "NTP sync: unix_seconds={} local_seconds={}",
                    unix_seconds.as_i64(),
                    ntp_clock_static.local_now().map_or(0, UnixSeconds::as_i64)
                );
                failures = 0;
                u64::from(poll_interval_secs)
            }
            Err(e) => {
                let delay = RETRY_DELAYS_SECS
                    .get(failures)
                    .or(RETRY_DELAYS_SECS.last())
                    .copied()
                    .unwrap_or(u64::from(poll_interval_secs));
                warn!("NTP sync failed: {}; retrying in {} s", e, delay);
                failures = failures.saturating_add(1);
                delay
            }
        };
        Timer::after_secs(delay_secs).await;
    }
}

// ============================================================================
// Network - Network Time Protocol (NTP) Fetch
// ============================================================================

async fn fetch_ntp_time(
    stack: Stack<'static>,
    server: &str,
) -> core::result::Result<(UnixSeconds, Instant), &'static str> {
    use dns::DnsQueryType;
    use udp::UdpSocket;

    let dns_result = stack
        .dns_query(server, DnsQueryType::A)
        .await
        .map_err(|e| {
            warn!("DNS lookup failed: {:?}", e);
            "DNS lookup failed"
        })?;
    let server_addr = dns_result.first().ok_or("No DNS results")?;

    let mut rx_meta = [udp::PacketMetadata::EMPTY; 1];
    let mut rx_buffer = [0; 128];
    let mut tx_meta = [udp::PacketMetadata::EMPTY; 1];
    let mut tx_buffer = [0; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    socket.bind(0).map_err(|e| {
        warn!("Socket bind failed: {:?}", e);
        "Socket bind failed"
    })?;

    // 48 bytes, LI=0, VN=3, Mode=3 (client)
    let mut ntp_request = [0u8; 48];
    ntp_request[0] = 0x1B;

    socket
        .send_to(&ntp_request, (*server_addr, NTP_PORT))
        .await
        .map_err(|e| {
            warn!("NTP send failed: {:?}", e);
            "NTP send failed"
        })?;

    let mut response = [0u8; 48];
    let (n, _from) =
        embassy_time::with_timeout(Duration::from_secs(5), socket.recv_from(&mut response))
            .await
            .map_err(|_| "NTP receive timeout")?
            .map_err(|e| {
                warn!("NTP receive failed: {:?}", e);
                "NTP receive failed"
            })?;
    let received_at = Instant::now();

    if n < 48 {
        return Err("NTP response too short");
    }

    // Transmit timestamp, seconds part (bytes 40-43, big-endian)
    let ntp_seconds =
        u32::from_be_bytes([response[40], response[41], response[42], response[43]]);

    let unix_time = UnixSeconds::from_ntp_seconds(ntp_seconds).ok_or("Invalid NTP timestamp")?;
    Ok((unix_time, received_at))
}
