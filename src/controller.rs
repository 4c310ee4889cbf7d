//! Time and timezone controller.
//!
//! See [`Controller`] for the state machine. Networking, NTP and the reset line are
//! collaborators behind the [`Network`], [`HttpClient`], [`NtpClient`] and [`System`] traits so
//! the same logic runs on the Pico W and in host tests.

use embassy_futures::select::{Either, select};
use embedded_hal_async::delay::DelayNs;

use crate::animation::provisioning_animation;
use crate::http::STATUS_OK;
use crate::never::Never;
use crate::nixie::Nixie;
use crate::passcode::Passcode;
use crate::timezone::{self, TimezoneConfig, TimezoneLease};
use crate::unix_seconds::UnixSeconds;
use crate::{Error, Result};

/// SSID of the provisioning access point.
pub const AP_SSID: &str = "Nixie Clock";

/// mDNS host name (`nixie.local`).
pub const MDNS_HOST_NAME: &str = "nixie";

/// NTP pool queried for wall-clock time.
pub const NTP_SERVER: &str = "pool.ntp.org";

/// NTP poll interval.
pub const NTP_POLL_INTERVAL_SECS: u32 = 63;

/// Hold before a restart so the log and the display settle.
pub const REBOOT_HOLD_MS: u32 = 5_000;

/// How often [`Controller::run`] looks at the NTP clock.
pub const CLOCK_POLL_MS: u32 = 50;

/// Longest wait at boot for the first NTP sync before the first lease is taken without it.
pub const NTP_SYNC_TIMEOUT_MS: u32 = 30_000;

/// Largest timezone response body kept.
pub const BODY_CAPACITY: usize = 1024;

/// Station-mode WiFi with a provisioning fallback.
#[expect(async_fn_in_trait, reason = "single-threaded executor; futures need not be Send")]
pub trait Network {
    /// Whether station mode is up.
    fn is_connected(&self) -> bool;

    /// Join with stored credentials, or raise the access point `ap_ssid` protected by
    /// `ap_password` and wait until a station connects and credentials are saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be brought up.
    async fn auto_connect(&mut self, ap_ssid: &str, ap_password: &str) -> Result<()>;

    /// Advertise `host_name.local`.
    ///
    /// # Errors
    ///
    /// Returns an error if the responder cannot start. Callers treat this as non-fatal.
    fn start_mdns(&mut self, host_name: &str) -> Result<()>;
}

/// Plain HTTP GET.
#[expect(async_fn_in_trait, reason = "single-threaded executor; futures need not be Send")]
pub trait HttpClient {
    /// GET `url`, writing the body into `body`. Returns the status code and body length.
    ///
    /// # Errors
    ///
    /// Returns an error on DNS, connection, timeout or framing failures.
    async fn get(&mut self, url: &str, body: &mut [u8]) -> Result<(u16, usize)>;
}

/// Network time source.
pub trait NtpClient {
    /// Begin synchronizing against `server`, polling every `poll_interval_secs`.
    fn start(&mut self, server: &'static str, poll_interval_secs: u32);

    /// Current UTC time, or `None` until the first successful sync.
    fn now(&self) -> Option<UnixSeconds>;

    /// Display timezone, as whole hours plus residual seconds.
    fn set_timezone(&mut self, hours: i32, residual_seconds: i32);
}

/// Board services.
pub trait System {
    /// Entropy for the provisioning passcode.
    fn random(&mut self) -> u64;

    /// Reset the board.
    fn restart(&mut self);
}

/// Where the controller is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    Boot,
    Provisioning,
    Syncing,
    Running,
    Reboot,
}

/// Drives WiFi acquisition, keeps the timezone lease current, and publishes the local time to
/// the tubes once per second.
///
/// ```text
/// Boot ──► Provisioning ──► Syncing ──► Running ──► Reboot
///                                        ▲   │
///                                        └───┘ lease renewed
/// ```
///
/// Any failed renewal that is required (at boot or on expiry) holds for five seconds and
/// restarts the board; there is no degraded mode.
pub struct Controller<'a, N, H, T, S, D> {
    nixie: Nixie<'a>,
    network: N,
    http: H,
    ntp: T,
    system: S,
    delay: D,
    config: TimezoneConfig,
    state: ControllerState,
    lease: Option<TimezoneLease>,
    last_update: Option<UnixSeconds>,
}

impl<'a, N, H, T, S, D> Controller<'a, N, H, T, S, D>
where
    N: Network,
    H: HttpClient,
    T: NtpClient,
    S: System,
    D: DelayNs,
{
    pub const fn new(
        nixie: Nixie<'a>,
        network: N,
        http: H,
        ntp: T,
        system: S,
        delay: D,
        config: TimezoneConfig,
    ) -> Self {
        Self {
            nixie,
            network,
            http,
            ntp,
            system,
            delay,
            config,
            state: ControllerState::Boot,
            lease: None,
            last_update: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub const fn lease(&self) -> Option<TimezoneLease> {
        self.lease
    }

    /// Last second published to the tubes.
    #[must_use]
    pub const fn last_update(&self) -> Option<UnixSeconds> {
        self.last_update
    }

    /// Bring up WiFi (showing the passcode animation meanwhile), start NTP, wait briefly for its
    /// first sync, and take the first timezone lease.
    ///
    /// # Errors
    ///
    /// Returns the failure that caused a restart to be requested.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.state = ControllerState::Provisioning;
        let passcode = Passcode::from_random(self.system.random());
        let password = passcode.ap_password()?;
        info!("provisioning passcode {}", passcode);

        let connected = {
            let nixie = self.nixie;
            match select(
                self.network.auto_connect(AP_SSID, &password),
                provisioning_animation(&nixie, passcode, &mut self.delay),
            )
            .await
            {
                Either::First(result) => result,
                Either::Second(never) => match never {},
            }
        };
        self.nixie.clear();
        if let Err(err) = connected {
            return Err(self.fail(err).await);
        }

        self.state = ControllerState::Syncing;
        if let Err(err) = self.network.start_mdns(MDNS_HOST_NAME) {
            warn!("mDNS responder failed to start: {}", err);
        }
        self.ntp.start(NTP_SERVER, NTP_POLL_INTERVAL_SECS);

        let now = self.wait_for_ntp().await;
        match self.renew(now).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Fetch a fresh lease and program the NTP client's display timezone.
    ///
    /// # Errors
    ///
    /// WiFi down, transport failure, a non-200 status, or an unusable body. The lease is left
    /// unchanged on error.
    pub async fn renew_timezone(&mut self) -> Result<TimezoneLease> {
        let now = self.ntp.now();
        self.renew(now).await
    }

    /// Whole-second update: renew the lease if it has ended, then publish local time.
    ///
    /// # Errors
    ///
    /// A required renewal failed; the board has been asked to restart and the state is
    /// [`ControllerState::Reboot`].
    pub async fn tick_second(&mut self, now: UnixSeconds) -> Result<ControllerState> {
        let lease = match self.lease {
            Some(lease) if lease.is_valid_at(now) => {
                debug!(
                    "timezone lease valid for {} s",
                    lease.valid_until.as_i64() - now.as_i64()
                );
                lease
            }
            _ => {
                info!("timezone lease no longer valid, renewing");
                match self.renew(Some(now)).await {
                    Ok(lease) => lease,
                    Err(err) => return Err(self.fail(err).await),
                }
            }
        };

        match lease.local_state(now) {
            Some(state) => {
                debug!(
                    "local time {}:{}:{}",
                    state.hour,
                    state.minute,
                    state.second
                );
                self.nixie.publish(&state);
            }
            None => warn!("time {} is outside the calendar range", now.as_i64()),
        }
        self.last_update = Some(now);
        Ok(self.state)
    }

    /// Follow the NTP clock forever, calling [`tick_second`](Self::tick_second) whenever the
    /// second changes.
    ///
    /// # Errors
    ///
    /// Returns once a restart has been requested.
    pub async fn run(&mut self) -> Result<Never> {
        loop {
            match self.ntp.now() {
                Some(now) if self.last_update != Some(now) => {
                    self.tick_second(now).await?;
                }
                _ => {}
            }
            self.delay.delay_ms(CLOCK_POLL_MS).await;
        }
    }

    /// The first synced time, or `None` after [`NTP_SYNC_TIMEOUT_MS`]. The lease needs a clock
    /// to be clamped and to size leases for zones without transitions.
    async fn wait_for_ntp(&mut self) -> Option<UnixSeconds> {
        let mut waited_ms = 0u32;
        loop {
            if let Some(now) = self.ntp.now() {
                return Some(now);
            }
            if waited_ms >= NTP_SYNC_TIMEOUT_MS {
                warn!("no NTP sync after {} ms; taking the lease as given", waited_ms);
                return None;
            }
            self.delay.delay_ms(CLOCK_POLL_MS).await;
            waited_ms = waited_ms.saturating_add(CLOCK_POLL_MS);
        }
    }

    async fn renew(&mut self, now: Option<UnixSeconds>) -> Result<TimezoneLease> {
        if !self.network.is_connected() {
            return Err(Error::WifiUnavailable);
        }

        let url = self.config.url()?;
        let mut body = [0u8; BODY_CAPACITY];
        let (status, len) = self.http.get(&url, &mut body).await?;
        if status != STATUS_OK {
            warn!("timezone request failed with status {}", status);
            return Err(Error::HttpStatus(status));
        }
        let body = body.get(..len).ok_or(Error::HttpResponseMalformed)?;
        let lease = timezone::parse_response(body, now)?;

        let (hours, residual_seconds) = lease.ntp_timezone();
        self.ntp.set_timezone(hours, residual_seconds);
        self.lease = Some(lease);
        if self.state == ControllerState::Syncing {
            self.state = ControllerState::Running;
        }
        info!(
            "timezone lease: offset {} s, dst {}, until {}",
            lease.offset_seconds,
            lease.dst_in_effect,
            lease.valid_until.as_i64()
        );
        Ok(lease)
    }

    /// Log, hold, and request a restart. Returns `err` for the caller to propagate.
    async fn fail(&mut self, err: Error) -> Error {
        error!("{}; rebooting in 5 seconds", err);
        self.delay.delay_ms(REBOOT_HOLD_MS).await;
        self.state = ControllerState::Reboot;
        self.system.restart();
        err
    }
}
