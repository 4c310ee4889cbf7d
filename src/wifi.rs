//! WiFi device abstraction for the Pico W's CYW43439.
//!
//! Station mode joins with the credentials saved in flash, falling back to the ones baked in at
//! build time (`WIFI_SSID`, `WIFI_PASS`). Without usable credentials the radio raises a WPA2
//! provisioning access point at 192.168.4.1 with a DHCP server and a credential form on port 80.
//! A submitted form is saved to flash and the board restarts to join the new network. If nobody
//! submits within [`PROVISIONING_TIMEOUT`], [`Network::auto_connect`] fails so the controller
//! reboots with a fresh passcode.
//!
//! See [`Wifi`] for usage.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use cyw43::JoinOptions;
use cyw43_pio::{DEFAULT_CLOCK_DIVIDER, PioSpi};
use embassy_executor::Spawner;
use embassy_net::tcp::TcpSocket;
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Stack, StackResources, StaticConfigV4};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0};
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_rp::{Peri, bind_interrupts};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::once_lock::OnceLock;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::Write as _;
use heapless::String;
use portable_atomic::{AtomicBool, Ordering};
use static_cell::StaticCell;

use crate::controller::Network;
use crate::credential_store::CredentialStore;
use crate::never::Never;
use crate::provisioning::{self, PORTAL_PORT, PortalReply, REQUEST_CAPACITY, WifiCredentials};
use crate::{Error, Result, dhcp, mdns};

/// How long the provisioning access point waits for credentials.
pub const PROVISIONING_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const WIFI_SSID: &str = env!("WIFI_SSID");
const WIFI_PASS: &str = env!("WIFI_PASS");
const MAX_JOIN_ATTEMPTS: u8 = 3;
const AP_CHANNEL: u8 = 1;
const AP_OCTETS: [u8; 4] = [192, 168, 4, 1];
const AP_ADDRESS: Ipv4Address = {
    let [a, b, c, d] = AP_OCTETS;
    Ipv4Address::new(a, b, c, d)
};
const PORTAL_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

/// Events emitted by the WiFi device loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WifiEvent {
    /// Provisioning access point is up at 192.168.4.1.
    ApReady,
    /// Joined a network and DHCP is configured.
    ClientReady,
    /// No credentials arrived in time, or they could not be saved.
    ProvisioningFailed,
}

/// The CYW43 pins, PIO block and DMA channel.
pub struct WifiPeripherals {
    pub pin_23: Peri<'static, PIN_23>,
    pub pin_24: Peri<'static, PIN_24>,
    pub pin_25: Peri<'static, PIN_25>,
    pub pin_29: Peri<'static, PIN_29>,
    pub pio0: Peri<'static, PIO0>,
    pub dma_ch0: Peri<'static, DMA_CH0>,
}

type CredentialSignal = Signal<CriticalSectionRawMutex, WifiCredentials>;

struct ApRequest {
    ssid: String<32>,
    password: String<64>,
}

/// Static for the [`Wifi`] device.
pub struct WifiStatic {
    requests: Signal<CriticalSectionRawMutex, ApRequest>,
    events: Signal<CriticalSectionRawMutex, WifiEvent>,
    submissions: CredentialSignal,
    stack: OnceLock<Stack<'static>>,
    connected: AtomicBool,
}

// ============================================================================
// WiFi Virtual Device
// ============================================================================

/// A device abstraction that brings the radio up in station or provisioning mode.
///
/// The credential store is only written when the portal receives a form.
///
/// # Example
///
/// ```no_run
/// # #![no_std]
/// # #![no_main]
/// # use panic_probe as _;
/// use nixie_clock::Network as _;
/// use nixie_clock::credential_store::CredentialStore;
/// use nixie_clock::wifi::{Wifi, WifiPeripherals, WifiStatic};
///
/// async fn example(p: embassy_rp::Peripherals, spawner: embassy_executor::Spawner) -> nixie_clock::Result<()> {
///     static WIFI_STATIC: WifiStatic = Wifi::new_static();
///     let peripherals = WifiPeripherals {
///         pin_23: p.PIN_23,
///         pin_24: p.PIN_24,
///         pin_25: p.PIN_25,
///         pin_29: p.PIN_29,
///         pio0: p.PIO0,
///         dma_ch0: p.DMA_CH0,
///     };
///     let store = CredentialStore::new(p.FLASH);
///     let mut wifi = Wifi::new(&WIFI_STATIC, peripherals, store, spawner)?;
///     wifi.auto_connect("Nixie Clock", "04270427").await?;
///     let _stack = wifi.stack().await;
///     Ok(())
/// }
/// ```
#[derive(Clone, Copy)]
pub struct Wifi {
    wifi_static: &'static WifiStatic,
    spawner: Spawner,
}

impl Wifi {
    /// Create the static resources for [`Wifi::new`].
    #[must_use]
    pub const fn new_static() -> WifiStatic {
        WifiStatic {
            requests: Signal::new(),
            events: Signal::new(),
            submissions: Signal::new(),
            stack: OnceLock::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// Create the WiFi device and spawn its background task. The radio stays off until
    /// [`Network::auto_connect`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be spawned.
    pub fn new(
        wifi_static: &'static WifiStatic,
        peripherals: WifiPeripherals,
        store: CredentialStore,
        spawner: Spawner,
    ) -> Result<Self> {
        let token = wifi_device_loop(peripherals, store, wifi_static, spawner)?;
        spawner.spawn(token);
        Ok(Self {
            wifi_static,
            spawner,
        })
    }

    /// Wait for the network stack and return it.
    pub async fn stack(&self) -> Stack<'static> {
        *self.wifi_static.stack.get().await
    }
}

impl Network for Wifi {
    fn is_connected(&self) -> bool {
        self.wifi_static.connected.load(Ordering::Acquire)
            && self
                .wifi_static
                .stack
                .try_get()
                .is_some_and(Stack::is_config_up)
    }

    async fn auto_connect(&mut self, ap_ssid: &str, ap_password: &str) -> Result<()> {
        let request = ApRequest {
            ssid: String::try_from(ap_ssid).map_err(|()| Error::ProvisioningFailed)?,
            password: String::try_from(ap_password).map_err(|()| Error::ProvisioningFailed)?,
        };
        self.wifi_static.requests.signal(request);
        loop {
            match self.wifi_static.events.wait().await {
                WifiEvent::ClientReady => return Ok(()),
                WifiEvent::ApReady => info!("waiting for credentials on the provisioning AP"),
                WifiEvent::ProvisioningFailed => return Err(Error::ProvisioningFailed),
            }
        }
    }

    fn start_mdns(&mut self, host_name: &str) -> Result<()> {
        let stack = *self
            .wifi_static
            .stack
            .try_get()
            .ok_or(Error::WifiUnavailable)?;
        let host_name = String::try_from(host_name).map_err(|()| Error::FormatError)?;
        let token = mdns::mdns_responder_task(stack, host_name)?;
        self.spawner.spawn(token);
        Ok(())
    }
}

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

#[embassy_executor::task]
async fn wifi_device_loop(
    peripherals: WifiPeripherals,
    store: CredentialStore,
    wifi_static: &'static WifiStatic,
    spawner: Spawner,
) -> ! {
    let err = inner_wifi_device_loop(peripherals, store, wifi_static, spawner)
        .await
        .unwrap_err();
    panic!("{err}");
}

async fn inner_wifi_device_loop(
    peripherals: WifiPeripherals,
    mut store: CredentialStore,
    wifi_static: &'static WifiStatic,
    spawner: Spawner,
) -> Result<Never> {
    let request = wifi_static.requests.wait().await;
    info!("WiFi device initializing");

    let WifiPeripherals {
        pin_23,
        pin_24,
        pin_25,
        pin_29,
        pio0,
        dma_ch0,
    } = peripherals;

    let fw = cyw43_firmware::CYW43_43439A0;
    let clm = cyw43_firmware::CYW43_43439A0_CLM;

    let pwr = Output::new(pin_23, Level::Low);
    let cs = Output::new(pin_25, Level::High);
    let mut pio = Pio::new(pio0, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        pin_24,
        pin_29,
        dma_ch0,
    );

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    spawner.spawn(wifi_task(runner)?);

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;

    let joined = match stored_credentials(&mut store) {
        Some(credentials) => join_network(&mut control, &credentials).await,
        None => false,
    };

    let config = if joined {
        Config::dhcpv4(Default::default())
    } else {
        let mut dns_servers = heapless::Vec::new();
        dns_servers
            .push(AP_ADDRESS)
            .map_err(|_| Error::ProvisioningFailed)?;
        Config::ipv4_static(StaticConfigV4 {
            address: Ipv4Cidr::new(AP_ADDRESS, 24),
            gateway: Some(AP_ADDRESS),
            dns_servers,
        })
    };

    let mut rng = embassy_rp::clocks::RoscRng;
    let seed = rng.next_u64();

    static RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        config,
        RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)?);

    if joined {
        info!("WiFi joined; waiting for DHCP...");
        stack.wait_config_up().await;
        if let Some(config) = stack.config_v4() {
            info!("IP address: {}", config.address);
        }
        let _ = wifi_static.stack.init(stack);
        wifi_static.connected.store(true, Ordering::Release);
        wifi_static.events.signal(WifiEvent::ClientReady);

        loop {
            Timer::after_secs(1).await;
            wifi_static
                .connected
                .store(stack.is_link_up(), Ordering::Release);
        }
    }

    info!("starting provisioning AP {}", request.ssid.as_str());
    control
        .start_ap_wpa2(request.ssid.as_str(), request.password.as_str(), AP_CHANNEL)
        .await;
    stack.wait_config_up().await;
    let _ = wifi_static.stack.init(stack);
    spawner.spawn(dhcp::dhcp_server_task(stack, AP_OCTETS)?);
    spawner.spawn(portal_task(stack, &wifi_static.submissions)?);
    wifi_static.events.signal(WifiEvent::ApReady);

    let saved = match with_timeout(PROVISIONING_TIMEOUT, wifi_static.submissions.wait()).await {
        Ok(credentials) => store.save(&credentials),
        Err(_) => {
            warn!("no credentials within {} s", PROVISIONING_TIMEOUT.as_secs());
            Err(Error::ProvisioningFailed)
        }
    };
    if let Err(err) = saved {
        warn!("provisioning failed: {}", err);
        wifi_static.events.signal(WifiEvent::ProvisioningFailed);
        // the controller holds and restarts the board
        return Ok(core::future::pending::<Never>().await);
    }

    // let the portal finish its reply, then come back up in station mode
    Timer::after_millis(750).await;
    info!("credentials saved; restarting");
    cortex_m::peripheral::SCB::sys_reset()
}

/// Credentials from flash, else the build-time ones, else `None`.
fn stored_credentials(store: &mut CredentialStore) -> Option<WifiCredentials> {
    match store.load() {
        Ok(Some(credentials)) => return Some(credentials),
        Ok(None) => {}
        Err(err) => warn!("ignoring stored credentials: {}", err),
    }
    if WIFI_SSID.is_empty() {
        info!("no stored WiFi credentials");
        return None;
    }
    WifiCredentials::new(WIFI_SSID, WIFI_PASS).ok()
}

async fn join_network(
    control: &mut cyw43::Control<'static>,
    credentials: &WifiCredentials,
) -> bool {
    let ssid = credentials.ssid.as_str();
    for attempt in 1..=MAX_JOIN_ATTEMPTS {
        info!("joining {} (attempt {})", ssid, attempt);
        let options = if credentials.password.is_empty() {
            JoinOptions::new_open()
        } else {
            JoinOptions::new(credentials.password.as_bytes())
        };
        match control.join(ssid, options).await {
            Ok(()) => return true,
            Err(err) => {
                warn!("join failed: {}", err.status);
                Timer::after_secs(1).await;
            }
        }
    }
    false
}

// ============================================================================
// WiFi Tasks
// ============================================================================

/// Serves the credential form and hands a valid submission to the device loop.
#[embassy_executor::task]
async fn portal_task(stack: Stack<'static>, submissions: &'static CredentialSignal) -> ! {
    static RX_BUFFER: StaticCell<[u8; 1024]> = StaticCell::new();
    static TX_BUFFER: StaticCell<[u8; 2048]> = StaticCell::new();
    static REQUEST_BUFFER: StaticCell<[u8; REQUEST_CAPACITY]> = StaticCell::new();
    let rx_buffer = RX_BUFFER.init([0; 1024]);
    let tx_buffer = TX_BUFFER.init([0; 2048]);
    let request = REQUEST_BUFFER.init([0; REQUEST_CAPACITY]);
    info!("provisioning portal on port {}", PORTAL_PORT);

    loop {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(PORTAL_SOCKET_TIMEOUT));
        if let Err(err) = socket.accept(PORTAL_PORT).await {
            warn!("portal accept failed: {:?}", err);
            Timer::after_millis(500).await;
            continue;
        }

        let reply = match read_request(&mut socket, request).await {
            Some(bytes) => provisioning::handle_request(bytes),
            None => {
                socket.close();
                continue;
            }
        };
        if let Err(err) = socket.write_all(reply.response().as_bytes()).await {
            warn!("portal write failed: {:?}", err);
        }
        let _ = socket.flush().await;
        socket.close();

        if let PortalReply::Saved(credentials) = reply {
            info!("credentials received for {}", credentials.ssid.as_str());
            submissions.signal(credentials);
        }
    }
}

/// Read until the request is complete, the buffer is full, or the client stops sending.
async fn read_request<'a>(socket: &mut TcpSocket<'_>, buffer: &'a mut [u8]) -> Option<&'a [u8]> {
    let mut len = 0;
    loop {
        let free = buffer.get_mut(len..).filter(|free| !free.is_empty());
        let Some(free) = free else {
            break;
        };
        match socket.read(free).await {
            Ok(0) => break,
            Ok(read) => len = len.saturating_add(read),
            Err(err) => {
                warn!("portal read failed: {:?}", err);
                return None;
            }
        }
        if provisioning::request_complete(buffer.get(..len)?) {
            break;
        }
    }
    let filled: &'a [u8] = buffer;
    filled.get(..len).filter(|bytes| !bytes.is_empty())
}

#[embassy_executor::task]
async fn wifi_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}
