//! Host-level tests for the time and timezone controller, with simulated network, HTTP, NTP
//! and board collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_futures::{block_on, yield_now};
use embedded_hal_async::delay::DelayNs;
use nixie_clock::controller::{
    AP_SSID, CLOCK_POLL_MS, MDNS_HOST_NAME, NTP_POLL_INTERVAL_SECS, NTP_SERVER,
    NTP_SYNC_TIMEOUT_MS, REBOOT_HOLD_MS,
};
use nixie_clock::{
    Brightness, Controller, ControllerState, DisplayState, Error, Frame, HttpClient, Network,
    Nixie, NixieStatic, NtpClient, Result, System, TimezoneConfig, UnixSeconds,
};

const CONFIG: TimezoneConfig = TimezoneConfig {
    api_key: "KEY",
    zone: "Europe/Berlin",
};

const T0: i64 = 1_720_000_000; // 2024-07-03 09:46:40 UTC
const BERLIN_DST_END: i64 = 1_729_990_800; // 2024-10-27 01:00:00 UTC
const BERLIN_DST_START: i64 = 1_743_296_400; // 2025-03-30 01:00:00 UTC

fn body(gmt_offset: i32, dst: &str, zone_end: i64) -> String {
    format!(r#"{{"status":"OK","gmtOffset":{gmt_offset},"dst":"{dst}","zoneEnd":{zone_end}}}"#)
}

// ============================================================================
// Simulated world
// ============================================================================

/// Everything the collaborators observe or record.
#[derive(Default)]
struct World {
    elapsed_ms: Cell<u64>,
    connected: Cell<bool>,
    ap_requests: RefCell<Vec<(String, String)>>,
    mdns_hosts: RefCell<Vec<String>>,
    ntp_started: Cell<Option<(&'static str, u32)>>,
    // simulated time of the first NTP sync
    ntp_synced_at_ms: Cell<u64>,
    timezones: RefCell<Vec<(i32, i32)>>,
    urls: RefCell<Vec<String>>,
    responses: RefCell<VecDeque<Result<(u16, String)>>>,
    delays: RefCell<Vec<u32>>,
    restarts: Cell<u32>,
}

impl World {
    fn respond(&self, response: Result<(u16, String)>) {
        self.responses.borrow_mut().push_back(response);
    }
}

struct SimNetwork {
    world: Rc<World>,
    // polls before the station comes up
    connect_yields: usize,
    connect_result: Result<()>,
    link_up: bool,
    mdns_result: Result<()>,
}

impl Network for SimNetwork {
    fn is_connected(&self) -> bool {
        self.world.connected.get()
    }

    async fn auto_connect(&mut self, ap_ssid: &str, ap_password: &str) -> Result<()> {
        self.world
            .ap_requests
            .borrow_mut()
            .push((ap_ssid.to_owned(), ap_password.to_owned()));
        for _ in 0..self.connect_yields {
            yield_now().await;
        }
        self.connect_result?;
        self.world.connected.set(self.link_up);
        Ok(())
    }

    fn start_mdns(&mut self, host_name: &str) -> Result<()> {
        self.world.mdns_hosts.borrow_mut().push(host_name.to_owned());
        self.mdns_result
    }
}

struct SimHttp {
    world: Rc<World>,
}

impl HttpClient for SimHttp {
    async fn get(&mut self, url: &str, body: &mut [u8]) -> Result<(u16, usize)> {
        self.world.urls.borrow_mut().push(url.to_owned());
        let (status, payload) = self
            .world
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(Error::HttpTransport))?;
        body[..payload.len()].copy_from_slice(payload.as_bytes());
        Ok((status, payload.len()))
    }
}

/// UTC follows simulated time from `base` once started.
struct SimNtp {
    world: Rc<World>,
    base: Option<i64>,
}

impl NtpClient for SimNtp {
    fn start(&mut self, server: &'static str, poll_interval_secs: u32) {
        self.world.ntp_started.set(Some((server, poll_interval_secs)));
    }

    fn now(&self) -> Option<UnixSeconds> {
        self.world.ntp_started.get()?;
        if self.world.elapsed_ms.get() < self.world.ntp_synced_at_ms.get() {
            return None;
        }
        let elapsed = i64::try_from(self.world.elapsed_ms.get() / 1000).ok()?;
        self.base.map(|base| UnixSeconds(base + elapsed))
    }

    fn set_timezone(&mut self, hours: i32, residual_seconds: i32) {
        self.world
            .timezones
            .borrow_mut()
            .push((hours, residual_seconds));
    }
}

struct SimSystem {
    world: Rc<World>,
    random: u64,
}

impl System for SimSystem {
    fn random(&mut self) -> u64 {
        self.random
    }

    fn restart(&mut self) {
        self.world.restarts.set(self.world.restarts.get() + 1);
    }
}

/// Advances simulated time and yields once per delay.
struct SimDelay {
    world: Rc<World>,
}

impl SimDelay {
    async fn sleep_ms(&mut self, ms: u32) {
        self.world.delays.borrow_mut().push(ms);
        self.world
            .elapsed_ms
            .set(self.world.elapsed_ms.get() + u64::from(ms));
        yield_now().await;
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleep_ms(ns / 1_000_000).await;
    }

    async fn delay_us(&mut self, us: u32) {
        self.sleep_ms(us / 1_000).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.sleep_ms(ms).await;
    }
}

type SimController = Controller<'static, SimNetwork, SimHttp, SimNtp, SimSystem, SimDelay>;

fn network(world: &Rc<World>) -> SimNetwork {
    SimNetwork {
        world: Rc::clone(world),
        connect_yields: 0,
        connect_result: Ok(()),
        link_up: true,
        mdns_result: Ok(()),
    }
}

fn controller(
    world: &Rc<World>,
    nixie: Nixie<'static>,
    network: SimNetwork,
    ntp_base: Option<i64>,
) -> SimController {
    Controller::new(
        nixie,
        network,
        SimHttp {
            world: Rc::clone(world),
        },
        SimNtp {
            world: Rc::clone(world),
            base: ntp_base,
        },
        SimSystem {
            world: Rc::clone(world),
            random: 427,
        },
        SimDelay {
            world: Rc::clone(world),
        },
        CONFIG,
    )
}

fn clock_polls(world: &World) -> usize {
    world
        .delays
        .borrow()
        .iter()
        .filter(|&&ms| ms == CLOCK_POLL_MS)
        .count()
}

fn assert_rebooted(world: &World, controller: &SimController) {
    assert_eq!(controller.state(), ControllerState::Reboot);
    assert_eq!(world.restarts.get(), 1);
    assert_eq!(world.delays.borrow().last(), Some(&REBOOT_HOLD_MS));
}

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn bootstrap_reaches_running() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let nixie = Nixie::from_static(&NIXIE_STATIC);
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", T0 + 3600))));
    let network = SimNetwork {
        connect_yields: 3,
        ..network(&world)
    };
    let mut controller = controller(&world, nixie, network, Some(T0));
    assert_eq!(controller.state(), ControllerState::Boot);

    block_on(controller.bootstrap()).unwrap();

    assert_eq!(controller.state(), ControllerState::Running);
    let lease = controller.lease().unwrap();
    assert!(lease.dst_in_effect);
    assert_eq!(lease.offset_seconds, 7200);
    assert_eq!(lease.valid_until, UnixSeconds(T0 + 3600));

    assert_eq!(
        *world.ap_requests.borrow(),
        [(AP_SSID.to_owned(), "04270427".to_owned())]
    );
    assert_eq!(*world.mdns_hosts.borrow(), [MDNS_HOST_NAME]);
    assert_eq!(
        world.ntp_started.get(),
        Some((NTP_SERVER, NTP_POLL_INTERVAL_SECS))
    );
    assert_eq!(*world.timezones.borrow(), [(2, 0)]);
    assert_eq!(*world.urls.borrow(), [CONFIG.url().unwrap().as_str()]);
    assert_eq!(world.restarts.get(), 0);

    // the passcode animation ran while WiFi came up and was torn down after
    let delays = world.delays.borrow();
    assert!(!delays.is_empty());
    assert!(delays.iter().all(|&ms| ms == 500));
    assert_eq!(nixie.snapshot().frame, Frame::BLANK);
}

#[test]
fn bootstrap_waits_for_the_first_ntp_sync() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.ntp_synced_at_ms.set(1_200);
    // a zone without transitions
    world.respond(Ok((200, body(3600, "0", 0))));
    let network = network(&world);
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));

    block_on(controller.bootstrap()).unwrap();

    assert_eq!(clock_polls(&world), 24);
    let lease = controller.lease().unwrap();
    assert_eq!(lease.valid_until, UnixSeconds(T0 + 1 + 86_400));
    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(world.urls.borrow().len(), 1);
}

#[test]
fn bootstrap_gives_up_waiting_for_ntp() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", BERLIN_DST_END))));
    let network = network(&world);
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, None);

    block_on(controller.bootstrap()).unwrap();

    assert_eq!(
        clock_polls(&world),
        usize::try_from(NTP_SYNC_TIMEOUT_MS / CLOCK_POLL_MS).unwrap()
    );
    assert_eq!(
        controller.lease().unwrap().valid_until,
        UnixSeconds(BERLIN_DST_END)
    );
    assert_eq!(controller.state(), ControllerState::Running);
}

#[test]
fn mdns_failure_is_not_fatal() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(3600, "0", T0 + 3600))));
    let network = SimNetwork {
        mdns_result: Err(Error::WifiUnavailable),
        ..network(&world)
    };
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));

    block_on(controller.bootstrap()).unwrap();

    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(world.restarts.get(), 0);
}

#[test]
fn provisioning_failure_reboots() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    let network = SimNetwork {
        connect_result: Err(Error::ProvisioningFailed),
        ..network(&world)
    };
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));

    assert_eq!(
        block_on(controller.bootstrap()),
        Err(Error::ProvisioningFailed)
    );
    assert_rebooted(&world, &controller);
    assert_eq!(world.ntp_started.get(), None);
}

#[test]
fn first_renewal_failure_reboots() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.respond(Ok((500, String::new())));
    let network = network(&world);
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));

    assert_eq!(block_on(controller.bootstrap()), Err(Error::HttpStatus(500)));
    assert_rebooted(&world, &controller);
    assert_eq!(controller.lease(), None);
}

#[test]
fn unusable_body_reboots() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.respond(Ok((200, "<html>oops</html>".to_owned())));
    let network = network(&world);
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));

    assert_eq!(block_on(controller.bootstrap()), Err(Error::JsonParse));
    assert_rebooted(&world, &controller);
}

#[test]
fn wifi_down_fails_renewal_without_a_request() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    let network = SimNetwork {
        link_up: false,
        ..network(&world)
    };
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));

    assert_eq!(block_on(controller.bootstrap()), Err(Error::WifiUnavailable));
    assert!(world.urls.borrow().is_empty());
    assert_rebooted(&world, &controller);
}

// ============================================================================
// Whole-second updates
// ============================================================================

#[test]
fn expired_lease_forces_renewal_and_reboots_on_failure() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let nixie = Nixie::from_static(&NIXIE_STATIC);
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", 1000))));
    world.respond(Ok((500, String::new())));
    let network = network(&world);
    // NTP not yet synchronized at boot, so the lease is taken as given
    let mut controller = controller(&world, nixie, network, None);
    block_on(controller.bootstrap()).unwrap();
    assert_eq!(controller.lease().unwrap().valid_until, UnixSeconds(1000));

    assert_eq!(
        block_on(controller.tick_second(UnixSeconds(999))),
        Ok(ControllerState::Running)
    );
    let shown = Frame::compose(&DisplayState::new(2, 16, 39));
    assert_eq!(nixie.snapshot().frame, shown);
    assert_eq!(world.urls.borrow().len(), 1);

    assert_eq!(
        block_on(controller.tick_second(UnixSeconds(1000))),
        Err(Error::HttpStatus(500))
    );
    assert_eq!(world.urls.borrow().len(), 2);
    assert_rebooted(&world, &controller);
    assert_eq!(nixie.snapshot().frame, shown);
    assert_eq!(controller.last_update(), Some(UnixSeconds(999)));
}

#[test]
fn dst_end_switches_to_the_renewed_offset() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let nixie = Nixie::from_static(&NIXIE_STATIC);
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", BERLIN_DST_END))));
    world.respond(Ok((200, body(3600, "0", BERLIN_DST_START))));
    let network = network(&world);
    let mut controller = controller(&world, nixie, network, Some(BERLIN_DST_END - 10));
    block_on(controller.bootstrap()).unwrap();

    block_on(controller.tick_second(UnixSeconds(BERLIN_DST_END - 1))).unwrap();
    assert_eq!(
        nixie.snapshot().frame,
        Frame::compose(&DisplayState::new(2, 59, 59))
    );
    assert_eq!(world.urls.borrow().len(), 1);

    block_on(controller.tick_second(UnixSeconds(BERLIN_DST_END))).unwrap();
    assert_eq!(
        nixie.snapshot().frame,
        Frame::compose(&DisplayState::new(2, 0, 0))
    );
    assert_eq!(world.urls.borrow().len(), 2);

    block_on(controller.tick_second(UnixSeconds(BERLIN_DST_END + 1))).unwrap();
    assert_eq!(
        nixie.snapshot().frame,
        Frame::compose(&DisplayState::new(2, 0, 1))
    );
    assert_eq!(nixie.snapshot().brightness, Brightness::for_hour(2));

    let lease = controller.lease().unwrap();
    assert!(!lease.dst_in_effect);
    assert_eq!(lease.offset_seconds, 3600);
    assert_eq!(*world.timezones.borrow(), [(2, 0), (1, 0)]);
    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(world.restarts.get(), 0);
}

#[test]
fn renewal_keeps_running() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", T0 + 60))));
    world.respond(Ok((200, body(7200, "1", T0 + 7200))));
    let network = network(&world);
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));
    block_on(controller.bootstrap()).unwrap();

    let lease = block_on(controller.renew_timezone()).unwrap();
    assert_eq!(lease.valid_until, UnixSeconds(T0 + 7200));
    assert_eq!(controller.lease(), Some(lease));
    assert_eq!(controller.state(), ControllerState::Running);
}

#[test]
fn failed_optional_renewal_keeps_the_old_lease() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", T0 + 60))));
    world.respond(Err(Error::HttpTransport));
    let network = network(&world);
    let mut controller =
        controller(&world, Nixie::from_static(&NIXIE_STATIC), network, Some(T0));
    block_on(controller.bootstrap()).unwrap();
    let before = controller.lease();

    assert_eq!(
        block_on(controller.renew_timezone()),
        Err(Error::HttpTransport)
    );
    assert_eq!(controller.lease(), before);
    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(world.restarts.get(), 0);
}

#[test]
fn run_publishes_each_second_until_renewal_fails() {
    static NIXIE_STATIC: NixieStatic = Nixie::new_static();
    let nixie = Nixie::from_static(&NIXIE_STATIC);
    let world = Rc::new(World::default());
    world.respond(Ok((200, body(7200, "1", T0 + 2))));
    let network = network(&world);
    let mut controller = controller(&world, nixie, network, Some(T0));
    block_on(controller.bootstrap()).unwrap();
    assert!(world.delays.borrow().is_empty());

    let err = match block_on(controller.run()) {
        Ok(never) => match never {},
        Err(err) => err,
    };

    // the renewal at T0 + 2 found no response
    assert_eq!(err, Error::HttpTransport);
    assert_eq!(controller.last_update(), Some(UnixSeconds(T0 + 1)));
    assert_eq!(
        nixie.snapshot().frame,
        Frame::compose(&DisplayState::new(11, 46, 41))
    );
    assert_eq!(clock_polls(&world), 40);
    assert_eq!(world.urls.borrow().len(), 2);
    assert_rebooted(&world, &controller);
}
