//! The dial state machine.
//!
//! ```text
//! Init -> ConfiguringModem -> Idle <-> EstablishingContext -> Dialing -> SessionActive -> Idle
//!                               ^                    |             |
//!                               +-- TeardownBackoff <+-------------+
//! ```
//!
//! `Idle` waits on the [`DialTrigger`], which is signalled by dial requests,
//! by a dropped link, and by the backoff path itself so that a failure is
//! retried once the backoff has passed.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rtos::sync::{delay_ms, Semaphore, SpinLock, Timeout};
use rtos::{thread, Role, SysError, ThreadHandle, ThreadTable};
use sio::{SerialHardware, SerialPort};

use crate::at::{AtChannel, AtError};
use crate::config::DialConfig;
use crate::link::{LinkProtocol, LinkStatus, ModemLines, NameServers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialState {
    Init,
    ConfiguringModem,
    Idle,
    EstablishingContext,
    Dialing,
    SessionActive,
    TeardownBackoff,
}

/// How long to wait before retry number `retry` (starting at 1).
pub trait Backoff: Send {
    fn delay(&self, retry: u32) -> Duration;
}

/// Same wait every time, retrying forever.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        self.0
    }
}

/// Wakes the dialer. Cloned into anything that may ask for a (re)dial.
#[derive(Clone)]
pub struct DialTrigger(Arc<Semaphore>);

impl DialTrigger {
    fn new() -> Self {
        DialTrigger(Arc::new(Semaphore::new(0)))
    }

    /// Ask for a dial. Never blocks; requests made while the dialer is
    /// busy are counted.
    pub fn request(&self) {
        self.0.signal();
    }

    pub fn pending(&self) -> u32 {
        self.0.count()
    }
}

/// Resolver servers received with the last link-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsServers {
    pub primary: Option<Ipv4Addr>,
    pub secondary: Option<Ipv4Addr>,
}

#[derive(Default)]
struct DialSession {
    link: Option<ThreadHandle>,
    retries: u32,
    dns: Arc<SpinLock<DnsServers>>,
}

pub struct Dialer<H> {
    config: DialConfig,
    at: AtChannel<H>,
    threads: Arc<ThreadTable>,
    link: Arc<dyn LinkProtocol<H>>,
    names: Arc<dyn NameServers>,
    lines: Box<dyn ModemLines>,
    backoff: Box<dyn Backoff>,
    trigger: DialTrigger,
    session: DialSession,
}

impl<H: SerialHardware + Send + 'static> Dialer<H> {
    pub fn new(
        config: DialConfig,
        port: SerialPort<H>,
        threads: Arc<ThreadTable>,
        link: Arc<dyn LinkProtocol<H>>,
        names: Arc<dyn NameServers>,
        lines: Box<dyn ModemLines>,
    ) -> Self {
        let trigger = DialTrigger::new();
        if config.dial_on_start {
            trigger.request();
        }
        Dialer {
            backoff: Box::new(FixedBackoff(config.backoff)),
            config,
            at: AtChannel::new(port),
            threads,
            link,
            names,
            lines,
            trigger,
            session: DialSession::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn trigger(&self) -> DialTrigger {
        self.trigger.clone()
    }

    /// Failed attempts since the last connect.
    pub fn retries(&self) -> u32 {
        self.session.retries
    }

    pub fn dns(&self) -> DnsServers {
        *self.session.dns.lock()
    }

    pub fn link_thread(&self) -> Option<ThreadHandle> {
        self.session.link
    }

    /// Start the dial loop on the `Dial` role's thread.
    pub fn spawn(self) -> Result<ThreadHandle, SysError> {
        let threads = Arc::clone(&self.threads);
        threads.spawn(Role::Dial, move || self.run())
    }

    pub fn run(mut self) -> ! {
        let mut state = DialState::Init;
        loop {
            let next = self.step(state);
            log::debug!("dial: {state:?} -> {next:?}");
            state = next;
        }
    }

    /// Perform the work of `state` and return the state to move to.
    pub fn step(&mut self, state: DialState) -> DialState {
        match state {
            DialState::Init => {
                self.lines.set_dtr(false);
                DialState::ConfiguringModem
            }
            DialState::ConfiguringModem => {
                for cmd in &self.config.init_commands {
                    if let Err(err) = self.at.command(cmd) {
                        panic!("modem init command AT{cmd} failed: {err}");
                    }
                }
                DialState::Idle
            }
            DialState::Idle => match self.trigger.0.wait(Timeout::Forever) {
                Ok(_) => DialState::EstablishingContext,
                Err(err) => panic!("dial trigger wait failed: {err}"),
            },
            DialState::EstablishingContext => {
                self.close_session();
                match self.at.command(&self.config.context_command) {
                    Ok(()) => DialState::Dialing,
                    Err(err) => self.failed("context setup", err),
                }
            }
            DialState::Dialing => match self.at.dial(&self.config.dial_command) {
                Ok(()) => DialState::SessionActive,
                Err(err) => self.failed("dial", err),
            },
            DialState::SessionActive => {
                self.open_session();
                DialState::Idle
            }
            DialState::TeardownBackoff => {
                self.session.retries += 1;
                self.trigger.request();
                let wait = self.backoff.delay(self.session.retries);
                log::debug!("dial: retry {} in {wait:?}", self.session.retries);
                delay_ms(u32::try_from(wait.as_millis()).unwrap_or(u32::MAX));
                DialState::Idle
            }
        }
    }

    fn failed(&self, what: &str, err: AtError) -> DialState {
        match err {
            AtError::Rejected(_) => {
                log::warn!("dial: {what} failed: {err}");
                DialState::TeardownBackoff
            }
            AtError::LineTooLong(_) => panic!("dial: {what}: {err}"),
        }
    }

    /// Stop the link task of the previous session, if any, and wait for it.
    fn close_session(&mut self) {
        let Some(handle) = self.session.link.take() else {
            return;
        };
        if let Err(err) = self.threads.terminate(handle) {
            log::warn!("dial: closing link task: {err}");
        }
        self.at.port().read_abort();
        if let Err(err) = self.threads.join(handle) {
            log::warn!("dial: joining link task: {err}");
        }
        log::debug!("dial: session closed");
    }

    fn open_session(&mut self) {
        self.session.retries = 0;
        let port = self.at.port().clone();
        let link = Arc::clone(&self.link);
        let auth = self.config.auth.clone();
        let names = Arc::clone(&self.names);
        let dns = Arc::clone(&self.session.dns);
        let trigger = self.trigger.clone();

        let entry = move || {
            link.run(&port, &auth, &mut |status: LinkStatus| match status {
                LinkStatus::Up(addrs) => {
                    log::debug!("link up, local {} peer {}", addrs.our_ip, addrs.his_ip);
                    let servers = DnsServers {
                        primary: Some(addrs.dns1).filter(|ip| !ip.is_unspecified()),
                        secondary: Some(addrs.dns2).filter(|ip| !ip.is_unspecified()),
                    };
                    if let Some(ip) = servers.primary {
                        names.set_server(0, ip);
                    }
                    if let Some(ip) = servers.secondary {
                        names.set_server(1, ip);
                    }
                    *dns.lock() = servers;
                }
                LinkStatus::Down(err) => {
                    log::warn!("link down: {err} ({})", err.code());
                    trigger.request();
                    thread::exit();
                }
            });
            log::warn!("link session ended without a status");
            trigger.request();
        };
        match self.threads.spawn(Role::Link, entry) {
            Ok(handle) => self.session.link = Some(handle),
            Err(err) => panic!("cannot start link task: {err}"),
        }
    }
}
