#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use modem::{
    DialConfig, Dialer, LinkAuth, LinkError, LinkProtocol, LinkStatus, ModemLines, NameServers,
    PppAddrs,
};
use rtos::config::ROLES;
use rtos::{Role, ThreadTable};
use sio::sim::{SimHandle, SimUart};
use sio::{SerialPort, SIO_BUF_SIZE};

/// Byte that makes [`FakeLink`] report the link as lost.
pub const LINK_DROP: u8 = 0x7e;

pub const DNS1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 53);
pub const DNS2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 54);

pub fn addrs(dns1: Ipv4Addr, dns2: Ipv4Addr) -> PppAddrs {
    PppAddrs {
        our_ip: Ipv4Addr::new(10, 64, 1, 2),
        his_ip: Ipv4Addr::new(10, 64, 0, 1),
        netmask: Ipv4Addr::new(255, 255, 255, 255),
        dns1,
        dns2,
    }
}

pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < Duration::from_secs(10), "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

struct ModemState {
    commands: Vec<(String, Instant)>,
    outbox: Vec<u8>,
}

/// Plays both the UART interrupt and the modem on the far end of the wire:
/// every `AT...\r\n` line the port transmits is answered with whatever the
/// responder returns.
pub struct FakeModem {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    state: Arc<Mutex<ModemState>>,
}

impl FakeModem {
    pub fn start<F>(port: SerialPort<SimUart>, sim: SimHandle, mut respond: F) -> Self
    where
        F: FnMut(&str) -> String + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(Mutex::new(ModemState {
            commands: Vec::new(),
            outbox: Vec::new(),
        }));
        let worker = {
            let (stop, state) = (Arc::clone(&stop), Arc::clone(&state));
            std::thread::spawn(move || {
                let irq = port.irq();
                let mut heard = Vec::new();
                while !stop.load(Ordering::SeqCst) {
                    sim.drain_tx(&irq);
                    heard.extend(sim.take_wire());
                    while let Some(end) = heard.windows(2).position(|w| w == b"\r\n") {
                        let line: Vec<u8> = heard.drain(..end + 2).collect();
                        let line = String::from_utf8_lossy(&line[..end]).into_owned();
                        let cmd = line.strip_prefix("AT").unwrap_or(&line).to_owned();
                        let reply = respond(&cmd);
                        let mut state = state.lock().unwrap();
                        state.commands.push((cmd, Instant::now()));
                        state.outbox.extend_from_slice(reply.as_bytes());
                    }
                    loop {
                        if port.rx_available() as usize >= SIO_BUF_SIZE {
                            break;
                        }
                        let next = {
                            let mut state = state.lock().unwrap();
                            (!state.outbox.is_empty()).then(|| state.outbox.remove(0))
                        };
                        match next {
                            Some(byte) => sim.deliver(&irq, &[byte]),
                            None => break,
                        }
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };
        FakeModem {
            stop,
            worker: Some(worker),
            state,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.commands.iter().map(|(cmd, _)| cmd.clone()).collect()
    }

    pub fn command_times(&self, cmd: &str) -> Vec<Instant> {
        let state = self.state.lock().unwrap();
        state
            .commands
            .iter()
            .filter(|(c, _)| c == cmd)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Put raw bytes on the wire towards the port.
    pub fn send_raw(&self, bytes: &[u8]) {
        self.state.lock().unwrap().outbox.extend_from_slice(bytes);
    }
}

impl Drop for FakeModem {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Reports link-up straight away, then reads the line until [`LINK_DROP`]
/// arrives.
pub struct FakeLink {
    pub addrs: PppAddrs,
    pub sessions: AtomicU32,
    pub auth: Mutex<Option<LinkAuth>>,
}

impl FakeLink {
    pub fn new(addrs: PppAddrs) -> Self {
        FakeLink {
            addrs,
            sessions: AtomicU32::new(0),
            auth: Mutex::new(None),
        }
    }

    pub fn sessions(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl LinkProtocol<SimUart> for FakeLink {
    fn run(&self, port: &SerialPort<SimUart>, auth: &LinkAuth, status: &mut dyn FnMut(LinkStatus)) {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        *self.auth.lock().unwrap() = Some(auth.clone());
        status(LinkStatus::Up(self.addrs));
        loop {
            if port.recv() == LINK_DROP {
                status(LinkStatus::Down(LinkError::Connect));
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingNames(pub Mutex<Vec<(u8, Ipv4Addr)>>);

impl RecordingNames {
    pub fn servers(&self) -> Vec<(u8, Ipv4Addr)> {
        self.0.lock().unwrap().clone()
    }
}

impl NameServers for RecordingNames {
    fn set_server(&self, index: u8, addr: Ipv4Addr) {
        self.0.lock().unwrap().push((index, addr));
    }
}

#[derive(Clone, Default)]
pub struct RecordingLines(pub Arc<Mutex<Vec<bool>>>);

impl ModemLines for RecordingLines {
    fn set_dtr(&mut self, high: bool) {
        self.0.lock().unwrap().push(high);
    }
}

pub fn test_config() -> DialConfig {
    DialConfig {
        backoff: Duration::from_millis(50),
        ..DialConfig::default()
    }
}

/// Everything around a [`Dialer`] under test.
pub struct Rig {
    pub threads: Arc<ThreadTable>,
    pub port: SerialPort<SimUart>,
    pub link: Arc<FakeLink>,
    pub names: Arc<RecordingNames>,
    pub dtr: RecordingLines,
    pub modem: FakeModem,
}

impl Rig {
    pub fn new<F>(config: DialConfig, link_addrs: PppAddrs, respond: F) -> (Rig, Dialer<SimUart>)
    where
        F: FnMut(&str) -> String + Send + 'static,
    {
        let threads = Arc::new(ThreadTable::new(ROLES).unwrap());
        let (uart, sim) = SimUart::new();
        let port = SerialPort::open(0, uart);
        let modem = FakeModem::start(port.clone(), sim, respond);
        let link = Arc::new(FakeLink::new(link_addrs));
        let names = Arc::new(RecordingNames::default());
        let dtr = RecordingLines::default();
        let dialer = Dialer::new(
            config,
            port.clone(),
            Arc::clone(&threads),
            link.clone(),
            names.clone(),
            Box::new(dtr.clone()),
        );
        let rig = Rig {
            threads,
            port,
            link,
            names,
            dtr,
            modem,
        };
        (rig, dialer)
    }

    pub fn dtr_levels(&self) -> Vec<bool> {
        self.dtr.0.lock().unwrap().clone()
    }

    /// Stop the dial and link tasks.
    pub fn shutdown(&self) {
        for role in [Role::Dial, Role::Link] {
            if let Some(handle) = self.threads.handle(role) {
                self.threads.terminate(handle).unwrap();
                self.port.read_abort();
                self.threads.join(handle).unwrap();
            }
        }
    }
}

/// The modem answers every command with `OK` and every dial with `CONNECT`.
pub fn happy_modem(cmd: &str) -> String {
    match cmd {
        "D*99***1#" => "\r\nCONNECT 115200\r\n".into(),
        _ => "\r\nOK\r\n".into(),
    }
}

pub fn init_commands() -> Vec<String> {
    DialConfig::default().init_commands
}
