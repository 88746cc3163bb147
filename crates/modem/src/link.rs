//! What the dialer needs from the rest of the system: the point-to-point
//! link protocol, the resolver configuration and the modem control lines.

use std::net::Ipv4Addr;

use sio::SerialPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PppAddrs {
    pub our_ip: Ipv4Addr,
    pub his_ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub dns1: Ipv4Addr,
    pub dns2: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(i8)]
pub enum LinkError {
    #[error("invalid parameter")]
    Param = -1,
    #[error("unable to open session")]
    Open = -2,
    #[error("invalid I/O device")]
    Device = -3,
    #[error("unable to allocate resources")]
    Alloc = -4,
    #[error("user interrupt")]
    User = -5,
    #[error("connection lost")]
    Connect = -6,
    #[error("authentication failed")]
    AuthFail = -7,
    #[error("protocol failure")]
    Protocol = -8,
}

impl LinkError {
    pub fn code(self) -> i8 {
        self as i8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up(PppAddrs),
    Down(LinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    /// Whatever the peer asks for.
    Any,
    Pap,
    Chap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAuth {
    pub kind: AuthType,
    pub user: String,
    pub password: String,
}

/// A point-to-point protocol engine that runs over the serial port once
/// the modem has connected.
pub trait LinkProtocol<H>: Send + Sync {
    /// Run one session on the calling task, reporting link changes through
    /// `status`. The engine reads the port with [`SerialPort::recv`], so
    /// the session ends when the port's readers are aborted.
    fn run(&self, port: &SerialPort<H>, auth: &LinkAuth, status: &mut dyn FnMut(LinkStatus));
}

/// The resolver's server table.
pub trait NameServers: Send + Sync {
    fn set_server(&self, index: u8, addr: Ipv4Addr);
}

pub trait ModemLines: Send {
    /// Drive the DTR pin. Low (`false`) tells the modem the terminal is
    /// ready.
    fn set_dtr(&mut self, high: bool);
}

/// For modems wired without control lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLines;

impl ModemLines for NoLines {
    fn set_dtr(&mut self, _high: bool) {}
}
