//! Dial-up modem control.
//!
//! [`Dialer`] brings the modem up with AT commands over a
//! [`sio::SerialPort`], dials, and hands the line to a point-to-point link
//! protocol running on its own task. When the link drops the dialer
//! reconnects, retrying failures after a fixed backoff.

pub mod at;
pub mod config;
pub mod dial;
pub mod link;

pub use at::{AtChannel, AtError, Response, Verdict};
pub use config::DialConfig;
pub use dial::{Backoff, DialState, DialTrigger, Dialer, DnsServers, FixedBackoff};
pub use link::{
    AuthType, LinkAuth, LinkError, LinkProtocol, LinkStatus, ModemLines, NameServers, NoLines,
    PppAddrs,
};
