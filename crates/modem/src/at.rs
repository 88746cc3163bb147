//! Line-oriented AT command exchange.

use core::fmt;

use sio::{SerialHardware, SerialPort};
use tinyvec::ArrayVec;

/// Size of the response line buffer. A line, terminator included, must be
/// shorter than this.
pub const LINE_CAPACITY: usize = 80;

pub type LineBuf = ArrayVec<[u8; LINE_CAPACITY]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error,
    Connect,
    NoCarrier,
    Busy,
    Delayed,
    NoDialtone,
    NoAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
}

impl Response {
    pub const ALL: [Response; 8] = [
        Response::Ok,
        Response::Error,
        Response::Connect,
        Response::NoCarrier,
        Response::Busy,
        Response::Delayed,
        Response::NoDialtone,
        Response::NoAnswer,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Response::Ok => "OK",
            Response::Error => "ERROR",
            Response::Connect => "CONNECT",
            Response::NoCarrier => "NO CARRIER",
            Response::Busy => "BUSY",
            Response::Delayed => "DELAYED",
            Response::NoDialtone => "NO DIALTONE",
            Response::NoAnswer => "NO ANSWER",
        }
    }

    /// Match a raw line (terminator included) against the result codes.
    ///
    /// The line must start with the token and carry at least one more byte,
    /// so a bare token without its line ending is not a result.
    pub fn classify(line: &[u8]) -> Option<Response> {
        Self::ALL.into_iter().find(|resp| {
            let token = resp.token().as_bytes();
            line.len() > token.len() && line.starts_with(token)
        })
    }

    /// Outcome of an ordinary command.
    pub fn command_verdict(self) -> Option<Verdict> {
        match self {
            Response::Ok => Some(Verdict::Success),
            Response::Error => Some(Verdict::Failure),
            _ => None,
        }
    }

    /// Outcome of a dial command.
    pub fn dial_verdict(self) -> Option<Verdict> {
        match self {
            Response::Connect => Some(Verdict::Success),
            Response::NoCarrier
            | Response::Busy
            | Response::Delayed
            | Response::Error
            | Response::NoDialtone
            | Response::NoAnswer => Some(Verdict::Failure),
            Response::Ok => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AtError {
    #[error("modem answered {0}")]
    Rejected(Response),
    #[error("response line reached {0} bytes")]
    LineTooLong(usize),
}

/// Command/response channel over the serial port.
pub struct AtChannel<H> {
    port: SerialPort<H>,
    line: LineBuf,
}

impl<H: SerialHardware + Send> AtChannel<H> {
    pub fn new(port: SerialPort<H>) -> Self {
        AtChannel {
            port,
            line: LineBuf::new(),
        }
    }

    pub fn port(&self) -> &SerialPort<H> {
        &self.port
    }

    pub fn send_command(&self, cmd: &str) {
        log::debug!("> AT{cmd}");
        self.port.write(b"AT");
        self.port.write(cmd.as_bytes());
        self.port.write(b"\r\n");
    }

    /// Read one line up to and including `\n`.
    pub fn read_line(&mut self) -> Result<&[u8], AtError> {
        self.line.clear();
        loop {
            let byte = self.port.recv();
            self.line.push(byte);
            if self.line.len() == LINE_CAPACITY {
                return Err(AtError::LineTooLong(LINE_CAPACITY));
            }
            if byte == b'\n' {
                return Ok(&self.line);
            }
        }
    }

    /// Read lines until `verdict` decides one of them. Anything that is not
    /// a result code, or a result code the verdict ignores, is skipped.
    pub fn wait_for(&mut self, verdict: fn(Response) -> Option<Verdict>) -> Result<(), AtError> {
        loop {
            let line = self.read_line()?;
            let Some(resp) = Response::classify(line) else {
                log::trace!("< {:?} (skipped)", String::from_utf8_lossy(line));
                continue;
            };
            log::debug!("< {resp}");
            match verdict(resp) {
                Some(Verdict::Success) => return Ok(()),
                Some(Verdict::Failure) => return Err(AtError::Rejected(resp)),
                None => continue,
            }
        }
    }

    /// Send `cmd` and wait for `OK` or `ERROR`.
    pub fn command(&mut self, cmd: &str) -> Result<(), AtError> {
        self.send_command(cmd);
        self.wait_for(Response::command_verdict)
    }

    /// Send the dial command `cmd` and wait for `CONNECT` or one of the
    /// call failure codes.
    pub fn dial(&mut self, cmd: &str) -> Result<(), AtError> {
        self.send_command(cmd);
        self.wait_for(Response::dial_verdict)
    }
}
