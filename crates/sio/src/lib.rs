//! Interrupt-driven serial transport.
//!
//! A [`SerialPort`] owns the UART and a pair of byte rings. Task code talks
//! to the port; the UART interrupt vector talks to the port's
//! [`SerialIrq`] half, which never blocks.

pub mod device;
pub mod port;
#[cfg(any(test, feature = "test"))]
pub mod sim;

pub use device::{SerialHardware, UartIrq, UartStatus};
pub use port::{SerialIrq, SerialPort, SIO_BUF_SIZE};
