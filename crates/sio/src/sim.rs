//! A UART register block in memory, for driving the transport from tests.
//!
//! [`SimUart`] is moved into the port like real hardware; the paired
//! [`SimHandle`] plays the wire and the interrupt controller.

use std::sync::Arc;

use rtos::sync::SpinLock;

use crate::device::{SerialHardware, UartIrq, UartStatus};
use crate::port::SerialIrq;

#[derive(Default)]
struct SimState {
    // data register, receive side
    rx: Option<u8>,
    overruns: u32,
    // byte in the transmit shift register
    shifting: Option<u8>,
    wire: Vec<u8>,
    enabled: UartIrq,
}

pub struct SimUart(Arc<SpinLock<SimState>>);

#[derive(Clone)]
pub struct SimHandle(Arc<SpinLock<SimState>>);

impl SimUart {
    pub fn new() -> (SimUart, SimHandle) {
        let state = Arc::new(SpinLock::new(SimState::default()));
        (SimUart(Arc::clone(&state)), SimHandle(state))
    }
}

impl SerialHardware for SimUart {
    fn status(&self) -> UartStatus {
        let state = self.0.lock();
        let mut status = UartStatus::empty();
        status.set(UartStatus::RXNE, state.rx.is_some());
        status.set(UartStatus::TC, state.shifting.is_none());
        status
    }

    fn read_data(&mut self) -> u8 {
        self.0.lock().rx.take().unwrap_or(0)
    }

    fn write_data(&mut self, byte: u8) {
        let mut state = self.0.lock();
        assert!(state.shifting.is_none(), "write to busy transmitter");
        state.shifting = Some(byte);
    }

    fn set_interrupts(&mut self, irqs: UartIrq, enable: bool) {
        self.0.lock().enabled.set(irqs, enable);
    }
}

impl SimHandle {
    /// Latch `byte` into the receive data register. Returns `false` when
    /// an unread byte was overwritten.
    pub fn inject(&self, byte: u8) -> bool {
        let mut state = self.0.lock();
        let overrun = state.rx.replace(byte).is_some();
        if overrun {
            state.overruns += 1;
        }
        !overrun
    }

    /// Feed `bytes` one at a time, raising the receive interrupt for each
    /// while it is enabled.
    pub fn deliver<H>(&self, irq: &SerialIrq<H>, bytes: &[u8])
    where
        H: SerialHardware + Send,
    {
        for &byte in bytes {
            self.inject(byte);
            if self.irq_enabled(UartIrq::RXNE) {
                irq.on_rx_ready();
            }
        }
    }

    /// Finish shifting out the current byte and append it to the wire.
    pub fn finish_tx(&self) -> Option<u8> {
        let mut state = self.0.lock();
        let byte = state.shifting.take()?;
        state.wire.push(byte);
        Some(byte)
    }

    /// Let the transmitter run until the port stops feeding it, raising the
    /// completion interrupt after every byte. Returns the bytes sent.
    pub fn drain_tx<H>(&self, irq: &SerialIrq<H>) -> usize
    where
        H: SerialHardware + Send,
    {
        let mut sent = 0;
        while self.finish_tx().is_some() {
            sent += 1;
            if self.irq_enabled(UartIrq::TC) {
                irq.on_tx_complete();
            }
        }
        sent
    }

    pub fn in_flight(&self) -> Option<u8> {
        self.0.lock().shifting
    }

    pub fn irq_enabled(&self, irq: UartIrq) -> bool {
        self.0.lock().enabled.contains(irq)
    }

    pub fn wire(&self) -> Vec<u8> {
        self.0.lock().wire.clone()
    }

    pub fn take_wire(&self) -> Vec<u8> {
        core::mem::take(&mut self.0.lock().wire)
    }

    pub fn overruns(&self) -> u32 {
        self.0.lock().overruns
    }
}
