use std::sync::Arc;

use rtos::ringbuffer::RingBuffer;
use rtos::sync::{enter_interrupt, InterruptSpinLock, Semaphore, Timeout, WaitError};
use rtos::thread;

use crate::device::{SerialHardware, UartIrq, UartStatus};

pub const SIO_BUF_SIZE: usize = 64;

struct PortIo<H> {
    rx: RingBuffer<u8, SIO_BUF_SIZE>,
    tx: RingBuffer<u8, SIO_BUF_SIZE>,
    hw: H,
    // a byte written by us is still shifting out
    tx_busy: bool,
}

struct PortInner<H> {
    device: u8,
    io: InterruptSpinLock<PortIo<H>>,
    /// Bytes buffered in `rx`.
    rx_sem: Semaphore,
    /// Bytes `send` may still accept: the ring plus the byte in flight.
    tx_sem: Semaphore,
}

/// Task-side handle to the serial transport.
///
/// Clones share the same port; there is exactly one port per UART because
/// [`SerialPort::open`] takes the hardware by value.
pub struct SerialPort<H>(Arc<PortInner<H>>);

impl<H> Clone for SerialPort<H> {
    fn clone(&self) -> Self {
        SerialPort(Arc::clone(&self.0))
    }
}

impl<H: SerialHardware + Send> SerialPort<H> {
    pub fn open(device: u8, mut hw: H) -> Self {
        hw.set_interrupts(UartIrq::TC, false);
        hw.set_interrupts(UartIrq::RXNE, true);
        log::debug!("sio{device}: open");
        SerialPort(Arc::new(PortInner {
            device,
            io: InterruptSpinLock::new(PortIo {
                rx: RingBuffer::new(),
                tx: RingBuffer::new(),
                hw,
                tx_busy: false,
            }),
            rx_sem: Semaphore::new(0),
            tx_sem: Semaphore::new(SIO_BUF_SIZE as u32 + 1),
        }))
    }

    pub fn device(&self) -> u8 {
        self.0.device
    }

    /// The half handed to the UART interrupt vector.
    pub fn irq(&self) -> SerialIrq<H> {
        SerialIrq(Arc::clone(&self.0))
    }

    /// Queue one byte for transmission, blocking while the ring is full.
    ///
    /// An idle transmitter gets the byte directly.
    pub fn send(&self, byte: u8) {
        if let Err(err) = self.0.tx_sem.wait(Timeout::Forever) {
            panic!("sio{}: tx wait failed: {err}", self.0.device);
        }
        let mut io = self.0.io.lock();
        if io.tx.is_empty() && !io.tx_busy && io.hw.status().contains(UartStatus::TC) {
            io.hw.write_data(byte);
            io.tx_busy = true;
            io.hw.set_interrupts(UartIrq::TC, true);
        } else {
            let queued = io.tx.push(byte);
            assert!(queued, "tx ring overrun");
        }
    }

    pub fn write(&self, data: &[u8]) -> usize {
        for &byte in data {
            self.send(byte);
        }
        data.len()
    }

    /// Block until a byte arrives.
    ///
    /// If the wait is aborted by [`SerialPort::read_abort`] the calling task
    /// exits here.
    pub fn recv(&self) -> u8 {
        match self.0.rx_sem.wait(Timeout::Forever) {
            Ok(_) => self.0.io.lock().rx.pop(),
            Err(WaitError::Aborted) => {
                log::debug!("sio{}: read aborted", self.0.device);
                thread::exit()
            }
            Err(err) => panic!("sio{}: rx wait failed: {err}", self.0.device),
        }
    }

    /// Copy out whatever is already buffered, up to `buf.len()` bytes.
    pub fn try_read(&self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            if !self.0.rx_sem.try_wait() {
                break;
            }
            *slot = self.0.io.lock().rx.pop();
            n += 1;
        }
        n
    }

    /// Block for the first byte, then take what else is buffered.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let Some((first, rest)) = buf.split_first_mut() else {
            return 0;
        };
        *first = self.recv();
        1 + self.try_read(rest)
    }

    /// Abort every blocked [`SerialPort::recv`]; buffered bytes stay put.
    pub fn read_abort(&self) -> usize {
        let woken = self.0.rx_sem.abort();
        log::debug!("sio{}: aborted {woken} readers", self.0.device);
        woken
    }

    pub fn readers_blocked(&self) -> usize {
        self.0.rx_sem.waiters()
    }

    /// Bytes waiting to be read.
    pub fn rx_available(&self) -> u32 {
        self.0.rx_sem.count()
    }

    /// Bytes `send` would accept without blocking.
    pub fn tx_room(&self) -> u32 {
        self.0.tx_sem.count()
    }

    pub fn tx_queued(&self) -> usize {
        self.0.io.lock().tx.len()
    }
}

impl<H> core::fmt::Debug for SerialPort<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialPort")
            .field("device", &self.0.device)
            .finish_non_exhaustive()
    }
}

/// Interrupt-context half of a [`SerialPort`]. Nothing here blocks.
pub struct SerialIrq<H>(Arc<PortInner<H>>);

impl<H> Clone for SerialIrq<H> {
    fn clone(&self) -> Self {
        SerialIrq(Arc::clone(&self.0))
    }
}

impl<H: SerialHardware + Send> SerialIrq<H> {
    /// Transmitter went idle: free the slot of the byte that just left and
    /// start the next one, or stop the interrupt if the ring is empty.
    pub fn on_tx_complete(&self) {
        let _irq = enter_interrupt();
        let inner = &*self.0;
        let mut io = inner.io.lock();
        if !io.tx_busy || !io.hw.status().contains(UartStatus::TC) {
            return;
        }
        inner.tx_sem.irq().signal();
        match io.tx.try_pop() {
            Some(byte) => io.hw.write_data(byte),
            None => {
                io.tx_busy = false;
                io.hw.set_interrupts(UartIrq::TC, false);
            }
        }
    }

    /// Move a received byte into the ring. A full ring drops it.
    pub fn on_rx_ready(&self) {
        let _irq = enter_interrupt();
        let inner = &*self.0;
        let mut io = inner.io.lock();
        if !io.hw.status().contains(UartStatus::RXNE) {
            return;
        }
        let byte = io.hw.read_data();
        if io.rx.push(byte) {
            inner.rx_sem.irq().signal();
        } else {
            log::trace!("sio{}: rx full, dropped {byte:#04x}", inner.device);
        }
    }

    /// Shared vector entry: service whichever sources are pending.
    pub fn on_interrupt(&self) {
        self.on_rx_ready();
        self.on_tx_complete();
    }
}
