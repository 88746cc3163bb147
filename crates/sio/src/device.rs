bitflags::bitflags! {
    /// Status register flags the transport looks at.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartStatus: u16 {
        /// A received byte is waiting in the data register.
        const RXNE = 1 << 5;
        /// The transmitter is idle and can take the next byte.
        const TC = 1 << 6;
    }

    /// Interrupt enable bits, laid out like the status flags they gate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UartIrq: u16 {
        const RXNE = 1 << 5;
        const TC = 1 << 6;
    }
}

/// Register-level access to one UART.
///
/// Clock, pin and vector setup happen during board bring-up, before the
/// hardware is handed to [`crate::SerialPort::open`].
pub trait SerialHardware {
    fn status(&self) -> UartStatus;
    fn read_data(&mut self) -> u8;
    fn write_data(&mut self, byte: u8);
    fn set_interrupts(&mut self, irqs: UartIrq, enable: bool);
}
