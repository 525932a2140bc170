/// Receive half of a UART, owned by the background receive loop.
pub trait UartRx: Send + 'static {
    /// Error type for receive operations
    type Error: std::fmt::Debug;

    /// Number of bytes buffered by the driver and ready to read
    fn buffered_len(&mut self) -> Result<usize, Self::Error>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms`
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;
}

/// Transmit half of a UART, used by the foreground command methods.
pub trait UartTx: Send + 'static {
    /// Error type for transmit operations
    type Error: std::fmt::Debug;

    /// Write data to the transport
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;
}

/// Hardware settings a transport was actually built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartBinding {
    pub uart_num: u8,
    pub baud_rate: u32,
    pub tx_pin: i32,
    pub rx_pin: i32,
}

/// Trait for RFID reader communication backends.
/// Implement this trait for different transports (UART, serial port, etc.)
///
/// The transport is expected to be configured (baud rate, pins) and
/// installed by its constructor; the reader only clears and splits it.
pub trait RfidTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;
    type Rx: UartRx;
    type Tx: UartTx;

    /// Port, baud rate and pins in use, if the backend has such a notion.
    /// The reader refuses to start when these disagree with its config.
    fn binding(&self) -> Option<UartBinding> {
        None
    }

    /// Clear the input buffer
    fn clear_input(&mut self) -> Result<(), Self::Error>;

    /// Split into independently owned receive and transmit halves
    fn split(self) -> Result<(Self::Rx, Self::Tx), Self::Error>;
}
