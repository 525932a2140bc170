//! Serial port transport for desktop using serialport crate

use crate::config::ReaderConfig;
use crate::transport::{RfidTransport, UartRx, UartTx};
use std::time::Duration;

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` at `config.baud_rate`.
    ///
    /// Host serial ports have no UART number or pins, so only the baud
    /// rate is taken from `config`.
    pub fn new(port_name: &str, config: &ReaderConfig) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(Duration::from_millis(0))
            .open()?;
        std::thread::sleep(Duration::from_millis(500));
        port.clear(serialport::ClearBuffer::Input)?;

        Ok(Self { port })
    }
}

pub struct SerialRx {
    port: Box<dyn serialport::SerialPort>,
}

pub struct SerialTx {
    port: Box<dyn serialport::SerialPort>,
}

impl UartRx for SerialRx {
    type Error = std::io::Error;

    fn buffered_len(&mut self) -> Result<usize, Self::Error> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(std::io::Error::other)
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms as u64))
            .map_err(std::io::Error::other)?;
        match std::io::Read::read(&mut self.port, buf) {
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }
}

impl UartTx for SerialTx {
    type Error = std::io::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write_all(&mut self.port, data)?;
        Ok(data.len())
    }
}

impl RfidTransport for SerialTransport {
    type Error = std::io::Error;
    type Rx = SerialRx;
    type Tx = SerialTx;

    fn clear_input(&mut self) -> Result<(), Self::Error> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::other)
    }

    fn split(self) -> Result<(Self::Rx, Self::Tx), Self::Error> {
        let rx = self.port.try_clone().map_err(std::io::Error::other)?;
        Ok((SerialRx { port: rx }, SerialTx { port: self.port }))
    }
}
