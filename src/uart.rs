//! UART transport for ESP32 using esp-idf-svc

use crate::config::ReaderConfig;
use crate::transport::{RfidTransport, UartBinding, UartRx, UartTx};
use crate::types::ReaderError;
use esp_idf_svc::hal::gpio::{self, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartDriver, UartRxDriver, UartTxDriver};
use esp_idf_svc::sys::EspError;
use std::time::Duration;

/// Driver-side receive and transmit buffer sizes
const RX_BUFFER_SIZE: usize = 2048;
const TX_BUFFER_SIZE: usize = 2048;

/// Configured, installed UART driving the reader module.
pub struct UartTransport {
    uart: UartDriver<'static>,
    binding: UartBinding,
}

impl UartTransport {
    /// Install the driver for `config` on the given peripherals, 8N1 at
    /// `config.baud_rate`.
    ///
    /// The UART peripheral must be the configured port and, where
    /// `config` names pins, the pin peripherals must be those GPIOs.
    /// Nothing is installed if the config or the peripherals are rejected.
    pub fn new<U, TX, RX>(
        config: &ReaderConfig,
        uart: impl Peripheral<P = U> + 'static,
        tx: impl Peripheral<P = TX> + 'static,
        rx: impl Peripheral<P = RX> + 'static,
    ) -> Result<Self, ReaderError>
    where
        U: uart::Uart,
        TX: OutputPin,
        RX: InputPin,
    {
        config.validate()?;

        let tx = tx.into_ref();
        let rx = rx.into_ref();
        let binding = UartBinding {
            uart_num: U::port() as u8,
            baud_rate: config.baud_rate,
            tx_pin: tx.pin() as i32,
            rx_pin: rx.pin() as i32,
        };
        config.check_binding(&binding)?;

        let driver_config = uart::config::Config::default()
            .baudrate(config.baud_rate.into())
            .rx_fifo_size(RX_BUFFER_SIZE)
            .tx_fifo_size(TX_BUFFER_SIZE);
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<gpio::Gpio0>::None,
            Option::<gpio::Gpio0>::None,
            &driver_config,
        )
        .map_err(|e| ReaderError::Transport(format!("{:?}", e)))?;

        std::thread::sleep(Duration::from_millis(500));
        uart.clear_rx()
            .map_err(|e| ReaderError::Transport(format!("{:?}", e)))?;

        Ok(Self { uart, binding })
    }
}

impl UartRx for UartRxDriver<'static> {
    type Error = EspError;

    fn buffered_len(&mut self) -> Result<usize, Self::Error> {
        self.remaining_read()
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        UartRxDriver::read(self, buf, timeout_ms)
    }
}

impl UartTx for UartTxDriver<'static> {
    type Error = EspError;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        UartTxDriver::write(self, data)
    }
}

impl RfidTransport for UartTransport {
    type Error = EspError;
    type Rx = UartRxDriver<'static>;
    type Tx = UartTxDriver<'static>;

    fn binding(&self) -> Option<UartBinding> {
        Some(self.binding)
    }

    fn clear_input(&mut self) -> Result<(), Self::Error> {
        self.uart.clear_rx()
    }

    fn split(self) -> Result<(Self::Rx, Self::Tx), Self::Error> {
        let (tx, rx) = self.uart.into_split();
        Ok((rx, tx))
    }
}
