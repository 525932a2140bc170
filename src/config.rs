//! Construction parameters for a [`crate::Reader`].

use crate::ring_buffer::{DEFAULT_RING_CAPACITY, MAX_RING_CAPACITY};
use crate::transport::UartBinding;
use crate::types::ReaderError;

/// Number of hardware UARTs; valid ports are below this
pub const UART_NUM_MAX: u8 = 3;

/// UART 0 carries the console and cannot host the reader
pub const CONSOLE_UART: u8 = 0;

/// Task priorities at or above this compete with interrupt service tasks
pub const RESERVED_PRIORITY: u8 = 11;

pub const DEFAULT_UART_NUM: u8 = 1;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_PRIORITY: u8 = 2;
pub const DEFAULT_STACK_SIZE: usize = 5 * 1024;

/// CPU core the receive task is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Core {
    #[default]
    Core0,
    Core1,
}

impl From<u32> for Core {
    /// Any non-zero index selects the second core.
    fn from(index: u32) -> Self {
        if index == 0 { Core::Core0 } else { Core::Core1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub uart_num: u8,
    /// `None` accepts whichever pin the transport was built on
    pub tx_pin: Option<i32>,
    pub rx_pin: Option<i32>,
    pub baud_rate: u32,
    /// Receive task priority
    pub priority: u8,
    pub affinity: Core,
    /// Receive task stack size in bytes
    pub stack_size: usize,
    /// Ring buffer capacity in bytes
    pub ring_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            uart_num: DEFAULT_UART_NUM,
            tx_pin: None,
            rx_pin: None,
            baud_rate: DEFAULT_BAUD_RATE,
            priority: DEFAULT_PRIORITY,
            affinity: Core::Core0,
            stack_size: DEFAULT_STACK_SIZE,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl ReaderConfig {
    pub fn new(uart_num: u8) -> Self {
        Self {
            uart_num,
            ..Self::default()
        }
    }

    pub fn with_pins(mut self, tx: i32, rx: i32) -> Self {
        self.tx_pin = Some(tx);
        self.rx_pin = Some(rx);
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_affinity(mut self, affinity: Core) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Check the configuration before any hardware is touched.
    pub fn validate(&self) -> Result<(), ReaderError> {
        if self.uart_num >= UART_NUM_MAX {
            return Err(ReaderError::InvalidArgument(format!(
                "UART({}) does not exist",
                self.uart_num
            )));
        }

        if self.uart_num == CONSOLE_UART {
            return Err(ReaderError::InvalidArgument(
                "UART(0) is disabled (dedicated to the console)".into(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(ReaderError::InvalidArgument("baud rate must be non-zero".into()));
        }

        if self.ring_capacity == 0 || self.ring_capacity > MAX_RING_CAPACITY {
            return Err(ReaderError::InvalidArgument(format!(
                "ring capacity {} out of range 1-{}",
                self.ring_capacity, MAX_RING_CAPACITY
            )));
        }

        Ok(())
    }

    /// Check that a transport was built on the configured port, baud rate
    /// and pins.
    pub fn check_binding(&self, binding: &UartBinding) -> Result<(), ReaderError> {
        if binding.uart_num != self.uart_num {
            return Err(ReaderError::InvalidArgument(format!(
                "transport is on UART({}), configured for UART({})",
                binding.uart_num, self.uart_num
            )));
        }

        if binding.baud_rate != self.baud_rate {
            return Err(ReaderError::InvalidArgument(format!(
                "transport runs at {} baud, configured for {}",
                binding.baud_rate, self.baud_rate
            )));
        }

        for (name, configured, actual) in [
            ("tx", self.tx_pin, binding.tx_pin),
            ("rx", self.rx_pin, binding.rx_pin),
        ] {
            match configured {
                Some(pin) if pin != actual => {
                    return Err(ReaderError::InvalidArgument(format!(
                        "transport {} pin is GPIO{}, configured GPIO{}",
                        name, actual, pin
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// True if the receive task priority may starve interrupt service tasks.
    pub fn priority_reserved(&self) -> bool {
        self.priority >= RESERVED_PRIORITY
    }
}
