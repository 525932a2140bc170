//! Driver for MagicRF M100 based UHF RFID reader modules on a UART.
//!
//! A background receive task frames incoming bytes, keeps the responses
//! matching the armed [`Trigger`] and queues their payloads in a lock-free
//! ring buffer. Commands are written from the caller's thread and never
//! wait for a response; collect results with [`Reader::value`].
//!
//! # Features
//!
//! - `uart-esp32` - UART transport for ESP32 using esp-idf-svc
//! - `serial` - Serial port transport for desktop using serialport crate
//!
//! # Example
//!
//! ```ignore
//! use magicrf::{Reader, ReaderConfig, SerialTransport, TagInfo, Trigger};
//!
//! let config = ReaderConfig::new(1).with_baud_rate(115200);
//! let transport = SerialTransport::new("/dev/ttyUSB0", &config)?;
//! let reader = Reader::new(config, transport)?;
//!
//! reader.trigger(Trigger::Query);
//! reader.query(10)?;
//!
//! if let Some(payload) = reader.value() {
//!     if let Some(tag) = TagInfo::from_notice(&payload) {
//!         println!("Found tag: {}", tag.epc);
//!     }
//! }
//! ```

pub mod checksum;
pub mod command;
mod config;
mod packet;
pub mod r2000;
mod reader;
pub mod receive;
mod ring_buffer;
mod transport;
mod types;

#[cfg(feature = "uart-esp32")]
mod uart;

#[cfg(feature = "serial")]
mod serial;

// Re-exports
pub use command::Command;
pub use config::{Core, ReaderConfig};
pub use packet::{Accepted, M100PacketHandler, PacketHandler};
pub use r2000::{R2000Command, R2000PacketHandler};
pub use reader::{Init, Reader, ReaderSlot};
pub use receive::{spawn_receive_loop, ReceiveLoop, IDLE_WAIT};
pub use ring_buffer::{ring_buffer, RingConsumer, RingProducer};
pub use transport::{RfidTransport, UartBinding, UartRx, UartTx};
pub use types::{
    QueryParams, QuerySel, QuerySession, QueryTarget, ReaderError, TagInfo, Trigger,
    MODE_DENSE_READER, MODE_HIGH_SENSITIVITY,
};

#[cfg(feature = "uart-esp32")]
pub use uart::UartTransport;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;
