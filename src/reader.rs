use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;

use log::{debug, error, info};

use crate::command::Command;
use crate::config::ReaderConfig;
use crate::packet::{M100PacketHandler, PacketHandler};
use crate::receive::{spawn_receive_loop, ReceiveLoop, RxShared};
use crate::ring_buffer::{ring_buffer, RingConsumer};
use crate::transport::{RfidTransport, UartTx};
use crate::types::{AtomicTrigger, QueryParams, ReaderError, Trigger};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to one physical reader module.
///
/// Owns the transmit half of the UART, the consuming half of the receive
/// ring and the armed trigger. The background receive loop is spawned on
/// construction and exits once the reader is dropped.
pub struct Reader<T: RfidTransport> {
    config: ReaderConfig,
    tx: Mutex<T::Tx>,
    ring: Mutex<RingConsumer>,
    shared: Arc<RxShared>,
    task: JoinHandle<()>,
}

impl<T: RfidTransport> Reader<T> {
    /// Create a reader for an M100 module on `transport`.
    pub fn new(config: ReaderConfig, transport: T) -> Result<Self, ReaderError> {
        Self::with_handler(config, transport, M100PacketHandler::new())
    }

    /// Create a reader that frames responses with `handler`.
    pub fn with_handler<H: PacketHandler>(
        config: ReaderConfig,
        mut transport: T,
        handler: H,
    ) -> Result<Self, ReaderError> {
        config.validate()?;
        if let Some(binding) = transport.binding() {
            config.check_binding(&binding)?;
        }

        transport
            .clear_input()
            .map_err(|e| ReaderError::Transport(format!("{:?}", e)))?;
        let (rx, tx) = transport
            .split()
            .map_err(|e| ReaderError::Transport(format!("{:?}", e)))?;

        let (producer, consumer) = ring_buffer(config.ring_capacity);
        let shared = Arc::new(RxShared::new(AtomicTrigger::new(Trigger::Query)));
        let task = spawn_receive_loop(&config, ReceiveLoop::new(rx, handler, producer), &shared)?;

        info!(
            "Reader on UART({}) at {} baud, receive task priority {} on {:?}",
            config.uart_num, config.baud_rate, config.priority, config.affinity
        );

        Ok(Self {
            config,
            tx: Mutex::new(tx),
            ring: Mutex::new(consumer),
            shared,
            task,
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Drain everything currently in the receive ring.
    ///
    /// Returns `None` when no data has arrived.
    pub fn value(&self) -> Option<Vec<u8>> {
        let mut ring = lock(&self.ring);
        let capacity = ring.capacity();
        let data = ring.read(capacity);
        (!data.is_empty()).then_some(data)
    }

    /// Arm the response type expected next. Never touches the UART.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        self.shared.trigger.store(trigger);
        true
    }

    pub fn armed_trigger(&self) -> Trigger {
        self.shared.trigger.load()
    }

    /// Set the demodulation mode (see [`crate::MODE_DENSE_READER`]).
    pub fn mode(&self, mode: u32) -> Result<bool, ReaderError> {
        Ok(self.send(Command::mode(mode)))
    }

    /// Request the current transmit power; arm [`Trigger::PaPower`] to collect it.
    pub fn read_power(&self) -> Result<bool, ReaderError> {
        Ok(self.send(Command::GetPower))
    }

    /// Set transmit power in dBm, clamped to the module's range.
    pub fn set_power(&self, dbm: f32) -> Result<bool, ReaderError> {
        Ok(self.send(Command::set_power(dbm)?))
    }

    /// Start an inventory of `loops` rounds (at most 65535).
    pub fn query(&self, loops: u32) -> Result<bool, ReaderError> {
        Ok(self.send(Command::query(loops)?))
    }

    /// Stop a running inventory.
    pub fn stop(&self) -> Result<bool, ReaderError> {
        Ok(self.send(Command::Stop))
    }

    /// Set the Gen2 Query parameters used by inventory rounds.
    pub fn param(&self, params: QueryParams) -> Result<bool, ReaderError> {
        Ok(self.send(Command::SetQueryParams(params)))
    }

    /// Payload length of the most recently accepted frame
    pub fn last_accepted_len(&self) -> usize {
        self.shared.last_accepted_len.load(Ordering::Acquire)
    }

    /// Frames accepted since construction; grows monotonically
    pub fn frames_accepted(&self) -> u64 {
        self.shared.frames_accepted.load(Ordering::Acquire)
    }

    pub fn receive_task(&self) -> &JoinHandle<()> {
        &self.task
    }

    /// Write one encoded command; `false` if the UART write failed.
    fn send(&self, command: Command) -> bool {
        let frame = command.encode();
        debug!("Sending command: {:02X?}", frame);

        match lock(&self.tx).write(&frame) {
            Ok(written) if written == frame.len() => true,
            Ok(written) => {
                error!("Short UART write: {} of {} bytes", written, frame.len());
                false
            }
            Err(e) => {
                error!("UART write error: {:?}", e);
                false
            }
        }
    }
}

/// Result of [`ReaderSlot::init`]
pub enum Init<'a, T: RfidTransport> {
    /// The reader was constructed by this call
    Created(&'a Reader<T>),
    /// A reader already existed; nothing was reconfigured
    AlreadyInitialized(&'a Reader<T>),
}

impl<'a, T: RfidTransport> Init<'a, T> {
    pub fn reader(&self) -> &'a Reader<T> {
        match *self {
            Init::Created(reader) | Init::AlreadyInitialized(reader) => reader,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Init::Created(_))
    }
}

/// Holds the single reader attached to a physical module.
///
/// Can live in a `static`. The first successful [`init`](Self::init) opens
/// the transport and spawns the receive task; later calls leave the
/// existing reader untouched.
pub struct ReaderSlot<T: RfidTransport> {
    reader: OnceLock<Reader<T>>,
    init_lock: Mutex<()>,
}

impl<T: RfidTransport> Default for ReaderSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RfidTransport> ReaderSlot<T> {
    pub const fn new() -> Self {
        Self {
            reader: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Construct the reader on first call.
    ///
    /// `open` configures and installs the UART; it only runs if no reader
    /// exists yet and the configuration is valid.
    pub fn init<F>(&self, config: ReaderConfig, open: F) -> Result<Init<'_, T>, ReaderError>
    where
        F: FnOnce() -> Result<T, T::Error>,
    {
        let _guard = lock(&self.init_lock);

        if let Some(reader) = self.reader.get() {
            info!("Reader already initialized on UART({})", reader.config.uart_num);
            return Ok(Init::AlreadyInitialized(reader));
        }

        config.validate()?;
        let transport = open().map_err(|e| ReaderError::Transport(format!("{:?}", e)))?;
        let reader = Reader::new(config, transport)?;

        Ok(Init::Created(self.reader.get_or_init(|| reader)))
    }

    pub fn get(&self) -> Option<&Reader<T>> {
        self.reader.get()
    }
}
