//! Background receive loop.
//!
//! Polls the UART for buffered bytes, hands each chunk to the packet
//! handler together with the armed trigger, and publishes completion
//! counters the foreground can poll. Sleeps for [`IDLE_WAIT`] whenever the
//! UART is empty.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::ReaderConfig;
use crate::packet::PacketHandler;
use crate::ring_buffer::RingProducer;
use crate::transport::UartRx;
use crate::types::{AtomicTrigger, ReaderError};

/// Sleep between polls while the UART has nothing buffered
pub const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Largest chunk read from the UART per poll
pub const MAX_CHUNK: usize = 256;

/// State shared between the facade and the receive loop
#[derive(Debug)]
pub struct RxShared {
    pub trigger: AtomicTrigger,
    /// Payload length of the most recently accepted frame
    pub last_accepted_len: AtomicUsize,
    /// Frames accepted since construction
    pub frames_accepted: AtomicU64,
}

impl RxShared {
    pub fn new(trigger: AtomicTrigger) -> Self {
        Self {
            trigger,
            last_accepted_len: AtomicUsize::new(0),
            frames_accepted: AtomicU64::new(0),
        }
    }
}

/// Outcome of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Nothing buffered (or a read error); the caller should idle-wait
    Idle,
    /// A chunk of this many raw bytes was handed to the packet handler
    Chunk(usize),
}

pub struct ReceiveLoop<R: UartRx, H: PacketHandler> {
    rx: R,
    handler: H,
    ring: RingProducer,
    buf: [u8; MAX_CHUNK],
}

impl<R: UartRx, H: PacketHandler> ReceiveLoop<R, H> {
    pub fn new(rx: R, handler: H, ring: RingProducer) -> Self {
        Self {
            rx,
            handler,
            ring,
            buf: [0u8; MAX_CHUNK],
        }
    }

    /// Run one poll iteration without sleeping.
    pub fn poll_once(&mut self, shared: &RxShared) -> Poll {
        let available = match self.rx.buffered_len() {
            Ok(0) => return Poll::Idle,
            Ok(n) => n.min(MAX_CHUNK),
            Err(e) => {
                error!("UART buffered length query failed: {:?}", e);
                return Poll::Idle;
            }
        };

        let read = match self.rx.read(&mut self.buf[..available], 0) {
            Ok(0) => return Poll::Idle,
            Ok(n) => n,
            Err(e) => {
                error!("UART read failed: {:?}", e);
                return Poll::Idle;
            }
        };
        debug!("Received {} bytes", read);

        let trigger = shared.trigger.load();
        let accepted = self.handler.handle(&mut self.ring, trigger, &self.buf[..read]);
        if accepted.frames > 0 {
            shared
                .last_accepted_len
                .store(accepted.last_len, Ordering::Release);
            shared
                .frames_accepted
                .fetch_add(accepted.frames as u64, Ordering::AcqRel);
        }

        Poll::Chunk(read)
    }

    /// Poll until the facade owning `shared` is dropped.
    pub fn run(mut self, weak: Weak<RxShared>) {
        while let Some(shared) = weak.upgrade() {
            if self.poll_once(&shared) == Poll::Idle {
                drop(shared);
                std::thread::sleep(IDLE_WAIT);
            }
        }
        info!("Reader dropped, receive loop exiting");
    }
}

/// Spawn the receive loop on its own thread.
///
/// On ESP32 the thread is created with the configured priority and core
/// affinity; elsewhere those settings are only logged.
pub fn spawn_receive_loop<R, H>(
    config: &ReaderConfig,
    receive: ReceiveLoop<R, H>,
    shared: &Arc<RxShared>,
) -> Result<JoinHandle<()>, ReaderError>
where
    R: UartRx,
    H: PacketHandler,
{
    if config.priority_reserved() {
        warn!(
            "Task priority {} >= interrupt task priority, receive loop may starve interrupts",
            config.priority
        );
    }

    let weak = Arc::downgrade(shared);

    #[cfg(feature = "uart-esp32")]
    apply_spawn_configuration(config)?;

    let spawned = std::thread::Builder::new()
        .name("m100-rx".into())
        .stack_size(config.stack_size)
        .spawn(move || receive.run(weak));

    #[cfg(feature = "uart-esp32")]
    reset_spawn_configuration();

    spawned.map_err(|e| ReaderError::TaskCreation(e.to_string()))
}

#[cfg(feature = "uart-esp32")]
fn apply_spawn_configuration(config: &ReaderConfig) -> Result<(), ReaderError> {
    use esp_idf_svc::hal::cpu::Core as EspCore;
    use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;

    use crate::config::Core;

    let pin_to_core = match config.affinity {
        Core::Core0 => EspCore::Core0,
        Core::Core1 => EspCore::Core1,
    };

    ThreadSpawnConfiguration {
        name: Some(b"m100-rx\0"),
        stack_size: config.stack_size,
        priority: config.priority,
        pin_to_core: Some(pin_to_core),
        ..Default::default()
    }
    .set()
    .map_err(|e| ReaderError::TaskCreation(format!("{:?}", e)))
}

#[cfg(feature = "uart-esp32")]
fn reset_spawn_configuration() {
    use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;

    if let Err(e) = ThreadSpawnConfiguration::default().set() {
        warn!("Failed to restore thread spawn configuration: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{frame, GET_TX_POWER, TYPE_NOTIFICATION};
    use crate::packet::M100PacketHandler;
    use crate::ring_buffer::ring_buffer;
    use crate::types::Trigger;
    use std::collections::VecDeque;

    /// Receive half that serves scripted chunks, optionally failing first
    struct ScriptedRx {
        chunks: VecDeque<Vec<u8>>,
        fail_next: bool,
    }

    impl ScriptedRx {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
                fail_next: false,
            }
        }
    }

    impl UartRx for ScriptedRx {
        type Error = std::io::Error;

        fn buffered_len(&mut self) -> Result<usize, Self::Error> {
            Ok(self.chunks.front().map_or(0, Vec::len))
        }

        fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
            if self.fail_next {
                self.fail_next = false;
                return Err(std::io::Error::other("framing error"));
            }
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    fn shared(trigger: Trigger) -> RxShared {
        RxShared::new(AtomicTrigger::new(trigger))
    }

    #[test]
    fn test_idle_when_nothing_buffered() {
        let (tx, _rx) = ring_buffer(64);
        let mut receive = ReceiveLoop::new(ScriptedRx::new(vec![]), M100PacketHandler::new(), tx);

        assert_eq!(receive.poll_once(&shared(Trigger::Query)), Poll::Idle);
    }

    #[test]
    fn test_chunk_is_framed_and_counted() {
        let (tx, mut rx) = ring_buffer(64);
        let power = frame(TYPE_NOTIFICATION, GET_TX_POWER, &[0x07, 0xD0]);
        let mut receive = ReceiveLoop::new(ScriptedRx::new(vec![power.clone()]), M100PacketHandler::new(), tx);
        let state = shared(Trigger::PaPower);

        assert_eq!(receive.poll_once(&state), Poll::Chunk(power.len()));
        assert_eq!(state.frames_accepted.load(Ordering::Acquire), 1);
        assert_eq!(state.last_accepted_len.load(Ordering::Acquire), 2);
        assert_eq!(rx.read(64), vec![0x07, 0xD0]);
    }

    #[test]
    fn test_chunk_is_bounded() {
        let (tx, _rx) = ring_buffer(64);
        let big = vec![0u8; MAX_CHUNK + 10];
        let mut receive = ReceiveLoop::new(ScriptedRx::new(vec![big]), M100PacketHandler::new(), tx);
        let state = shared(Trigger::Query);

        assert_eq!(receive.poll_once(&state), Poll::Chunk(MAX_CHUNK));
        assert_eq!(receive.poll_once(&state), Poll::Chunk(10));
        assert_eq!(receive.poll_once(&state), Poll::Idle);
    }

    #[test]
    fn test_read_error_is_treated_as_no_data() {
        let (tx, mut rx) = ring_buffer(64);
        let power = frame(TYPE_NOTIFICATION, GET_TX_POWER, &[0x07, 0xD0]);
        let mut scripted = ScriptedRx::new(vec![power]);
        scripted.fail_next = true;
        let mut receive = ReceiveLoop::new(scripted, M100PacketHandler::new(), tx);
        let state = shared(Trigger::PaPower);

        assert_eq!(receive.poll_once(&state), Poll::Idle);
        assert!(matches!(receive.poll_once(&state), Poll::Chunk(_)));
        assert_eq!(rx.read(64), vec![0x07, 0xD0]);
    }

    #[test]
    fn test_trigger_is_read_every_poll() {
        let (tx, mut rx) = ring_buffer(64);
        let power = frame(TYPE_NOTIFICATION, GET_TX_POWER, &[0x07, 0xD0]);
        let mut receive = ReceiveLoop::new(
            ScriptedRx::new(vec![power.clone(), power]),
            M100PacketHandler::new(),
            tx,
        );
        let state = shared(Trigger::Stop);

        receive.poll_once(&state);
        assert!(rx.is_empty());

        state.trigger.store(Trigger::PaPower);
        receive.poll_once(&state);
        assert_eq!(rx.read(64), vec![0x07, 0xD0]);
    }

    #[test]
    fn test_run_exits_when_shared_state_dropped() {
        let (tx, _rx) = ring_buffer(64);
        let receive = ReceiveLoop::new(ScriptedRx::new(vec![]), M100PacketHandler::new(), tx);
        let state = Arc::new(shared(Trigger::Query));

        let handle = spawn_receive_loop(&ReaderConfig::default(), receive, &state).unwrap();
        drop(state);
        handle.join().unwrap();
    }
}
