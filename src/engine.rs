//! # Protocol Engine
//!
//! [`BidCoSEngine`] is the context object tying one local device to its
//! message registry, the dispatch executor and the two lifetime managers.
//! Everything is passed in at construction; the engine holds no globals
//! apart from the metrics counters.
//!
//! ## Example
//! ```rust,no_run
//! use bidcos_engine::config::EngineConfig;
//! use bidcos_engine::device::Device;
//! use bidcos_engine::engine::BidCoSEngine;
//! use bidcos_engine::protocol::registry::MessageRegistry;
//! use std::sync::Arc;
//!
//! async fn run(device: Arc<dyn Device>, registry: Arc<MessageRegistry>) -> bidcos_engine::error::Result<()> {
//!     let engine = BidCoSEngine::new(
//!         EngineConfig::default(),
//!         device,
//!         registry,
//!         tokio::runtime::Handle::current(),
//!     )?;
//!     engine.run_receive_loop(tokio::io::stdin()).await
//! }
//! ```

use crate::config::EngineConfig;
use crate::core::address::Address;
use crate::core::codec::BidCoSCodec;
use crate::core::packet::{Packet, Parsed};
use crate::device::Device;
use crate::error::{BidCoSError, Result};
use crate::manager::packet_manager::PacketManager;
use crate::manager::queue_manager::QueueManager;
use crate::protocol::message::MessageDescriptor;
use crate::protocol::registry::MessageRegistry;
use crate::queue::entry::QueueType;
use crate::queue::send_queue::{QueueContext, SendQueue};
use crate::runtime::Executor;
use crate::utils::metrics::{global_metrics, Timer};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::runtime::Handle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, instrument, trace, warn};

pub struct BidCoSEngine {
    config: EngineConfig,
    device: Arc<dyn Device>,
    registry: Arc<MessageRegistry>,
    executor: Executor,
    packets: PacketManager,
    queues: QueueManager,
    disposed: AtomicBool,
}

impl BidCoSEngine {
    /// Wire up an engine. Fails if `config` does not validate.
    pub fn new(
        config: EngineConfig,
        device: Arc<dyn Device>,
        registry: Arc<MessageRegistry>,
        handle: Handle,
    ) -> Result<Self> {
        config.validate_strict()?;

        let executor = Executor::new(handle, &config.executor);
        let packets = PacketManager::new(&config.timing, executor.clone());
        let queues = QueueManager::new(QueueContext {
            device: Arc::downgrade(&device),
            executor: executor.clone(),
            timing: config.timing,
        });

        info!(
            address = %device.address(),
            messages = registry.len(),
            max_dispatches = executor.limit(),
            "BidCoS engine started"
        );

        Ok(Self {
            config,
            device,
            registry,
            executor,
            packets,
            queues,
            disposed: AtomicBool::new(false),
        })
    }

    /// Parse one line from the radio stick and handle the packet.
    pub fn handle_line(&self, line: &str) -> Result<Arc<MessageDescriptor>> {
        let framed = self
            .config
            .transport
            .frame_prefix
            .is_some_and(|prefix| line.starts_with(prefix));
        self.handle_parsed(Packet::parse(line, framed))
    }

    /// Handle a decoded frame; parse warnings are logged, not fatal.
    pub fn handle_parsed(&self, parsed: Parsed<Packet>) -> Result<Arc<MessageDescriptor>> {
        if !parsed.is_clean() {
            global_metrics().parse_warning();
            for warning in &parsed.warnings {
                warn!(packet = %parsed.value, %warning, "Packet parsed with warning");
            }
        }
        self.handle_packet(Arc::new(parsed.value))
    }

    /// Record, authorize and dispatch one incoming packet.
    ///
    /// The packet becomes the sender's last packet, then is matched against
    /// the registry and checked against the sender's queue.
    #[instrument(skip(self, packet), fields(sender = %packet.sender(), message_type = packet.message_type()))]
    pub fn handle_packet(&self, packet: Arc<Packet>) -> Result<Arc<MessageDescriptor>> {
        if self.is_disposed() {
            return Err(BidCoSError::Disposed);
        }
        let _timer = Timer::start("handle_packet");
        global_metrics().packet_received();

        let sender = packet.sender();
        self.packets.set(sender, Arc::clone(&packet));
        let queue = self.queues.get(sender);

        match self
            .registry
            .dispatch_incoming(&packet, queue.as_ref(), &self.executor)
        {
            Ok(descriptor) => {
                trace!(packet = %packet, "Packet dispatched");
                Ok(descriptor)
            }
            Err(e) => {
                match &e {
                    BidCoSError::UnknownMessage(_) => {
                        global_metrics().unknown_message();
                        debug!(packet = %packet, "No message matches packet");
                    }
                    BidCoSError::AccessDenied(_) => {
                        global_metrics().access_denied();
                        debug!(packet = %packet, "Access denied");
                    }
                    other => warn!(error = %other, "Dispatch failed"),
                }
                Err(e)
            }
        }
    }

    /// Feed every line of `reader` to the engine until EOF.
    ///
    /// Per-packet failures are logged and skipped; only I/O errors end the loop.
    pub async fn run_receive_loop<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, BidCoSCodec::from_config(&self.config.transport));
        while let Some(frame) = frames.next().await {
            let parsed = frame?;
            if let Err(BidCoSError::Disposed) = self.handle_parsed(parsed) {
                debug!("Engine disposed, leaving receive loop");
                break;
            }
        }
        debug!("Receive loop finished");
        Ok(())
    }

    /// Start a new queue for `address`, replacing any existing one.
    pub fn create_queue(&self, address: Address, queue_type: QueueType) -> Result<SendQueue> {
        self.queues
            .create_queue(address, queue_type)
            .ok_or(BidCoSError::Disposed)
    }

    pub fn queue(&self, address: Address) -> Option<SendQueue> {
        self.queues.get(address)
    }

    /// Last packet received from `address`, if it has not expired yet.
    pub fn last_packet(&self, address: Address) -> Option<Arc<Packet>> {
        self.packets.get(address)
    }

    pub fn queues(&self) -> &QueueManager {
        &self.queues
    }

    pub fn packets(&self) -> &PacketManager {
        &self.packets
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop all timers and watchers and reject further packets.
    pub fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queues.dispose();
        self.packets.dispose();
        self.executor.close();
        global_metrics().log_metrics();
        info!(address = %self.device.address(), "BidCoS engine stopped");
    }
}

impl Drop for BidCoSEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BidCoSEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidCoSEngine")
            .field("address", &self.device.address())
            .field("messages", &self.registry.len())
            .field("queues", &self.queues.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
