//! Per-peer send queue.
//!
//! The queue transmits its head as soon as it becomes idle and keeps a resend
//! timer running while the head waits for an answer. A head that expects a
//! response is sent at most twice: once when it becomes the head and once when
//! the timer expires. Popping the head (usually because the answer arrived)
//! cancels the timer and transmits the next entry.
//!
//! When the live entries drain, the next non-empty sub-queue of the pending
//! chain is spliced in.
//!
//! All state sits behind one mutex. Transmissions and handler calls are
//! collected while the lock is held and dispatched on the executor after it
//! has been released.

use crate::config::TimingConfig;
use crate::core::packet::{expects_response, Packet};
use crate::device::{Device, Peer};
use crate::error::constants::{ERR_DEVICE_DROPPED, ERR_LOCK_POISONED};
use crate::error::Result;
use crate::manager::keyed::TouchStamp;
use crate::protocol::message::MessageDescriptor;
use crate::protocol::registry::MessageRegistry;
use crate::queue::entry::{QueueEntry, QueueType};
use crate::queue::format::{QueueFormat, QUEUE_HEADER_LEN};
use crate::queue::pending::{PendingQueue, PendingQueues, VariableReset};
use crate::runtime::{sleep_ticks, Executor};
use crate::utils::metrics::global_metrics;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Everything a queue needs from its surroundings.
#[derive(Clone)]
pub struct QueueContext {
    pub device: Weak<dyn Device>,
    pub executor: Executor,
    pub timing: TimingConfig,
}

impl fmt::Debug for QueueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueContext")
            .field("device_alive", &(self.device.strong_count() > 0))
            .field("timing", &self.timing)
            .finish()
    }
}

type EmptyCallback = Arc<dyn Fn(&SendQueue) + Send + Sync>;

struct ArmedTimer {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    queue_type: QueueType,
    pending: PendingQueues,
    /// The live entries came from the chain head.
    working_on_pending: bool,
    resend_counter: u8,
    resend: Option<ArmedTimer>,
    /// Cancelled resend timer the next one waits for.
    retired_resend: Option<JoinHandle<()>>,
    pop_wait: Option<ArmedTimer>,
    next_timer_id: u64,
    peer: Option<Arc<Peer>>,
    variable_reset: Option<VariableReset>,
    on_empty: Option<EmptyCallback>,
}

enum Transmission {
    Packet(Arc<Packet>),
    Message(Arc<MessageDescriptor>, Option<Arc<Packet>>),
}

impl From<&QueueEntry> for Transmission {
    fn from(entry: &QueueEntry) -> Self {
        match entry {
            QueueEntry::Packet(packet) => Transmission::Packet(Arc::clone(packet)),
            QueueEntry::Message { message, packet } => {
                Transmission::Message(Arc::clone(message), packet.clone())
            }
        }
    }
}

/// Work collected under the lock and carried out after releasing it.
#[derive(Default)]
struct Effects {
    transmissions: Vec<Transmission>,
    resets: Vec<VariableReset>,
    on_empty: Option<EmptyCallback>,
}

struct QueueInner {
    id: u64,
    context: QueueContext,
    touch: Option<TouchStamp>,
    no_sending: AtomicBool,
    disposed: AtomicBool,
    state: Mutex<QueueState>,
}

/// Shared handle to a peer's send queue.
#[derive(Clone)]
pub struct SendQueue {
    inner: Arc<QueueInner>,
}

impl SendQueue {
    pub fn new(context: QueueContext, queue_type: QueueType) -> Self {
        Self::with_record(context, queue_type, 0, None)
    }

    /// Queue owned by a manager record; keep-alives refresh `touch`.
    pub(crate) fn with_record(
        context: QueueContext,
        queue_type: QueueType,
        id: u64,
        touch: Option<TouchStamp>,
    ) -> Self {
        let state = QueueState {
            queue_type,
            ..QueueState::default()
        };
        Self {
            inner: Arc::new(QueueInner {
                id,
                context,
                touch,
                no_sending: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                state: Mutex::new(state),
            }),
        }
    }

    /// Restore a persisted queue. The restored queue does not send until
    /// [`resume`](Self::resume) is called.
    pub fn deserialize(text: &str, registry: &MessageRegistry, context: QueueContext) -> Result<Self> {
        let queue = Self::new(context, QueueType::Empty);
        queue.inner.no_sending.store(true, Ordering::Release);
        if text.len() <= QUEUE_HEADER_LEN {
            return Ok(queue);
        }

        let decoded = QueueFormat::CURRENT.decode(text, registry)?;
        if decoded.dropped > 0 {
            warn!(dropped = decoded.dropped, "Restored queue lost entries");
        }
        {
            let mut state = queue.lock();
            state.queue_type = decoded.queue_type;
            state.entries = decoded.entries;
        }
        Ok(queue)
    }

    /// Persist the live entries. An empty queue serializes to an empty string.
    pub fn serialize(&self) -> Result<String> {
        let state = self.lock();
        if state.entries.is_empty() {
            return Ok(String::new());
        }
        QueueFormat::CURRENT.encode(state.queue_type, state.entries.iter())
    }

    pub fn serialize_pending(&self) -> Result<String> {
        self.lock().pending.serialize()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.lock().queue_type
    }

    pub fn set_queue_type(&self, queue_type: QueueType) {
        self.lock().queue_type = queue_type;
    }

    /// Transient peer of a pairing exchange.
    pub fn peer(&self) -> Option<Arc<Peer>> {
        self.lock().peer.clone()
    }

    pub fn set_peer(&self, peer: Option<Arc<Peer>>) {
        self.lock().peer = peer;
    }

    /// Called whenever the live entries and the pending chain have both drained.
    pub fn set_on_empty<F>(&self, callback: F)
    where
        F: Fn(&SendQueue) + Send + Sync + 'static,
    {
        self.lock().on_empty = Some(Arc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn front(&self) -> Option<QueueEntry> {
        self.lock().entries.front().cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn resend_counter(&self) -> u8 {
        self.lock().resend_counter
    }

    pub fn is_resend_armed(&self) -> bool {
        self.lock()
            .resend
            .as_ref()
            .is_some_and(|timer| !timer.token.is_cancelled())
    }

    pub fn is_sending_enabled(&self) -> bool {
        !self.inner.no_sending.load(Ordering::Acquire) && !self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn push_packet(&self, packet: Arc<Packet>) {
        self.push_entry(QueueEntry::Packet(packet));
    }

    /// Append a message. Outgoing messages need the request `packet` their
    /// handler answers; incoming messages are awaited and never transmitted.
    pub fn push_message(&self, message: Arc<MessageDescriptor>, packet: Option<Arc<Packet>>) {
        self.push_entry(QueueEntry::Message { message, packet });
    }

    pub fn push_entry(&self, entry: QueueEntry) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            self.push_back_locked(&mut state, entry, &mut effects);
        }
        self.apply(effects);
    }

    /// Insert `packet` before the current head and transmit it right away.
    pub fn push_front(&self, packet: Arc<Packet>) {
        let entry = QueueEntry::Packet(packet);
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            state.entries.push_front(entry);
            if self.is_sending_enabled() {
                state.resend_counter = 0;
                self.transmit_head(&mut state, &mut effects);
            }
        }
        self.apply(effects);
    }

    /// Append a sub-queue to the pending chain.
    ///
    /// The chain is spliced into the live queue only while the live queue is
    /// empty. With `pop_immediately` a sub-queue spliced by this call leaves
    /// the chain at once, so draining it continues with the next one.
    pub fn push_pending(&self, queue: PendingQueue, pop_immediately: bool, clear_chain: bool) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            if clear_chain {
                state.pending.clear();
                state.working_on_pending = false;
            }
            state.pending.push(queue);
            if state.entries.is_empty() && self.splice_pending(&mut state, &mut effects) && pop_immediately
            {
                state.pending.pop();
                state.working_on_pending = false;
            }
        }
        self.apply(effects);
    }

    /// Replace the whole pending chain.
    pub fn push_pending_chain(&self, chain: PendingQueues) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            state.pending = chain;
            state.working_on_pending = false;
            if state.entries.is_empty() {
                self.splice_pending(&mut state, &mut effects);
            }
        }
        self.apply(effects);
    }

    /// Remove the head, then transmit the next entry or splice in the next
    /// pending sub-queue.
    pub fn pop(&self) {
        self.pop_inner(None);
    }

    /// Stop resending and pop after `waiting`, unless another pop comes first.
    pub fn pop_wait(&self, waiting: Duration) {
        let mut state = self.lock();
        self.stop_resend(&mut state);
        if let Some(timer) = state.pop_wait.take() {
            timer.token.cancel();
        }

        let tick = self.inner.context.timing.pop_wait_tick;
        let ticks = waiting.as_nanos().div_ceil(tick.as_nanos().max(1)) as u32;
        let id = Self::next_timer_id(&mut state);
        let token = CancellationToken::new();
        let cancel = token.clone();
        let queue = Arc::downgrade(&self.inner);
        let task = self.inner.context.executor.spawn_timer(async move {
            if !sleep_ticks(&cancel, tick, ticks).await {
                return;
            }
            if let Some(inner) = queue.upgrade() {
                SendQueue { inner }.pop_inner(Some(id));
            }
        });
        state.pop_wait = Some(ArmedTimer { id, token, task });
    }

    /// Drop all live entries without transmitting anything.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Enable sending on a restored queue and transmit its head.
    pub fn resume(&self) {
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }
        self.inner.no_sending.store(false, Ordering::Release);
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            match state.entries.front() {
                None => {
                    self.splice_pending(&mut state, &mut effects);
                }
                Some(head) if head.is_sendable() => {
                    state.resend_counter = 0;
                    self.transmit_head(&mut state, &mut effects);
                }
                Some(_) => {}
            }
        }
        self.apply(effects);
    }

    /// Refresh the owning record's idle timer.
    pub fn keep_alive(&self) {
        if let Some(touch) = &self.inner.touch {
            touch.touch();
        }
    }

    /// Push the owning record's deadline further out, for slow exchanges.
    pub fn long_keep_alive(&self) {
        if let Some(touch) = &self.inner.touch {
            touch.extend(self.inner.context.timing.long_keep_alive);
        }
    }

    /// Cancel all timers and stop sending.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        let mut state = self.lock();
        self.stop_resend(&mut state);
        state.retired_resend = None;
        if let Some(timer) = state.pop_wait.take() {
            timer.token.cancel();
        }
        trace!(queue_id = self.inner.id, "Queue disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Drop a head that `descriptor` does not answer.
    ///
    /// A packet head or a head message other than `descriptor` is popped.
    /// Returns `false` if the new head is still a different message.
    pub(crate) fn pop_stale_head(&self, descriptor: &MessageDescriptor) -> bool {
        let mut effects = Effects::default();
        let answered = {
            let mut state = self.lock();
            let stale = state
                .entries
                .front()
                .is_some_and(|head| !descriptor.matches_entry(head));
            if !stale {
                return true;
            }
            self.keep_alive();
            if let Some(timer) = state.pop_wait.take() {
                timer.token.cancel();
            }
            self.pop_locked(&mut state, &mut effects);
            match state.entries.front() {
                Some(head @ QueueEntry::Message { .. }) => descriptor.matches_entry(head),
                _ => true,
            }
        };
        self.apply(effects);
        answered
    }

    fn pop_inner(&self, pop_wait_id: Option<u64>) {
        self.keep_alive();
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            match pop_wait_id {
                Some(id) => {
                    if state.pop_wait.as_ref().map(|timer| timer.id) != Some(id) {
                        return;
                    }
                    state.pop_wait = None;
                }
                None => {
                    if let Some(timer) = state.pop_wait.take() {
                        timer.token.cancel();
                    }
                }
            }
            self.pop_locked(&mut state, &mut effects);
        }
        self.apply(effects);
    }

    /// Pop the head and advance to the next entry.
    fn pop_locked(&self, state: &mut QueueState, effects: &mut Effects) {
        self.stop_resend(state);

        if state.entries.pop_front().is_none() {
            return;
        }
        trace!(queue_id = self.inner.id, remaining = state.entries.len(), "Popped queue head");

        match state.entries.front() {
            None => self.on_drained(state, effects),
            Some(head) if head.is_sendable() => {
                state.resend_counter = 0;
                if self.is_sending_enabled() {
                    self.transmit_head(state, effects);
                }
            }
            Some(_) => {}
        }
    }

    fn on_drained(&self, state: &mut QueueState, effects: &mut Effects) {
        if let Some(reset) = state.variable_reset.take() {
            effects.resets.push(reset);
        }
        if state.working_on_pending {
            state.pending.pop();
            state.working_on_pending = false;
        }
        state.pending.skip_empty();
        if state.pending.is_empty() {
            debug!(queue_id = self.inner.id, "Queue drained, no pending queues");
            effects.on_empty = state.on_empty.clone();
        } else {
            debug!(queue_id = self.inner.id, "Queue drained, continuing with pending queue");
            self.splice_pending(state, effects);
        }
    }

    /// Move the entries of the first non-empty chain element into the live
    /// queue. Returns whether anything was spliced.
    fn splice_pending(&self, state: &mut QueueState, effects: &mut Effects) -> bool {
        state.pending.skip_empty();
        let Some(front) = state.pending.front() else {
            return false;
        };
        let queue_type = front.queue_type();
        let variable_reset = front.variable_reset().cloned();
        let entries: Vec<QueueEntry> = front.entries().iter().cloned().collect();

        state.queue_type = queue_type;
        state.variable_reset = variable_reset;
        for entry in entries {
            self.push_back_locked(state, entry, effects);
        }
        state.working_on_pending = true;
        true
    }

    fn push_back_locked(&self, state: &mut QueueState, entry: QueueEntry, effects: &mut Effects) {
        let idle = match state.entries.len() {
            0 => true,
            1 => state
                .entries
                .front()
                .is_some_and(QueueEntry::is_incoming_message),
            _ => false,
        };
        let send = idle && entry.is_sendable() && self.is_sending_enabled();
        if send {
            effects.transmissions.push(Transmission::from(&entry));
        }
        state.entries.push_back(entry);
        if send {
            state.resend_counter = 0;
            self.arm_resend(state);
        }
    }

    fn transmit_head(&self, state: &mut QueueState, effects: &mut Effects) {
        if let Some(head) = state.entries.front() {
            effects.transmissions.push(Transmission::from(head));
            self.arm_resend(state);
        }
    }

    /// Replace the resend timer for the current head.
    ///
    /// Only heads whose control byte expects a response are resent. A new
    /// timer waits for the cancelled one to finish before it starts sleeping.
    fn arm_resend(&self, state: &mut QueueState) {
        self.stop_resend(state);
        if !self.is_sending_enabled() {
            return;
        }
        let Some(head) = state.entries.front() else {
            return;
        };
        if !expects_response(head.control_byte()) {
            trace!(queue_id = self.inner.id, "Head expects no response, not arming resend");
            return;
        }

        let timing = self.inner.context.timing;
        let first_arm = state.resend_counter == 0;
        let previous = state.retired_resend.take();
        let id = Self::next_timer_id(state);
        let token = CancellationToken::new();
        let cancel = token.clone();
        let queue = Arc::downgrade(&self.inner);

        let task = self.inner.context.executor.spawn_timer(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if first_arm
                && !sleep_ticks(&cancel, timing.resend_jitter_tick, timing.resend_jitter_ticks).await
            {
                return;
            }
            if !sleep_ticks(&cancel, timing.resend_tick, timing.resend_ticks).await {
                return;
            }
            if let Some(inner) = queue.upgrade() {
                SendQueue { inner }.on_resend_expired(id);
            }
        });
        state.resend = Some(ArmedTimer { id, token, task });
    }

    fn on_resend_expired(&self, timer_id: u64) {
        let mut effects = Effects::default();
        {
            let mut state = self.lock();
            let current = state
                .resend
                .as_ref()
                .is_some_and(|timer| timer.id == timer_id && !timer.token.is_cancelled());
            if !current {
                return;
            }
            if state.entries.is_empty() || !self.is_sending_enabled() {
                state.resend = None;
                return;
            }

            if state.resend_counter < 1 {
                state.resend_counter += 1;
                debug!(queue_id = self.inner.id, "No response, resending head");
                global_metrics().resend();
                self.transmit_head(&mut state, &mut effects);
            } else {
                debug!(queue_id = self.inner.id, "No response after resend, giving up");
                state.resend_counter = 0;
                state.resend = None;
            }
        }
        self.apply(effects);
    }

    fn stop_resend(&self, state: &mut QueueState) {
        if let Some(timer) = state.resend.take() {
            timer.token.cancel();
            state.retired_resend = Some(timer.task);
        }
    }

    fn next_timer_id(state: &mut QueueState) -> u64 {
        state.next_timer_id += 1;
        state.next_timer_id
    }

    fn apply(&self, effects: Effects) {
        let Effects {
            transmissions,
            resets,
            on_empty,
        } = effects;

        for transmission in transmissions {
            let device = self.inner.context.device.clone();
            let queue_id = self.inner.id;
            self.inner.context.executor.dispatch(move || match transmission {
                Transmission::Packet(packet) => match device.upgrade() {
                    Some(device) => {
                        global_metrics().packet_sent();
                        device.send_packet(packet);
                    }
                    None => warn!(queue_id, "{}", ERR_DEVICE_DROPPED),
                },
                Transmission::Message(message, packet) => {
                    if let Err(e) = message.invoke_outgoing(packet.as_ref()) {
                        global_metrics().handler_error();
                        error!(queue_id, error = %e, "Outgoing handler failed");
                    }
                }
            });
        }

        if !resets.is_empty() {
            if let Some(device) = self.inner.context.device.upgrade() {
                let peer = self.peer();
                for reset in &resets {
                    device.on_variable_reset(peer.as_ref(), reset);
                }
            }
        }

        if let Some(callback) = on_empty {
            callback(self);
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| {
            warn!(queue_id = self.inner.id, "{}", ERR_LOCK_POISONED);
            poisoned.into_inner()
        })
    }
}

impl fmt::Debug for SendQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SendQueue")
            .field("id", &self.inner.id)
            .field("queue_type", &state.queue_type)
            .field("len", &state.entries.len())
            .field("pending", &state.pending.len())
            .field("resend_counter", &state.resend_counter)
            .finish()
    }
}
