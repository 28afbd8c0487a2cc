// src/logger/batcher.rs
//
// Byte-budgeted event batching. Foreground threads enqueue built
// events; a dedicated drain thread per channel closes batches on a size
// or age trigger, applies dedup and compression, frames the payload and
// hands it to the channel's sender.
//
// Queue accounting is in serialized bytes, not event counts. When the
// queue is full the configured policy either sheds the new event (Drop,
// counted on the watchdog and reported through the error callback) or
// parks the caller until space frees (Block, interaction channel only).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::{defaults, keys, values, Configuration};
use crate::logger::dedup::DedupDictionary;
use crate::logger::event::{BatchPayload, EventPayload};
use crate::logger::preamble::{frame_payload, Channel, Codec};
use crate::logger::sender::Sender;
use crate::status::{ApiError, ApiResult, ErrorReporter};
use crate::trace::TraceLogger;
use crate::watchdog::Watchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullQueuePolicy {
    Drop,
    Block,
}

impl FullQueuePolicy {
    pub fn parse(s: &str) -> Option<FullQueuePolicy> {
        match s.trim().to_ascii_uppercase().as_str() {
            values::QUEUE_MODE_DROP => Some(FullQueuePolicy::Drop),
            values::QUEUE_MODE_BLOCK => Some(FullQueuePolicy::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub channel: Channel,
    pub protocol_version: i64,
    pub max_queue_bytes: usize,
    pub max_batch_bytes: usize,
    pub max_batch_duration_ms: i64,
    pub full_queue_policy: FullQueuePolicy,
    pub use_dedup: bool,
    pub use_compression: bool,
    pub shutdown_deadline_ms: i64,
}

impl BatcherConfig {
    /// Read the per-channel batching options. `config` is expected to
    /// have its current section set to the channel.
    pub fn from_configuration(channel: Channel, config: &Configuration) -> Self {
        let requested_policy = FullQueuePolicy::parse(
            config.get_or(keys::QUEUE_MODE, values::QUEUE_MODE_DROP),
        )
        .unwrap_or(FullQueuePolicy::Drop);
        // Only the interaction path may block; observations and
        // episodes always shed.
        let full_queue_policy = if channel == Channel::Interaction {
            requested_policy
        } else {
            FullQueuePolicy::Drop
        };
        Self {
            channel,
            protocol_version: config.protocol_version(),
            max_queue_bytes: config.get_int(keys::QUEUE_MAX_BYTES, defaults::QUEUE_MAX_BYTES)
                as usize,
            max_batch_bytes: config.get_int(keys::BATCH_MAX_BYTES, defaults::BATCH_MAX_BYTES)
                as usize,
            max_batch_duration_ms: config
                .get_int(keys::BATCH_MAX_DURATION_MS, defaults::BATCH_MAX_DURATION_MS),
            full_queue_policy,
            use_dedup: channel == Channel::Interaction
                && config.get_bool(keys::INTERACTION_USE_DEDUP, false),
            use_compression: match channel {
                Channel::Interaction => {
                    config.get_bool(keys::INTERACTION_USE_COMPRESSION, false)
                }
                Channel::Observation => {
                    config.get_bool(keys::OBSERVATION_USE_COMPRESSION, false)
                }
                Channel::Episode => false,
            },
            shutdown_deadline_ms: config
                .get_int(keys::SHUTDOWN_DEADLINE_MS, defaults::SHUTDOWN_DEADLINE_MS),
        }
    }
}

struct QueuedEvent {
    payload: EventPayload,
    size: usize,
    enqueued: Instant,
}

struct QueueState {
    events: VecDeque<QueuedEvent>,
    queued_bytes: usize,
    closed: bool,
    closed_at: Option<Instant>,
}

struct SharedQueue {
    state: Mutex<QueueState>,
    data_ready: Condvar,
    space_ready: Condvar,
}

/// One batching pipeline: queue, drain thread, sender.
pub struct EventBatcher {
    cfg: BatcherConfig,
    queue: Arc<SharedQueue>,
    watchdog: Arc<Watchdog>,
    reporter: ErrorReporter,
    trace: Arc<dyn TraceLogger>,
    drain: Option<JoinHandle<()>>,
}

impl EventBatcher {
    pub fn start(
        cfg: BatcherConfig,
        sender: Box<dyn Sender>,
        watchdog: Arc<Watchdog>,
        reporter: ErrorReporter,
        trace: Arc<dyn TraceLogger>,
    ) -> ApiResult<Self> {
        let queue = Arc::new(SharedQueue {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                queued_bytes: 0,
                closed: false,
                closed_at: None,
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
        });
        let drain_queue = queue.clone();
        let drain_cfg = cfg.clone();
        let drain_watchdog = watchdog.clone();
        let drain_reporter = reporter.clone();
        let drain_trace = trace.clone();
        let drain = std::thread::Builder::new()
            .name(format!("explora-{}-batcher", cfg.channel.as_str()))
            .spawn(move || {
                run_drain(
                    drain_queue,
                    drain_cfg,
                    sender,
                    drain_watchdog,
                    drain_reporter,
                    drain_trace,
                )
            })
            .map_err(|e| {
                ApiError::background_thread_start(format!("failed to spawn batcher thread: {e}"))
            })?;
        Ok(Self {
            cfg,
            queue,
            watchdog,
            reporter,
            trace,
            drain: Some(drain),
        })
    }

    /// Enqueue one built event. Never blocks on network I/O; may park on
    /// the condvar when the Block policy is active and the queue is full.
    pub fn enqueue(&self, payload: EventPayload) -> ApiResult<()> {
        let size = serde_json::to_vec(&payload)
            .map_err(|e| ApiError::send_failed(format!("event serialization failed: {e}")))?
            .len();
        let mut state = self.queue.state.lock().expect("batcher queue poisoned");
        if state.closed {
            return Err(ApiError::send_failed("event pipeline is shut down"));
        }
        while state.queued_bytes + size > self.cfg.max_queue_bytes {
            match self.cfg.full_queue_policy {
                FullQueuePolicy::Drop => {
                    let queued_bytes = state.queued_bytes;
                    drop(state);
                    self.watchdog.record_dropped_event();
                    self.trace.warn(&format!(
                        "{} queue full ({queued_bytes} bytes queued), event dropped",
                        self.cfg.channel.as_str()
                    ));
                    self.reporter.report(&ApiError::queue_full(format!(
                        "{} queue full, event dropped",
                        self.cfg.channel.as_str()
                    )));
                    return Ok(());
                }
                FullQueuePolicy::Block => {
                    state = self
                        .queue
                        .space_ready
                        .wait(state)
                        .expect("batcher queue poisoned");
                    if state.closed {
                        return Err(ApiError::send_failed("event pipeline is shut down"));
                    }
                }
            }
        }
        state.queued_bytes += size;
        state.events.push_back(QueuedEvent {
            payload,
            size,
            enqueued: Instant::now(),
        });
        self.queue.data_ready.notify_one();
        Ok(())
    }

    /// Bytes currently queued (diagnostics and tests).
    pub fn queued_bytes(&self) -> usize {
        self.queue
            .state
            .lock()
            .expect("batcher queue poisoned")
            .queued_bytes
    }

    /// Close the queue and join the drain thread. The drain flushes what
    /// it can within the shutdown deadline; the rest is dropped and
    /// counted.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.queue.state.lock().expect("batcher queue poisoned");
            if !state.closed {
                state.closed = true;
                state.closed_at = Some(Instant::now());
            }
        }
        self.queue.data_ready.notify_all();
        self.queue.space_ready.notify_all();
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventBatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_drain(
    queue: Arc<SharedQueue>,
    cfg: BatcherConfig,
    sender: Box<dyn Sender>,
    watchdog: Arc<Watchdog>,
    reporter: ErrorReporter,
    trace: Arc<dyn TraceLogger>,
) {
    let mut dedup = cfg.use_dedup.then(DedupDictionary::new);
    while let Some(events) = collect_batch(&queue, &cfg, &watchdog, &reporter) {
        if events.is_empty() {
            continue;
        }
        match build_frame(&cfg, dedup.as_mut(), events) {
            Ok(frame) => {
                if let Err(e) = sender.send(frame) {
                    trace.warn(&format!(
                        "{} batch send failed: {e}",
                        cfg.channel.as_str()
                    ));
                    reporter.report(&e);
                }
            }
            Err(e) => {
                trace.error(&format!(
                    "{} batch serialization failed: {e}",
                    cfg.channel.as_str()
                ));
                reporter.report(&e);
            }
        }
        if let Some(dict) = dedup.as_mut() {
            dict.end_flush_window();
        }
    }
}

/// Wait for a batch worth of events. Returns None when the queue is
/// closed and drained (or the shutdown deadline has passed).
fn collect_batch(
    queue: &SharedQueue,
    cfg: &BatcherConfig,
    watchdog: &Watchdog,
    reporter: &ErrorReporter,
) -> Option<Vec<QueuedEvent>> {
    let batch_age = Duration::from_millis(cfg.max_batch_duration_ms.max(1) as u64);
    let mut state = queue.state.lock().expect("batcher queue poisoned");
    loop {
        if state.closed {
            let deadline_passed = state
                .closed_at
                .map(|t| t.elapsed() >= Duration::from_millis(cfg.shutdown_deadline_ms.max(0) as u64))
                .unwrap_or(false);
            if deadline_passed {
                let shed = state.events.len();
                for _ in &state.events {
                    watchdog.record_dropped_event();
                }
                state.events.clear();
                state.queued_bytes = 0;
                if shed > 0 {
                    drop(state);
                    reporter.report(&ApiError::queue_full(format!(
                        "{} shutdown deadline passed, {shed} queued events dropped",
                        cfg.channel.as_str()
                    )));
                }
                return None;
            }
            if state.events.is_empty() {
                return None;
            }
            // Closed but inside the deadline: flush immediately.
            let (count, _) = batch_prefix(&state.events, cfg.max_batch_bytes);
            return Some(take_events(&mut state, queue, count));
        }
        if state.events.is_empty() {
            state = queue
                .data_ready
                .wait(state)
                .expect("batcher queue poisoned");
            continue;
        }

        let oldest = state
            .events
            .front()
            .map(|e| e.enqueued)
            .unwrap_or_else(Instant::now);
        let deadline = oldest + batch_age;
        let now = Instant::now();
        let (count, size_reached) = batch_prefix(&state.events, cfg.max_batch_bytes);
        if size_reached || now >= deadline {
            return Some(take_events(&mut state, queue, count));
        }
        let (next, _timeout) = queue
            .data_ready
            .wait_timeout(state, deadline - now)
            .expect("batcher queue poisoned");
        state = next;
    }
}

/// Leading events that fit in one batch (always at least one), and
/// whether the size cap closed the batch.
fn batch_prefix(events: &VecDeque<QueuedEvent>, max_batch_bytes: usize) -> (usize, bool) {
    let mut bytes = 0usize;
    let mut count = 0usize;
    for event in events {
        if count > 0 && bytes + event.size > max_batch_bytes {
            return (count, true);
        }
        bytes += event.size;
        count += 1;
        if bytes >= max_batch_bytes {
            return (count, true);
        }
    }
    (count, false)
}

fn take_events(
    state: &mut QueueState,
    queue: &SharedQueue,
    count: usize,
) -> Vec<QueuedEvent> {
    let mut batch = Vec::with_capacity(count);
    for _ in 0..count {
        if let Some(event) = state.events.pop_front() {
            state.queued_bytes -= event.size;
            batch.push(event);
        }
    }
    queue.space_ready.notify_all();
    batch
}

fn build_frame(
    cfg: &BatcherConfig,
    dedup: Option<&mut DedupDictionary>,
    events: Vec<QueuedEvent>,
) -> ApiResult<Vec<u8>> {
    let mut payloads: Vec<EventPayload> = events.into_iter().map(|e| e.payload).collect();
    let dictionary = match dedup {
        Some(dict) => {
            for event in &mut payloads {
                if let Some(context) = event.inline_context() {
                    let id = dict.intern(context);
                    event.set_context_ref(id);
                }
            }
            let entries = dict.batch_dictionary();
            (!entries.is_empty()).then_some(entries)
        }
        None => None,
    };
    let batch = BatchPayload {
        version: cfg.protocol_version,
        dictionary,
        events: payloads,
    };
    let raw = serde_json::to_vec(&batch)
        .map_err(|e| ApiError::send_failed(format!("batch serialization failed: {e}")))?;
    let (codec, body) = if cfg.use_compression {
        let compressed = zstd::encode_all(&raw[..], 0)
            .map_err(|e| ApiError::content_encoding(format!("batch compression failed: {e}")))?;
        (Codec::Zstd, compressed)
    } else {
        (Codec::Identity, raw)
    };
    Ok(frame_payload(cfg.channel, codec, &body))
}
