// src/logger/mod.rs
//
// Event-logging pipeline: event records, per-channel batching with
// optional dedup and compression, preamble framing, and pluggable byte
// senders.

pub mod batcher;
pub mod dedup;
pub mod event;
pub mod facade;
pub mod preamble;
pub mod sender;

pub use batcher::{BatcherConfig, EventBatcher, FullQueuePolicy};
pub use event::{BatchPayload, DictionaryEntry, EventPayload, SlotRecord};
pub use facade::{EpisodeLogger, InteractionLogger, ObservationLogger};
pub use preamble::{frame_payload, Channel, Codec, Preamble, PREAMBLE_LENGTH};
pub use sender::{FileSender, HttpApiSender, MemorySender, Sender};
