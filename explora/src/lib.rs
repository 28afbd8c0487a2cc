//! Explora core library.
//!
//! Online contextual-bandit decision serving with delayed reward
//! attribution. A host application asks the [`LiveModel`] to rank
//! candidate actions (or fill slots, or pick a continuous action) for a
//! context; the core returns an explored choice, logs the interaction
//! for off-policy learning, and later accepts outcome reports against
//! the same event id. A background loop keeps the local model fresh
//! from a pluggable transport.
//!
//! # Architecture
//!
//! - **Decisions** (`live_model`, `sampling`, `responses`): synchronous,
//!   thread-safe ranking / slate / continuous-action calls. Exploration
//!   is deterministic in the `(application, event id)` seed.
//!
//! - **Model management** (`model`): a narrow inference seam with an
//!   explore-only cold start, snapshot swaps behind a read-write lock,
//!   and a periodic refresh loop.
//!
//! - **Event logging** (`logger`): per-channel batching with byte
//!   budgets, optional context dedup and compression, preamble framing,
//!   and pluggable byte senders with bounded retry.
//!
//! - **Supervision** (`watchdog`, `status`): background failures are
//!   delivered to the error callback and flip the watchdog; the next
//!   foreground decision surfaces `UnhandledBackgroundError`.

pub mod config;
pub mod context;
pub mod episode;
pub mod factories;
pub mod hashing;
pub mod ids;
pub mod live_model;
pub mod logger;
pub mod model;
pub mod responses;
pub mod sampling;
pub mod status;
pub mod time;
pub mod trace;
pub mod watchdog;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{Configuration, LearningMode};
pub use episode::EpisodeState;
pub use live_model::{
    EventFlags, LiveModel, LiveModelBuilder, OutcomeValue, SecondaryId,
};
pub use responses::{
    ActionProb, ContinuousActionResponse, DecisionResponse, MultiSlotResponse,
    MultiSlotResponseDetailed, RankingResponse, SlotDetail, SlotEntry, SlotRanking,
};
pub use status::{ApiError, ApiResult, ErrorCallback, ErrorCode};
pub use watchdog::Watchdog;
