// src/config.rs
//
// Flat name→string configuration registry with typed accessors.
//
// Sender factories resolve per-channel options through a "current
// section" selector: with the section set to `interaction`, a lookup of
// `eh.host` tries `interaction.eh.host` first and falls back to the bare
// key. The registry itself never interprets values; parsing happens in
// the typed accessors with caller-supplied defaults.

use std::collections::HashMap;

/// Recognized configuration keys.
pub mod keys {
    pub const APP_ID: &str = "ApplicationID";
    pub const PROTOCOL_VERSION: &str = "protocol.version";
    pub const MODEL_SRC: &str = "model.source";
    pub const MODEL_IMPLEMENTATION: &str = "model.implementation";
    pub const MODEL_BACKGROUND_REFRESH: &str = "model.backgroundrefresh";
    pub const MODEL_REFRESH_INTERVAL_MS: &str = "model.refresh.intervalms";
    pub const MODEL_FILE_NAME: &str = "model.file.name";
    pub const MODEL_COMMAND_LINE: &str = "model.vw.initialcommandline";
    pub const LEARNING_MODE: &str = "rank.learning.mode";
    pub const INITIAL_EPSILON: &str = "InitialExplorationEpsilon";
    pub const INTERACTION_SENDER_IMPLEMENTATION: &str = "interaction.sender.implementation";
    pub const OBSERVATION_SENDER_IMPLEMENTATION: &str = "observation.sender.implementation";
    pub const EPISODE_SENDER_IMPLEMENTATION: &str = "episode.sender.implementation";
    pub const INTERACTION_USE_COMPRESSION: &str = "interaction.usedeferedcompression";
    pub const INTERACTION_USE_DEDUP: &str = "interaction.usededup";
    pub const OBSERVATION_USE_COMPRESSION: &str = "observation.usedeferedcompression";
    pub const TIME_PROVIDER_IMPLEMENTATION: &str = "time.provider.implementation";
    pub const TRACE_LOG_IMPLEMENTATION: &str = "trace.log.implementation";
    pub const SHUTDOWN_DEADLINE_MS: &str = "shutdown.deadline.ms";

    // Per-channel keys, resolved under the current section
    // (`interaction.*`, `observation.*`, `episode.*`).
    pub const FILE_NAME: &str = "file.name";
    pub const EH_HOST: &str = "eh.host";
    pub const EH_NAME: &str = "eh.name";
    pub const EH_TASKS_LIMIT: &str = "eh.tasks.limit";
    pub const EH_MAX_HTTP_RETRIES: &str = "eh.max.http.retries";
    pub const APIM_TASKS_LIMIT: &str = "apim.tasks.limit";
    pub const APIM_MAX_HTTP_RETRIES: &str = "apim.max.http.retries";
    pub const QUEUE_MAX_BYTES: &str = "queue.max.bytes";
    pub const BATCH_MAX_BYTES: &str = "batch.max.bytes";
    pub const BATCH_MAX_DURATION_MS: &str = "batch.max.duration.ms";
    pub const QUEUE_MODE: &str = "queue.mode";
}

/// Registry value names for factory-constructed implementations.
pub mod values {
    pub const NO_MODEL_DATA: &str = "NO_MODEL_DATA";
    pub const FILE_MODEL_DATA: &str = "FILE_MODEL_DATA";
    pub const EXPLORE_ADF_MODEL: &str = "EXPLORE_ADF";
    pub const FILE_SENDER: &str = "FILE_SENDER";
    pub const HTTP_API_SENDER: &str = "HTTP_API_SENDER";
    pub const NULL_TRACE: &str = "NULL_TRACE";
    pub const STDERR_TRACE: &str = "STDERR_TRACE";
    pub const CLOCK_TIME_PROVIDER: &str = "CLOCK_TIME_PROVIDER";
    pub const LEARNING_MODE_ONLINE: &str = "online";
    pub const LEARNING_MODE_APPRENTICE: &str = "apprentice";
    pub const LEARNING_MODE_LOGGINGONLY: &str = "loggingonly";
    pub const QUEUE_MODE_DROP: &str = "DROP";
    pub const QUEUE_MODE_BLOCK: &str = "BLOCK";
}

pub mod defaults {
    pub const PROTOCOL_VERSION: i64 = 2;
    pub const MODEL_REFRESH_INTERVAL_MS: i64 = 60_000;
    pub const INITIAL_EPSILON: f32 = 0.2;
    pub const EH_TASKS_LIMIT: i64 = 16;
    pub const EH_MAX_HTTP_RETRIES: i64 = 4;
    pub const QUEUE_MAX_BYTES: i64 = 32 * 1024 * 1024;
    pub const BATCH_MAX_BYTES: i64 = 1024 * 1024;
    pub const BATCH_MAX_DURATION_MS: i64 = 1_000;
    pub const SHUTDOWN_DEADLINE_MS: i64 = 5_000;
}

/// How a decision is explored, logged, and returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningMode {
    /// Sampled result is logged and returned as-is.
    Online,
    /// Sampled result is returned to the caller; the logged copy is reset
    /// to the baseline so training shadows a reference policy.
    Apprentice,
    /// Baseline is both logged and returned; the online policy only warms
    /// up in the background.
    LoggingOnly,
}

impl LearningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningMode::Online => values::LEARNING_MODE_ONLINE,
            LearningMode::Apprentice => values::LEARNING_MODE_APPRENTICE,
            LearningMode::LoggingOnly => values::LEARNING_MODE_LOGGINGONLY,
        }
    }

    /// Parse a mode name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<LearningMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            values::LEARNING_MODE_ONLINE => Some(LearningMode::Online),
            values::LEARNING_MODE_APPRENTICE => Some(LearningMode::Apprentice),
            values::LEARNING_MODE_LOGGINGONLY | "logging_only" => Some(LearningMode::LoggingOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    entries: HashMap<String, String>,
    section: Option<String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut cfg = Self::new();
        for (k, v) in pairs {
            cfg.set(k, v);
        }
        cfg
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Select the section consulted first by sectioned lookups.
    pub fn set_section(&mut self, section: impl Into<String>) {
        self.section = Some(section.into());
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Raw lookup: `<section>.<key>` when a section is selected, falling
    /// back to the bare key.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(section) = &self.section {
            let sectioned = format!("{section}.{key}");
            if let Some(v) = self.entries.get(&sectioned) {
                return Some(v.as_str());
            }
        }
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on"),
            None => default,
        }
    }

    pub fn protocol_version(&self) -> i64 {
        self.get_int(keys::PROTOCOL_VERSION, defaults::PROTOCOL_VERSION)
    }

    pub fn learning_mode(&self) -> LearningMode {
        self.get(keys::LEARNING_MODE)
            .and_then(LearningMode::parse)
            .unwrap_or(LearningMode::Online)
    }
}
