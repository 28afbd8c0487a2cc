// src/live_model.rs
//
// The public decision-serving surface. One live model owns the
// inference model, the model-refresh loop, the per-channel logging
// pipelines and the watchdog; its decision and outcome methods are
// synchronous and safe to call from many threads.
//
// Per decision: validate → derive the exploration seed from the event
// id → score with the model → sample → log the interaction → check the
// watchdog. Per outcome: validate → log the observation. Background
// failures never surface mid-operation; they flip the watchdog and the
// next decision returns UnhandledBackgroundError.

use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::{defaults, keys, values, Configuration, LearningMode};
use crate::context::{inspect_context, require_multi_before_slots, ContextInfo};
use crate::episode::EpisodeState;
use crate::factories::{FactoryRegistries, SenderContext};
use crate::hashing::{event_seed, seed_shift_for_app};
use crate::ids;
use crate::logger::batcher::{BatcherConfig, EventBatcher};
use crate::logger::facade::{EpisodeLogger, InteractionLogger, ObservationLogger};
use crate::logger::preamble::Channel;
use crate::logger::sender::Sender;
use crate::logger::SlotRecord;
use crate::model::adapter::{InferenceModel, SlotRankings};
use crate::model::refresh::{refresh_once, spawn_refresh_loop};
use crate::model::transport::ModelTransport;
use crate::responses::{
    ActionProb, ContinuousActionResponse, DecisionResponse, MultiSlotResponse,
    MultiSlotResponseDetailed, RankingResponse, SlotDetail, SlotEntry, SlotRanking,
};
use crate::sampling;
use crate::status::{ApiError, ApiResult, ErrorCallback, ErrorReporter};
use crate::time::TimeProvider;
use crate::trace::TraceLogger;
use crate::watchdog::Watchdog;

/// Per-call flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const DEFAULT: EventFlags = EventFlags(0);
    /// The event is not finalised until a matching `report_action_taken`
    /// arrives.
    pub const DEFERRED: EventFlags = EventFlags(1);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_deferred(self) -> bool {
        self.0 & Self::DEFERRED.0 != 0
    }
}

impl BitOr for EventFlags {
    type Output = EventFlags;

    fn bitor(self, rhs: EventFlags) -> EventFlags {
        EventFlags(self.0 | rhs.0)
    }
}

/// Outcome payload accepted by `report_outcome`.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeValue {
    Numeric(f32),
    Text(String),
}

impl From<f32> for OutcomeValue {
    fn from(value: f32) -> Self {
        OutcomeValue::Numeric(value)
    }
}

impl From<&str> for OutcomeValue {
    fn from(value: &str) -> Self {
        OutcomeValue::Text(value.to_string())
    }
}

impl From<String> for OutcomeValue {
    fn from(value: String) -> Self {
        OutcomeValue::Text(value)
    }
}

/// Secondary identifier for multi-slot outcome attribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SecondaryId<'a> {
    /// Slot index within the decision.
    Index(i32),
    /// Slot id string.
    Id(&'a str),
}

pub struct LiveModelBuilder {
    config: Configuration,
    registries: FactoryRegistries,
    error_callback: Option<ErrorCallback>,
    interaction_sender: Option<Box<dyn Sender>>,
    observation_sender: Option<Box<dyn Sender>>,
    episode_sender: Option<Box<dyn Sender>>,
    model_transport: Option<Arc<dyn ModelTransport>>,
    model: Option<Arc<dyn InferenceModel>>,
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl LiveModelBuilder {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            registries: FactoryRegistries::default(),
            error_callback: None,
            interaction_sender: None,
            observation_sender: None,
            episode_sender: None,
            model_transport: None,
            model: None,
            time_provider: None,
        }
    }

    pub fn registries(mut self, registries: FactoryRegistries) -> Self {
        self.registries = registries;
        self
    }

    pub fn error_callback(mut self, callback: ErrorCallback) -> Self {
        self.error_callback = Some(callback);
        self
    }

    pub fn interaction_sender(mut self, sender: Box<dyn Sender>) -> Self {
        self.interaction_sender = Some(sender);
        self
    }

    pub fn observation_sender(mut self, sender: Box<dyn Sender>) -> Self {
        self.observation_sender = Some(sender);
        self
    }

    /// Providing an episode sender enables the episode channel.
    pub fn episode_sender(mut self, sender: Box<dyn Sender>) -> Self {
        self.episode_sender = Some(sender);
        self
    }

    pub fn model_transport(mut self, transport: Arc<dyn ModelTransport>) -> Self {
        self.model_transport = Some(transport);
        self
    }

    pub fn model(mut self, model: Arc<dyn InferenceModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = Some(time);
        self
    }

    pub fn build(self) -> ApiResult<LiveModel> {
        let Self {
            config,
            registries,
            error_callback,
            interaction_sender,
            observation_sender,
            episode_sender,
            model_transport,
            model,
            time_provider,
        } = self;

        let trace = registries.create_trace(
            config.get_or(keys::TRACE_LOG_IMPLEMENTATION, values::NULL_TRACE),
            &config,
        )?;
        trace.info("live model initializing");

        let protocol_version = config.protocol_version();
        validate_protocol(&config, protocol_version)?;

        let watchdog = Arc::new(Watchdog::new());
        let reporter = ErrorReporter::new(watchdog.clone(), error_callback);

        let model = match model {
            Some(m) => m,
            None => registries.create_model(
                config.get_or(keys::MODEL_IMPLEMENTATION, values::EXPLORE_ADF_MODEL),
                &config,
            )?,
        };
        let time = match time_provider {
            Some(t) => t,
            None => registries.create_time_provider(
                config.get_or(
                    keys::TIME_PROVIDER_IMPLEMENTATION,
                    values::CLOCK_TIME_PROVIDER,
                ),
                &config,
            )?,
        };
        let transport = match model_transport {
            Some(t) => t,
            None => registries
                .create_transport(config.get_or(keys::MODEL_SRC, values::NO_MODEL_DATA), &config)?,
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("explora-background")
            .enable_all()
            .build()
            .map_err(|e| {
                ApiError::background_thread_start(format!("failed to start runtime: {e}"))
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let model_ready = Arc::new(AtomicBool::new(false));
        let background_refresh =
            config.get_bool(keys::MODEL_BACKGROUND_REFRESH, true);
        if background_refresh {
            let _refresh_task = spawn_refresh_loop(
                runtime.handle(),
                transport.clone(),
                model.clone(),
                config.get_int(
                    keys::MODEL_REFRESH_INTERVAL_MS,
                    defaults::MODEL_REFRESH_INTERVAL_MS,
                ),
                model_ready.clone(),
                reporter.clone(),
                trace.clone(),
                shutdown_rx,
            );
        } else if let Err(e) = refresh_once(&*transport, &*model, &model_ready) {
            runtime.shutdown_background();
            return Err(e);
        }

        let sender_context = SenderContext {
            runtime: runtime.handle().clone(),
            reporter: reporter.clone(),
            trace: trace.clone(),
        };
        let loggers = build_loggers(
            &config,
            &registries,
            &sender_context,
            interaction_sender,
            observation_sender,
            episode_sender,
            watchdog.clone(),
            reporter.clone(),
            trace.clone(),
            time.clone(),
        );
        let (interaction_logger, observation_logger, episode_logger) = match loggers {
            Ok(loggers) => loggers,
            Err(e) => {
                // Fail-fast init: stop everything acquired so far.
                let _ = shutdown_tx.send(true);
                runtime.shutdown_background();
                return Err(e);
            }
        };

        let app_id = config.get_or(keys::APP_ID, "").to_string();
        let seed_shift = seed_shift_for_app(&app_id);
        let learning_mode = config.learning_mode();
        let shutdown_deadline_ms =
            config.get_int(keys::SHUTDOWN_DEADLINE_MS, defaults::SHUTDOWN_DEADLINE_MS);
        trace.info(&format!(
            "live model ready: mode={} protocol={} background_refresh={}",
            learning_mode.as_str(),
            protocol_version,
            background_refresh
        ));

        Ok(LiveModel {
            learning_mode,
            seed_shift,
            background_refresh,
            shutdown_deadline_ms,
            model,
            transport,
            model_ready,
            interaction_logger,
            observation_logger,
            episode_logger,
            watchdog,
            trace,
            runtime: Some(runtime),
            shutdown_tx,
        })
    }
}

fn validate_protocol(config: &Configuration, protocol_version: i64) -> ApiResult<()> {
    if protocol_version != 1 && protocol_version != 2 {
        return Err(ApiError::invalid_argument(format!(
            "unsupported protocol version {protocol_version}"
        )));
    }
    if protocol_version == 1 {
        let encoding_requested = config.get_bool(keys::INTERACTION_USE_COMPRESSION, false)
            || config.get_bool(keys::INTERACTION_USE_DEDUP, false)
            || config.get_bool(keys::OBSERVATION_USE_COMPRESSION, false);
        if encoding_requested {
            return Err(ApiError::content_encoding(
                "dedup and compression require protocol version 2",
            ));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_loggers(
    config: &Configuration,
    registries: &FactoryRegistries,
    sender_context: &SenderContext,
    interaction_sender: Option<Box<dyn Sender>>,
    observation_sender: Option<Box<dyn Sender>>,
    episode_sender: Option<Box<dyn Sender>>,
    watchdog: Arc<Watchdog>,
    reporter: ErrorReporter,
    trace: Arc<dyn TraceLogger>,
    time: Arc<dyn TimeProvider>,
) -> ApiResult<(InteractionLogger, ObservationLogger, Option<EpisodeLogger>)> {
    let interaction = start_channel(
        Channel::Interaction,
        keys::INTERACTION_SENDER_IMPLEMENTATION,
        config,
        registries,
        sender_context,
        interaction_sender,
        &watchdog,
        &reporter,
        &trace,
    )?;
    let observation = start_channel(
        Channel::Observation,
        keys::OBSERVATION_SENDER_IMPLEMENTATION,
        config,
        registries,
        sender_context,
        observation_sender,
        &watchdog,
        &reporter,
        &trace,
    )?;

    let episode_configured = episode_sender.is_some()
        || config.get(keys::EPISODE_SENDER_IMPLEMENTATION).is_some()
        || config.get("episode.file.name").is_some()
        || config.get("episode.eh.host").is_some();
    let episode = if episode_configured {
        let batcher = start_channel(
            Channel::Episode,
            keys::EPISODE_SENDER_IMPLEMENTATION,
            config,
            registries,
            sender_context,
            episode_sender,
            &watchdog,
            &reporter,
            &trace,
        )?;
        Some(EpisodeLogger::new(batcher, time))
    } else {
        None
    };

    Ok((
        InteractionLogger::new(interaction),
        ObservationLogger::new(observation),
        episode,
    ))
}

#[allow(clippy::too_many_arguments)]
fn start_channel(
    channel: Channel,
    sender_impl_key: &str,
    config: &Configuration,
    registries: &FactoryRegistries,
    sender_context: &SenderContext,
    sender_override: Option<Box<dyn Sender>>,
    watchdog: &Arc<Watchdog>,
    reporter: &ErrorReporter,
    trace: &Arc<dyn TraceLogger>,
) -> ApiResult<EventBatcher> {
    let mut channel_config = config.clone();
    channel_config.set_section(channel.as_str());
    let mut sender = match sender_override {
        Some(sender) => sender,
        None => registries.create_sender(
            config.get_or(sender_impl_key, values::FILE_SENDER),
            &channel_config,
            sender_context,
        )?,
    };
    sender.init(&channel_config)?;
    let batcher_config = BatcherConfig::from_configuration(channel, &channel_config);
    EventBatcher::start(
        batcher_config,
        sender,
        watchdog.clone(),
        reporter.clone(),
        trace.clone(),
    )
}

pub struct LiveModel {
    learning_mode: LearningMode,
    seed_shift: u64,
    background_refresh: bool,
    shutdown_deadline_ms: i64,
    model: Arc<dyn InferenceModel>,
    transport: Arc<dyn ModelTransport>,
    model_ready: Arc<AtomicBool>,
    interaction_logger: InteractionLogger,
    observation_logger: ObservationLogger,
    episode_logger: Option<EpisodeLogger>,
    watchdog: Arc<Watchdog>,
    trace: Arc<dyn TraceLogger>,
    runtime: Option<tokio::runtime::Runtime>,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for LiveModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveModel").finish_non_exhaustive()
    }
}

impl LiveModel {
    /// Build with defaults; use [`LiveModelBuilder`] for callbacks and
    /// custom seams.
    pub fn new(config: Configuration) -> ApiResult<Self> {
        LiveModelBuilder::new(config).build()
    }

    pub fn builder(config: Configuration) -> LiveModelBuilder {
        LiveModelBuilder::new(config)
    }

    /// Whether a model blob has been applied (diagnostics only;
    /// decisions work explore-only before that).
    pub fn is_model_ready(&self) -> bool {
        self.model_ready.load(Ordering::SeqCst)
    }

    pub fn learning_mode(&self) -> LearningMode {
        self.learning_mode
    }

    /// Rank the candidate actions of a context and log the interaction.
    /// A missing event id is auto-generated.
    pub fn choose_rank(
        &self,
        event_id: Option<&str>,
        context: &str,
        flags: EventFlags,
    ) -> ApiResult<RankingResponse> {
        let event_id = self.resolve_event_id(event_id)?;
        require_nonempty(context, "context")?;

        let seed = event_seed(self.seed_shift, &event_id);
        let ranked = self.model.choose_rank(&event_id, seed, context)?;
        let ranking = sampling::sample_and_reorder(seed, &ranked.action_ids, &ranked.pdf)?;
        let mut response = RankingResponse {
            event_id,
            model_version: ranked.model_version,
            ranking,
        };

        match self.learning_mode {
            LearningMode::Online => {
                self.interaction_logger.log_rank(
                    context,
                    flags.is_deferred(),
                    &response,
                    self.learning_mode,
                )?;
            }
            LearningMode::LoggingOnly => {
                // Baseline order both logged and returned.
                sampling::reset_action_order(&mut response);
                self.interaction_logger.log_rank(
                    context,
                    flags.is_deferred(),
                    &response,
                    self.learning_mode,
                )?;
            }
            LearningMode::Apprentice => {
                // The caller sees the sampled result; the log shadows
                // the baseline order.
                let mut logged = response.clone();
                sampling::reset_action_order(&mut logged);
                self.interaction_logger.log_rank(
                    context,
                    flags.is_deferred(),
                    &logged,
                    self.learning_mode,
                )?;
            }
        }

        self.surface_background_error()?;
        Ok(response)
    }

    /// Choose a continuous action and log the interaction.
    pub fn request_continuous_action(
        &self,
        event_id: Option<&str>,
        context: &str,
        flags: EventFlags,
    ) -> ApiResult<ContinuousActionResponse> {
        let event_id = self.resolve_event_id(event_id)?;
        require_nonempty(context, "context")?;

        let (action, pdf_value, model_version) = self.model.choose_continuous(context)?;
        let response = ContinuousActionResponse {
            event_id,
            model_version,
            action,
            pdf_value,
        };
        self.interaction_logger
            .log_continuous(context, flags.is_deferred(), &response)?;

        self.surface_background_error()?;
        Ok(response)
    }

    /// CCB-style decision: every slot draws its own event id from the
    /// slot's `_id` or an auto-generated one.
    pub fn request_decision(
        &self,
        context: &str,
        flags: EventFlags,
    ) -> ApiResult<DecisionResponse> {
        if self.learning_mode != LearningMode::Online {
            return Err(ApiError::not_supported(
                "request_decision supports only online learning mode",
            ));
        }
        require_nonempty(context, "context")?;
        let info = inspect_context(context)?;
        require_multi_before_slots(&info)?;

        let event_ids = self.complete_slot_ids(&info);
        let slots = self.model.request_decision(&event_ids, context)?;
        let response = DecisionResponse {
            model_version: slots.model_version.clone(),
            slots: event_ids
                .iter()
                .zip(slot_rankings_iter(&slots))
                .map(|(event_id, ranking)| SlotRanking {
                    event_id: event_id.clone(),
                    ranking,
                })
                .collect(),
        };

        let records = event_ids
            .iter()
            .zip(slots.action_ids.iter().zip(slots.pdfs.iter()))
            .map(|(event_id, (action_ids, pdfs))| SlotRecord {
                slot_id: event_id.clone(),
                action_ids: action_ids.clone(),
                probabilities: pdfs.clone(),
            })
            .collect();
        self.interaction_logger.log_decision(
            context,
            flags.is_deferred(),
            records,
            &slots.model_version,
        )?;

        self.surface_background_error()?;
        Ok(response)
    }

    /// Multi-slot decision returning the compact per-slot shape.
    pub fn request_multi_slot_decision(
        &self,
        event_id: Option<&str>,
        context: &str,
        flags: EventFlags,
        baseline_actions: Option<&[u32]>,
    ) -> ApiResult<MultiSlotResponse> {
        let (event_id, slot_ids, slots) =
            self.multi_slot_impl(event_id, context, flags, baseline_actions)?;

        let mut response = MultiSlotResponse {
            event_id,
            model_version: slots.model_version.clone(),
            slots: slot_ids
                .iter()
                .zip(slots.action_ids.iter().zip(slots.pdfs.iter()))
                .map(|(slot_id, (action_ids, pdfs))| SlotEntry {
                    slot_id: slot_id.clone(),
                    action_id: action_ids[0],
                    probability: pdfs[0],
                })
                .collect(),
        };
        if self.learning_mode == LearningMode::LoggingOnly {
            for (index, entry) in response.slots.iter_mut().enumerate() {
                entry.action_id = baseline_action_for(baseline_actions, index);
                entry.probability = 1.0;
            }
        }

        self.surface_background_error()?;
        Ok(response)
    }

    /// Multi-slot decision keeping each slot's full reordered pdf.
    pub fn request_multi_slot_decision_detailed(
        &self,
        event_id: Option<&str>,
        context: &str,
        flags: EventFlags,
        baseline_actions: Option<&[u32]>,
    ) -> ApiResult<MultiSlotResponseDetailed> {
        let (event_id, slot_ids, slots) =
            self.multi_slot_impl(event_id, context, flags, baseline_actions)?;

        let mut response = MultiSlotResponseDetailed {
            event_id,
            model_version: slots.model_version.clone(),
            slots: slot_ids
                .iter()
                .zip(slot_rankings_iter(&slots))
                .map(|(slot_id, ranking)| SlotDetail {
                    slot_id: slot_id.clone(),
                    ranking,
                })
                .collect(),
        };
        if self.learning_mode == LearningMode::LoggingOnly {
            for (index, slot) in response.slots.iter_mut().enumerate() {
                let target = baseline_action_for(baseline_actions, index);
                if let Some(pos) = slot.ranking.iter().position(|a| a.action_id == target) {
                    let chosen = slot.ranking.remove(pos);
                    slot.ranking.insert(0, chosen);
                }
            }
        }

        self.surface_background_error()?;
        Ok(response)
    }

    /// Multi-step decision within an episode. The episode marker is
    /// emitted once, on the first decision of the episode.
    pub fn request_episodic_decision(
        &self,
        event_id: &str,
        previous_event_id: Option<&str>,
        context: &str,
        flags: EventFlags,
        episode: &mut EpisodeState,
    ) -> ApiResult<RankingResponse> {
        let episode_logger = self.episode_logger.as_ref().ok_or_else(|| {
            ApiError::not_supported(
                "episodic decisions require an episode sender to be configured",
            )
        })?;
        require_nonempty(event_id, "event id")?;
        ids::validate_event_id(event_id).map_err(ApiError::invalid_argument)?;
        require_nonempty(context, "context")?;

        let seed = event_seed(self.seed_shift, event_id);
        let patched_context = episode.get_context(previous_event_id, context)?;
        let ranked =
            self.model
                .choose_rank_multistep(event_id, seed, &patched_context, episode.len())?;
        let ranking = sampling::sample_and_reorder(seed, &ranked.action_ids, &ranked.pdf)?;
        let response = RankingResponse {
            event_id: event_id.to_string(),
            model_version: ranked.model_version,
            ranking,
        };

        episode.update(event_id, previous_event_id, &response)?;
        if episode.len() == 1 {
            episode_logger.log_episode(episode.episode_id())?;
        }
        self.interaction_logger.log_multistep(
            episode.episode_id(),
            previous_event_id,
            &patched_context,
            flags.is_deferred(),
            &response,
        )?;

        self.surface_background_error()?;
        Ok(response)
    }

    /// Report a numeric or string outcome against an earlier event.
    pub fn report_outcome(
        &self,
        event_id: &str,
        outcome: impl Into<OutcomeValue>,
    ) -> ApiResult<()> {
        require_nonempty(event_id, "event id")?;
        self.dispatch_outcome(event_id, None, None, outcome.into())
    }

    /// Outcome attributed to a secondary id (slot index or slot id).
    pub fn report_outcome_for(
        &self,
        primary_id: &str,
        secondary: SecondaryId<'_>,
        outcome: impl Into<OutcomeValue>,
    ) -> ApiResult<()> {
        require_nonempty(primary_id, "event id")?;
        let (secondary_id, secondary_index) = match secondary {
            SecondaryId::Index(index) => (None, Some(index)),
            SecondaryId::Id(id) => {
                require_nonempty(id, "secondary id")?;
                (Some(id), None)
            }
        };
        self.dispatch_outcome(primary_id, secondary_id, secondary_index, outcome.into())
    }

    /// Mark a deferred event as acted upon.
    pub fn report_action_taken(&self, event_id: &str) -> ApiResult<()> {
        require_nonempty(event_id, "event id")?;
        self.observation_logger.report_action_taken(event_id, None)
    }

    pub fn report_action_taken_for(
        &self,
        primary_id: &str,
        secondary_id: &str,
    ) -> ApiResult<()> {
        require_nonempty(primary_id, "event id")?;
        require_nonempty(secondary_id, "secondary id")?;
        self.observation_logger
            .report_action_taken(primary_id, Some(secondary_id))
    }

    /// Pull and apply the model once. Only legal when background
    /// refresh is disabled.
    pub fn refresh_model(&self) -> ApiResult<()> {
        if self.background_refresh {
            return Err(ApiError::model_update(
                "cannot manually refresh the model while background refresh is enabled",
            ));
        }
        refresh_once(&*self.transport, &*self.model, &self.model_ready)?;
        Ok(())
    }

    fn dispatch_outcome(
        &self,
        event_id: &str,
        secondary_id: Option<&str>,
        secondary_index: Option<i32>,
        outcome: OutcomeValue,
    ) -> ApiResult<()> {
        match outcome {
            OutcomeValue::Numeric(value) => self.observation_logger.report_float(
                event_id,
                secondary_id,
                secondary_index,
                value,
            ),
            OutcomeValue::Text(value) => {
                require_nonempty(&value, "outcome")?;
                self.observation_logger.report_string(
                    event_id,
                    secondary_id,
                    secondary_index,
                    &value,
                )
            }
        }
    }

    /// Shared multi-slot path: validation, slot ids, model call, and
    /// the logged record with its learning-mode transform.
    fn multi_slot_impl(
        &self,
        event_id: Option<&str>,
        context: &str,
        flags: EventFlags,
        baseline_actions: Option<&[u32]>,
    ) -> ApiResult<(String, Vec<String>, SlotRankings)> {
        let event_id = self.resolve_event_id(event_id)?;
        require_nonempty(context, "context")?;
        let has_baseline = baseline_actions.map(|b| !b.is_empty()).unwrap_or(false);
        if self.learning_mode == LearningMode::Apprentice && !has_baseline {
            return Err(ApiError::baseline_actions_not_defined());
        }
        let info = inspect_context(context)?;
        require_multi_before_slots(&info)?;

        let slot_ids = self.complete_slot_ids(&info);
        let slots = self
            .model
            .request_multi_slot_decision(&event_id, &slot_ids, context)?;

        let records: Vec<SlotRecord> = match self.learning_mode {
            LearningMode::Online => slot_ids
                .iter()
                .zip(slots.action_ids.iter().zip(slots.pdfs.iter()))
                .map(|(slot_id, (action_ids, pdfs))| SlotRecord {
                    slot_id: slot_id.clone(),
                    action_ids: action_ids.clone(),
                    probabilities: pdfs.clone(),
                })
                .collect(),
            // The log shadows the baseline: each slot's chosen action is
            // the baseline action (or the slot index) at probability 1.
            LearningMode::Apprentice | LearningMode::LoggingOnly => slot_ids
                .iter()
                .enumerate()
                .map(|(index, slot_id)| SlotRecord {
                    slot_id: slot_id.clone(),
                    action_ids: vec![baseline_action_for(baseline_actions, index)],
                    probabilities: vec![1.0],
                })
                .collect(),
        };
        self.interaction_logger.log_multi_slot(
            &event_id,
            context,
            flags.is_deferred(),
            records,
            baseline_actions.map(<[u32]>::to_vec),
            &slots.model_version,
            self.learning_mode,
        )?;

        Ok((event_id, slot_ids, slots))
    }

    /// Fill in slot event ids: `_id` where present, otherwise an
    /// auto-generated uuid suffixed with the seed shift.
    fn complete_slot_ids(&self, info: &ContextInfo) -> Vec<String> {
        info.slot_ids
            .iter()
            .map(|id| match id {
                Some(id) => id.clone(),
                None => ids::generate_suffixed_event_id(self.seed_shift),
            })
            .collect()
    }

    fn resolve_event_id(&self, event_id: Option<&str>) -> ApiResult<String> {
        match event_id {
            Some(id) => {
                require_nonempty(id, "event id")?;
                ids::validate_event_id(id).map_err(ApiError::invalid_argument)?;
                Ok(id.to_string())
            }
            None => Ok(ids::generate_event_id()),
        }
    }

    /// Surface a pending background failure; clearing is part of the
    /// read so exactly one foreground call reports each failure burst.
    fn surface_background_error(&self) -> ApiResult<()> {
        if self.watchdog.has_background_error_been_reported() {
            return Err(ApiError::unhandled_background_error());
        }
        Ok(())
    }
}

impl Drop for LiveModel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.trace.info("live model shutting down");
        self.interaction_logger.shutdown();
        self.observation_logger.shutdown();
        if let Some(episode) = self.episode_logger.as_mut() {
            episode.shutdown();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(
                self.shutdown_deadline_ms.max(0) as u64
            ));
        }
    }
}

fn require_nonempty(value: &str, what: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid_argument(format!("{what} is empty")));
    }
    Ok(())
}

/// Baseline action for a slot: the configured baseline when it covers
/// the index (strict), otherwise the slot index itself.
fn baseline_action_for(baseline_actions: Option<&[u32]>, index: usize) -> u32 {
    match baseline_actions {
        Some(baseline) if baseline.len() > index => baseline[index],
        _ => index as u32,
    }
}

fn slot_rankings_iter(slots: &SlotRankings) -> impl Iterator<Item = Vec<ActionProb>> + '_ {
    slots
        .action_ids
        .iter()
        .zip(slots.pdfs.iter())
        .map(|(action_ids, pdfs)| {
            action_ids
                .iter()
                .zip(pdfs.iter())
                .map(|(&action_id, &probability)| ActionProb {
                    action_id,
                    probability,
                })
                .collect()
        })
}
