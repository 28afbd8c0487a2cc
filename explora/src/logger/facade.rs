// src/logger/facade.rs
//
// Per-channel logger facades: build the event record for one operation
// and enqueue it on the channel's batcher. The learning-mode transform
// of the logged copy happens in the live model before these are called;
// the facades only record.

use std::sync::Arc;

use crate::config::LearningMode;
use crate::logger::batcher::EventBatcher;
use crate::logger::event::{
    ActionTaken, CbInteraction, ContextPayload, ContinuousInteraction, DecisionInteraction,
    EpisodeMarker, EventPayload, FloatOutcome, MultiSlotInteraction, MultistepInteraction,
    SlotRecord, StringOutcome,
};
use crate::responses::{ContinuousActionResponse, RankingResponse};
use crate::status::ApiResult;
use crate::time::TimeProvider;

pub struct InteractionLogger {
    batcher: EventBatcher,
}

impl InteractionLogger {
    pub fn new(batcher: EventBatcher) -> Self {
        Self { batcher }
    }

    pub fn log_rank(
        &self,
        context: &str,
        deferred: bool,
        response: &RankingResponse,
        mode: LearningMode,
    ) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::CbInteraction(CbInteraction {
                event_id: response.event_id.clone(),
                context: ContextPayload::Inline(context.to_string()),
                action_ids: response.action_ids().collect(),
                probabilities: response.probabilities().collect(),
                model_version: response.model_version.clone(),
                deferred,
                learning_mode: mode.as_str().to_string(),
            }))
    }

    /// Log a CCB-style decision; each slot record carries the event id
    /// attributed to that slot.
    pub fn log_decision(
        &self,
        context: &str,
        deferred: bool,
        slots: Vec<SlotRecord>,
        model_version: &str,
    ) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::DecisionInteraction(DecisionInteraction {
                context: ContextPayload::Inline(context.to_string()),
                slots,
                model_version: model_version.to_string(),
                deferred,
            }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_multi_slot(
        &self,
        event_id: &str,
        context: &str,
        deferred: bool,
        slots: Vec<SlotRecord>,
        baseline_actions: Option<Vec<u32>>,
        model_version: &str,
        mode: LearningMode,
    ) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::MultiSlotInteraction(MultiSlotInteraction {
                event_id: event_id.to_string(),
                context: ContextPayload::Inline(context.to_string()),
                slots,
                model_version: model_version.to_string(),
                deferred,
                learning_mode: mode.as_str().to_string(),
                baseline_actions,
            }))
    }

    pub fn log_continuous(
        &self,
        context: &str,
        deferred: bool,
        response: &ContinuousActionResponse,
    ) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::ContinuousInteraction(ContinuousInteraction {
                event_id: response.event_id.clone(),
                context: ContextPayload::Inline(context.to_string()),
                action: response.action,
                pdf_value: response.pdf_value,
                model_version: response.model_version.clone(),
                deferred,
            }))
    }

    pub fn log_multistep(
        &self,
        episode_id: &str,
        previous_event_id: Option<&str>,
        patched_context: &str,
        deferred: bool,
        response: &RankingResponse,
    ) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::MultistepInteraction(MultistepInteraction {
                episode_id: episode_id.to_string(),
                previous_event_id: previous_event_id.map(str::to_string),
                event_id: response.event_id.clone(),
                context: ContextPayload::Inline(patched_context.to_string()),
                action_ids: response.action_ids().collect(),
                probabilities: response.probabilities().collect(),
                model_version: response.model_version.clone(),
                deferred,
            }))
    }

    pub fn shutdown(&mut self) {
        self.batcher.shutdown();
    }
}

pub struct ObservationLogger {
    batcher: EventBatcher,
}

impl ObservationLogger {
    pub fn new(batcher: EventBatcher) -> Self {
        Self { batcher }
    }

    pub fn report_float(
        &self,
        event_id: &str,
        secondary_id: Option<&str>,
        secondary_index: Option<i32>,
        value: f32,
    ) -> ApiResult<()> {
        self.batcher.enqueue(EventPayload::FloatOutcome(FloatOutcome {
            event_id: event_id.to_string(),
            secondary_id: secondary_id.map(str::to_string),
            secondary_index,
            value,
        }))
    }

    pub fn report_string(
        &self,
        event_id: &str,
        secondary_id: Option<&str>,
        secondary_index: Option<i32>,
        value: &str,
    ) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::StringOutcome(StringOutcome {
                event_id: event_id.to_string(),
                secondary_id: secondary_id.map(str::to_string),
                secondary_index,
                value: value.to_string(),
            }))
    }

    pub fn report_action_taken(
        &self,
        event_id: &str,
        secondary_id: Option<&str>,
    ) -> ApiResult<()> {
        self.batcher.enqueue(EventPayload::ActionTaken(ActionTaken {
            event_id: event_id.to_string(),
            secondary_id: secondary_id.map(str::to_string),
        }))
    }

    pub fn shutdown(&mut self) {
        self.batcher.shutdown();
    }
}

pub struct EpisodeLogger {
    batcher: EventBatcher,
    time: Arc<dyn TimeProvider>,
}

impl EpisodeLogger {
    pub fn new(batcher: EventBatcher, time: Arc<dyn TimeProvider>) -> Self {
        Self { batcher, time }
    }

    /// Emit the once-per-episode marker record.
    pub fn log_episode(&self, episode_id: &str) -> ApiResult<()> {
        self.batcher
            .enqueue(EventPayload::EpisodeMarker(EpisodeMarker {
                episode_id: episode_id.to_string(),
                timestamp_ms: self.time.now_ms(),
            }))
    }

    pub fn shutdown(&mut self) {
        self.batcher.shutdown();
    }
}
