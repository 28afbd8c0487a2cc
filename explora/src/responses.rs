// src/responses.rs
//
// Decision results returned to the caller. The chosen action of a
// ranking is always the first element of the reordered list, so it is
// represented implicitly rather than stored twice.

use serde::{Deserialize, Serialize};

/// One (action id, sampling probability) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionProb {
    pub action_id: u32,
    pub probability: f32,
}

/// Explored ranking over the candidate actions of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResponse {
    pub event_id: String,
    pub model_version: String,
    /// Reordered action list; the sampled action is first.
    pub ranking: Vec<ActionProb>,
}

impl RankingResponse {
    pub fn chosen_action_id(&self) -> Option<u32> {
        self.ranking.first().map(|a| a.action_id)
    }

    pub fn chosen_probability(&self) -> Option<f32> {
        self.ranking.first().map(|a| a.probability)
    }

    pub fn action_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranking.iter().map(|a| a.action_id)
    }

    pub fn probabilities(&self) -> impl Iterator<Item = f32> + '_ {
        self.ranking.iter().map(|a| a.probability)
    }
}

/// Per-slot ranking for a CCB-style `request_decision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRanking {
    /// Event id attributed to this slot.
    pub event_id: String,
    /// Reordered action list; the slot's chosen action is first.
    pub ranking: Vec<ActionProb>,
}

impl SlotRanking {
    pub fn chosen_action_id(&self) -> Option<u32> {
        self.ranking.first().map(|a| a.action_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub model_version: String,
    pub slots: Vec<SlotRanking>,
}

/// Compact per-slot result for `request_multi_slot_decision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub slot_id: String,
    pub action_id: u32,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSlotResponse {
    pub event_id: String,
    pub model_version: String,
    pub slots: Vec<SlotEntry>,
}

/// Detailed per-slot result keeping the full reordered pdf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDetail {
    pub slot_id: String,
    /// Reordered action list; the slot's chosen action is first.
    pub ranking: Vec<ActionProb>,
}

impl SlotDetail {
    pub fn chosen_action_id(&self) -> Option<u32> {
        self.ranking.first().map(|a| a.action_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSlotResponseDetailed {
    pub event_id: String,
    pub model_version: String,
    pub slots: Vec<SlotDetail>,
}

/// Result of a continuous-action decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousActionResponse {
    pub event_id: String,
    pub model_version: String,
    pub action: f32,
    pub pdf_value: f32,
}
