// src/logger/event.rs
//
// Serialized event records, one tagged enum across the three log
// channels, plus the batch payload envelope that goes over the wire.

use serde::{Deserialize, Serialize};

use crate::time::TimestampMs;

/// Context payload of an interaction: inlined JSON, or a reference into
/// the batch dictionary when deduplication replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextPayload {
    #[serde(rename = "inline")]
    Inline(String),
    #[serde(rename = "ref")]
    Ref(u32),
}

impl ContextPayload {
    pub fn as_inline(&self) -> Option<&str> {
        match self {
            ContextPayload::Inline(s) => Some(s.as_str()),
            ContextPayload::Ref(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbInteraction {
    pub event_id: String,
    pub context: ContextPayload,
    pub action_ids: Vec<u32>,
    pub probabilities: Vec<f32>,
    pub model_version: String,
    pub deferred: bool,
    pub learning_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot_id: String,
    pub action_ids: Vec<u32>,
    pub probabilities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSlotInteraction {
    pub event_id: String,
    pub context: ContextPayload,
    pub slots: Vec<SlotRecord>,
    pub model_version: String,
    pub deferred: bool,
    pub learning_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_actions: Option<Vec<u32>>,
}

/// CCB-style decision: each slot is attributed its own event id,
/// carried in the slot record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInteraction {
    pub context: ContextPayload,
    pub slots: Vec<SlotRecord>,
    pub model_version: String,
    pub deferred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousInteraction {
    pub event_id: String,
    pub context: ContextPayload,
    pub action: f32,
    pub pdf_value: f32,
    pub model_version: String,
    pub deferred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultistepInteraction {
    pub episode_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_event_id: Option<String>,
    pub event_id: String,
    pub context: ContextPayload,
    pub action_ids: Vec<u32>,
    pub probabilities: Vec<f32>,
    pub model_version: String,
    pub deferred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatOutcome {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_index: Option<i32>,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringOutcome {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_index: Option<i32>,
    pub value: String,
}

/// Marks a deferred event as acted upon even without a numeric outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTaken {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
}

/// Emitted once per episode, on its first multistep decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub episode_id: String,
    pub timestamp_ms: TimestampMs,
}

/// One queued event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EventPayload {
    CbInteraction(CbInteraction),
    DecisionInteraction(DecisionInteraction),
    MultiSlotInteraction(MultiSlotInteraction),
    ContinuousInteraction(ContinuousInteraction),
    MultistepInteraction(MultistepInteraction),
    FloatOutcome(FloatOutcome),
    StringOutcome(StringOutcome),
    ActionTaken(ActionTaken),
    EpisodeMarker(EpisodeMarker),
}

impl EventPayload {
    /// Inline interaction context, when this event carries one.
    pub fn inline_context(&self) -> Option<&str> {
        match self {
            EventPayload::CbInteraction(e) => e.context.as_inline(),
            EventPayload::DecisionInteraction(e) => e.context.as_inline(),
            EventPayload::MultiSlotInteraction(e) => e.context.as_inline(),
            EventPayload::ContinuousInteraction(e) => e.context.as_inline(),
            EventPayload::MultistepInteraction(e) => e.context.as_inline(),
            _ => None,
        }
    }

    /// Swap an inline context for a dictionary reference.
    pub fn set_context_ref(&mut self, id: u32) {
        let slot = match self {
            EventPayload::CbInteraction(e) => &mut e.context,
            EventPayload::DecisionInteraction(e) => &mut e.context,
            EventPayload::MultiSlotInteraction(e) => &mut e.context,
            EventPayload::ContinuousInteraction(e) => &mut e.context,
            EventPayload::MultistepInteraction(e) => &mut e.context,
            _ => return,
        };
        *slot = ContextPayload::Ref(id);
    }
}

/// Dictionary entry shipped ahead of the events that reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub id: u32,
    pub content_hash: String,
    pub payload: String,
}

/// The serialized batch body: protocol version, optional context
/// dictionary, then the events in enqueue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<Vec<DictionaryEntry>>,
    pub events: Vec<EventPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ref_swap_only_touches_interactions() {
        let mut interaction = EventPayload::CbInteraction(CbInteraction {
            event_id: "e1".into(),
            context: ContextPayload::Inline("{}".into()),
            action_ids: vec![0],
            probabilities: vec![1.0],
            model_version: "m".into(),
            deferred: false,
            learning_mode: "online".into(),
        });
        assert_eq!(interaction.inline_context(), Some("{}"));
        interaction.set_context_ref(3);
        assert_eq!(interaction.inline_context(), None);

        let mut outcome = EventPayload::FloatOutcome(FloatOutcome {
            event_id: "e1".into(),
            secondary_id: None,
            secondary_index: None,
            value: 1.5,
        });
        outcome.set_context_ref(3);
        assert_eq!(outcome.inline_context(), None);
    }

    #[test]
    fn batch_payload_round_trips_through_json() {
        let payload = BatchPayload {
            version: 2,
            dictionary: Some(vec![DictionaryEntry {
                id: 0,
                content_hash: "abc".into(),
                payload: "{}".into(),
            }]),
            events: vec![EventPayload::ActionTaken(ActionTaken {
                event_id: "e9".into(),
                secondary_id: Some("s1".into()),
            })],
        };
        let bytes = serde_json::to_vec(&payload).unwrap();
        let back: BatchPayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, payload);
    }
}
