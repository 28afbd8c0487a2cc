// src/episode.rs
//
// Multi-step episode state. An episode is an ordered chain of decisions
// sharing an episode id; each step remembers its parent so the context
// handed to the policy can be patched with the chosen-action history of
// its chain.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::responses::RankingResponse;
use crate::status::{ApiError, ApiResult};

#[derive(Debug, Clone)]
struct EpisodeStep {
    event_id: String,
    previous_event_id: Option<String>,
    chosen_action_id: u32,
}

/// Ordered multistep decision history for one episode.
#[derive(Debug, Clone)]
pub struct EpisodeState {
    episode_id: String,
    steps: Vec<EpisodeStep>,
    index_by_event_id: HashMap<String, usize>,
}

impl EpisodeState {
    pub fn new(episode_id: impl Into<String>) -> Self {
        Self {
            episode_id: episode_id.into(),
            steps: Vec::new(),
            index_by_event_id: HashMap::new(),
        }
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Patch a raw context with the chosen-action chain ending at
    /// `previous_event_id`.
    ///
    /// The first step of an episode (no parent) passes the raw context
    /// through untouched. Later steps get a top-level `_history` array
    /// of `{event_id, chosen_action}` entries, root first.
    pub fn get_context(
        &self,
        previous_event_id: Option<&str>,
        raw_context: &str,
    ) -> ApiResult<String> {
        let previous = match previous_event_id.filter(|p| !p.is_empty()) {
            None => return Ok(raw_context.to_string()),
            Some(p) => p,
        };
        let chain = self.chain_ending_at(previous)?;

        let mut doc: Value = serde_json::from_str(raw_context)
            .map_err(|e| ApiError::json_parse(format!("malformed context: {e}")))?;
        let root = doc
            .as_object_mut()
            .ok_or_else(|| ApiError::json_parse("context root must be a JSON object"))?;
        let history: Vec<Value> = chain
            .iter()
            .map(|step| {
                json!({
                    "event_id": step.event_id,
                    "chosen_action": step.chosen_action_id,
                })
            })
            .collect();
        root.insert("_history".to_string(), Value::Array(history));
        serde_json::to_string(&doc)
            .map_err(|e| ApiError::json_parse(format!("failed to re-serialize context: {e}")))
    }

    /// Record a completed step. The first step establishes the episode.
    pub fn update(
        &mut self,
        event_id: &str,
        previous_event_id: Option<&str>,
        response: &RankingResponse,
    ) -> ApiResult<()> {
        if self.index_by_event_id.contains_key(event_id) {
            return Err(ApiError::invalid_argument(format!(
                "event id {event_id} already recorded in episode {}",
                self.episode_id
            )));
        }
        let previous = previous_event_id
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if let Some(prev) = &previous {
            if !self.index_by_event_id.contains_key(prev) {
                return Err(ApiError::invalid_argument(format!(
                    "previous event id {prev} is not part of episode {}",
                    self.episode_id
                )));
            }
        }
        let chosen_action_id = response.chosen_action_id().ok_or_else(|| {
            ApiError::invalid_argument("response carries no ranked actions")
        })?;
        self.index_by_event_id
            .insert(event_id.to_string(), self.steps.len());
        self.steps.push(EpisodeStep {
            event_id: event_id.to_string(),
            previous_event_id: previous,
            chosen_action_id,
        });
        Ok(())
    }

    /// Chain of steps from the episode root to `event_id`, inclusive.
    fn chain_ending_at(&self, event_id: &str) -> ApiResult<Vec<&EpisodeStep>> {
        let mut chain = Vec::new();
        let mut cursor = Some(event_id);
        while let Some(id) = cursor {
            let idx = self.index_by_event_id.get(id).ok_or_else(|| {
                ApiError::invalid_argument(format!(
                    "previous event id {id} is not part of episode {}",
                    self.episode_id
                ))
            })?;
            let step = &self.steps[*idx];
            chain.push(step);
            cursor = step.previous_event_id.as_deref();
        }
        chain.reverse();
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::ActionProb;

    fn mk_response(event_id: &str, chosen: u32) -> RankingResponse {
        RankingResponse {
            event_id: event_id.to_string(),
            model_version: "m1".to_string(),
            ranking: vec![
                ActionProb {
                    action_id: chosen,
                    probability: 0.5,
                },
                ActionProb {
                    action_id: chosen + 1,
                    probability: 0.5,
                },
            ],
        }
    }

    #[test]
    fn first_step_context_is_untouched() {
        let episode = EpisodeState::new("ep1");
        let raw = r#"{"shared":{},"_multi":[{"a":1}]}"#;
        assert_eq!(episode.get_context(None, raw).unwrap(), raw);
    }

    #[test]
    fn second_step_context_carries_the_chain() {
        let mut episode = EpisodeState::new("ep1");
        episode
            .update("ep1-1", None, &mk_response("ep1-1", 7))
            .unwrap();
        let raw = r#"{"_multi":[{"a":1},{"b":2}]}"#;
        let patched = episode.get_context(Some("ep1-1"), raw).unwrap();
        assert!(patched.contains("_history"));
        assert!(patched.contains("\"chosen_action\":7"));
        assert!(patched.contains("ep1-1"));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let episode = EpisodeState::new("ep1");
        let err = episode.get_context(Some("ghost"), "{}").unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::InvalidArgument);
    }

    #[test]
    fn duplicate_event_ids_are_rejected() {
        let mut episode = EpisodeState::new("ep1");
        episode
            .update("ep1-1", None, &mk_response("ep1-1", 0))
            .unwrap();
        let err = episode
            .update("ep1-1", None, &mk_response("ep1-1", 1))
            .unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::InvalidArgument);
    }
}
