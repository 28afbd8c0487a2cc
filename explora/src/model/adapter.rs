// src/model/adapter.rs
//
// Narrow seam to the underlying learner plus the built-in
// explore-ADF-style implementation.
//
// Before the first successful update the adapter runs explore-only: a
// uniform pdf synthesized from the context's `_multi` length, so
// decisions keep flowing during cold start. Updates swap an immutable
// snapshot behind a read-write lock; an in-flight decision holds the old
// snapshot by Arc and is never exposed to a half-applied model.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;

use crate::context::inspect_context;
use crate::hashing::stable_hash64;
use crate::model::transport::ModelData;
use crate::model::ModelKind;
use crate::sampling;
use crate::status::{ApiError, ApiResult};

/// Version string reported while no model is loaded.
pub const EXPLORE_ONLY_MODEL_VERSION: &str = "explore-only";

/// Ranked candidate actions with their sampling pdf.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedActions {
    pub action_ids: Vec<u32>,
    pub pdf: Vec<f32>,
    pub model_version: String,
}

/// Per-slot explored rankings.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRankings {
    pub action_ids: Vec<Vec<u32>>,
    pub pdfs: Vec<Vec<f32>>,
    pub model_version: String,
}

pub trait InferenceModel: Send + Sync {
    /// Score a context and return candidate action ids with a pdf.
    fn choose_rank(&self, event_id: &str, seed: u64, context: &str) -> ApiResult<RankedActions>;

    /// Choose a continuous action: (action, pdf value at the action).
    fn choose_continuous(&self, context: &str) -> ApiResult<(f32, f32, String)>;

    /// Per-slot explored rankings for a CCB-style decision; one event id
    /// per slot.
    fn request_decision(&self, event_ids: &[String], context: &str) -> ApiResult<SlotRankings>;

    /// Per-slot explored rankings for a multi-slot decision under one
    /// event id.
    fn request_multi_slot_decision(
        &self,
        event_id: &str,
        slot_ids: &[String],
        context: &str,
    ) -> ApiResult<SlotRankings>;

    /// Multi-step variant of `choose_rank` over a history-patched
    /// context.
    fn choose_rank_multistep(
        &self,
        event_id: &str,
        seed: u64,
        patched_context: &str,
        history_len: usize,
    ) -> ApiResult<RankedActions>;

    /// Replace the model weights from a serialized blob. Returns whether
    /// the model is ready for inference.
    fn update(&self, data: &ModelData) -> ApiResult<bool>;

    fn model_kind(&self) -> ModelKind;

    fn is_loaded(&self) -> bool;
}

/// Serialized model blob accepted by [`ExploreAdfModel::update`].
#[derive(Debug, Deserialize)]
struct ModelDocument {
    model_id: String,
    #[serde(default)]
    epsilon: Option<f32>,
    #[serde(default)]
    weights: HashMap<String, f32>,
}

#[derive(Debug)]
struct ModelSnapshot {
    version: String,
    epsilon: Option<f32>,
    /// Feature-token hash → weight.
    weights: HashMap<u64, f32>,
}

impl ModelSnapshot {
    fn score(&self, tokens: &[String]) -> f32 {
        tokens
            .iter()
            .map(|t| {
                self.weights
                    .get(&stable_hash64(0, t))
                    .copied()
                    .unwrap_or(0.0)
            })
            .sum()
    }
}

/// Built-in epsilon-greedy linear scorer over hashed feature tokens.
pub struct ExploreAdfModel {
    kind: ModelKind,
    initial_epsilon: f32,
    /// Continuous-action range, from the learner command line.
    bounds: (f32, f32),
    snapshot: RwLock<Option<Arc<ModelSnapshot>>>,
}

impl ExploreAdfModel {
    pub fn new(kind: ModelKind, initial_epsilon: f32, bounds: (f32, f32)) -> Self {
        Self {
            kind,
            initial_epsilon,
            bounds,
            snapshot: RwLock::new(None),
        }
    }

    fn current_snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot
            .read()
            .expect("model snapshot lock poisoned")
            .clone()
    }

    /// Epsilon-greedy pdf over the scored actions; uniform when no
    /// snapshot is loaded.
    fn pdf_over_actions(
        &self,
        snapshot: Option<&Arc<ModelSnapshot>>,
        action_tokens: &[Vec<String>],
    ) -> Vec<f32> {
        let n = action_tokens.len();
        let uniform = 1.0 / n as f32;
        let snapshot = match snapshot {
            Some(s) => s,
            None => return vec![uniform; n],
        };
        let epsilon = snapshot.epsilon.unwrap_or(self.initial_epsilon);
        let best = action_tokens
            .iter()
            .enumerate()
            .map(|(i, tokens)| (i, snapshot.score(tokens)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let floor = epsilon / n as f32;
        let mut pdf = vec![floor; n];
        pdf[best] += 1.0 - epsilon;
        pdf
    }

    fn version_of(&self, snapshot: Option<&Arc<ModelSnapshot>>) -> String {
        snapshot
            .map(|s| s.version.clone())
            .unwrap_or_else(|| EXPLORE_ONLY_MODEL_VERSION.to_string())
    }

    fn ranked_for_context(&self, context: &str) -> ApiResult<RankedActions> {
        let info = inspect_context(context)?;
        if info.action_count == 0 {
            return Err(ApiError::invalid_argument(
                "context contains no actions in _multi",
            ));
        }
        let tokens = action_feature_tokens(context, info.action_count)?;
        let snapshot = self.current_snapshot();
        let pdf = self.pdf_over_actions(snapshot.as_ref(), &tokens);
        Ok(RankedActions {
            action_ids: (0..info.action_count as u32).collect(),
            pdf,
            model_version: self.version_of(snapshot.as_ref()),
        })
    }

    /// Per-slot greedy-without-replacement rankings: each slot samples
    /// from its pdf over the actions not yet taken by earlier slots, so
    /// a slate never repeats an action.
    fn slot_rankings(
        &self,
        slot_seeds: &[u64],
        context: &str,
    ) -> ApiResult<SlotRankings> {
        let info = inspect_context(context)?;
        if info.action_count == 0 {
            return Err(ApiError::invalid_argument(
                "context contains no actions in _multi",
            ));
        }
        if slot_seeds.len() > info.action_count {
            return Err(ApiError::invalid_argument(format!(
                "{} slots exceed {} candidate actions",
                slot_seeds.len(),
                info.action_count
            )));
        }
        let tokens = action_feature_tokens(context, info.action_count)?;
        let snapshot = self.current_snapshot();

        let mut available: Vec<u32> = (0..info.action_count as u32).collect();
        let mut action_ids = Vec::with_capacity(slot_seeds.len());
        let mut pdfs = Vec::with_capacity(slot_seeds.len());
        for &seed in slot_seeds {
            let slot_tokens: Vec<Vec<String>> = available
                .iter()
                .map(|&id| tokens[id as usize].clone())
                .collect();
            let pdf = self.pdf_over_actions(snapshot.as_ref(), &slot_tokens);
            let reordered = sampling::sample_and_reorder(seed, &available, &pdf)?;
            available.retain(|&id| id != reordered[0].action_id);
            action_ids.push(reordered.iter().map(|a| a.action_id).collect());
            pdfs.push(reordered.iter().map(|a| a.probability).collect());
        }
        Ok(SlotRankings {
            action_ids,
            pdfs,
            model_version: self.version_of(snapshot.as_ref()),
        })
    }
}

impl InferenceModel for ExploreAdfModel {
    fn choose_rank(&self, _event_id: &str, _seed: u64, context: &str) -> ApiResult<RankedActions> {
        self.ranked_for_context(context)
    }

    fn choose_continuous(&self, context: &str) -> ApiResult<(f32, f32, String)> {
        let (lo, hi) = self.bounds;
        let span = hi - lo;
        let pdf_value = if span > 0.0 { 1.0 / span } else { 1.0 };
        let snapshot = self.current_snapshot();
        let action = match &snapshot {
            None => lo + span * 0.5,
            Some(s) => {
                let mut tokens = Vec::new();
                let doc: Value = serde_json::from_str(context)
                    .map_err(|e| ApiError::json_parse(format!("malformed context: {e}")))?;
                collect_feature_tokens(&doc, "", &mut tokens);
                let score = s.score(&tokens);
                // Squash the raw score into the configured action range.
                let unit = 1.0 / (1.0 + (-score as f64).exp()) as f32;
                lo + span * unit
            }
        };
        Ok((action, pdf_value, self.version_of(snapshot.as_ref())))
    }

    fn request_decision(&self, event_ids: &[String], context: &str) -> ApiResult<SlotRankings> {
        let seeds: Vec<u64> = event_ids.iter().map(|id| stable_hash64(0, id)).collect();
        self.slot_rankings(&seeds, context)
    }

    fn request_multi_slot_decision(
        &self,
        event_id: &str,
        slot_ids: &[String],
        context: &str,
    ) -> ApiResult<SlotRankings> {
        let base = stable_hash64(0, event_id);
        let seeds: Vec<u64> = slot_ids
            .iter()
            .map(|slot| stable_hash64(base, slot))
            .collect();
        self.slot_rankings(&seeds, context)
    }

    fn choose_rank_multistep(
        &self,
        _event_id: &str,
        _seed: u64,
        patched_context: &str,
        _history_len: usize,
    ) -> ApiResult<RankedActions> {
        self.ranked_for_context(patched_context)
    }

    fn update(&self, data: &ModelData) -> ApiResult<bool> {
        let doc: ModelDocument = serde_json::from_slice(&data.data)
            .map_err(|e| ApiError::model_update(format!("model payload rejected: {e}")))?;
        let weights = doc
            .weights
            .into_iter()
            .map(|(token, w)| (stable_hash64(0, &token), w))
            .collect();
        let snapshot = Arc::new(ModelSnapshot {
            version: doc.model_id,
            epsilon: doc.epsilon,
            weights,
        });
        *self.snapshot.write().expect("model snapshot lock poisoned") = Some(snapshot);
        Ok(true)
    }

    fn model_kind(&self) -> ModelKind {
        self.kind
    }

    fn is_loaded(&self) -> bool {
        self.snapshot
            .read()
            .expect("model snapshot lock poisoned")
            .is_some()
    }
}

/// Flatten each `_multi` entry into `path=value` feature tokens.
fn action_feature_tokens(context: &str, action_count: usize) -> ApiResult<Vec<Vec<String>>> {
    let doc: Value = serde_json::from_str(context)
        .map_err(|e| ApiError::json_parse(format!("malformed context: {e}")))?;
    let actions = doc
        .get("_multi")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::json_parse("context has no _multi array"))?;
    let mut out = Vec::with_capacity(action_count);
    for action in actions {
        let mut tokens = Vec::new();
        collect_feature_tokens(action, "", &mut tokens);
        out.push(tokens);
    }
    Ok(out)
}

fn collect_feature_tokens(value: &Value, prefix: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_feature_tokens(nested, &path, out);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                collect_feature_tokens(nested, &format!("{prefix}[{i}]"), out);
            }
        }
        other => out.push(format!("{prefix}={other}")),
    }
}
