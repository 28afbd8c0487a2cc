// src/context.rs
//
// Structural inspection of decision contexts. The core treats the
// context as opaque JSON except for three markers: the `_multi` array of
// candidate actions, the `_slots` array of output positions, and the
// optional `_id` naming string inside each slot. Slot parsing also needs
// the textual order of `_multi` and `_slots`, so the raw document is
// scanned for top-level key positions rather than round-tripped through
// a map.

use serde_json::Value;

use crate::status::{ApiError, ApiResult};

/// Structural facts about one context document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextInfo {
    /// Number of entries in the top-level `_multi` array.
    pub action_count: usize,
    /// Byte offset of the top-level `_multi` key, when present.
    pub multi_position: Option<usize>,
    /// Byte offset of the top-level `_slots` key, when present.
    pub slots_position: Option<usize>,
    /// Per-slot `_id` values; `None` where a slot carries no name.
    pub slot_ids: Vec<Option<String>>,
}

impl ContextInfo {
    pub fn slot_count(&self) -> usize {
        self.slot_ids.len()
    }
}

/// Parse the context far enough to locate `_multi`, `_slots` and slot
/// ids. Malformed JSON or a non-object root fails with `JsonParseError`.
pub fn inspect_context(context: &str) -> ApiResult<ContextInfo> {
    let doc: Value = serde_json::from_str(context)
        .map_err(|e| ApiError::json_parse(format!("malformed context: {e}")))?;
    let root = doc
        .as_object()
        .ok_or_else(|| ApiError::json_parse("context root must be a JSON object"))?;

    let action_count = root
        .get("_multi")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    let slot_ids: Vec<Option<String>> = root
        .get("_slots")
        .and_then(Value::as_array)
        .map(|slots| {
            slots
                .iter()
                .map(|slot| {
                    slot.get("_id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    let mut info = ContextInfo {
        action_count,
        multi_position: None,
        slots_position: None,
        slot_ids,
    };
    for (key, position) in top_level_key_positions(context) {
        match key.as_str() {
            "_multi" if info.multi_position.is_none() => info.multi_position = Some(position),
            "_slots" if info.slots_position.is_none() => info.slots_position = Some(position),
            _ => {}
        }
    }
    Ok(info)
}

/// Enforce the multi-slot structural rule: both `_multi` and `_slots`
/// present, with `_multi` appearing first in the document.
pub fn require_multi_before_slots(info: &ContextInfo) -> ApiResult<()> {
    let (multi, slots) = match (info.multi_position, info.slots_position) {
        (Some(m), Some(s)) if info.action_count > 0 && info.slot_count() > 0 => (m, s),
        _ => {
            return Err(ApiError::json_parse(
                "context must contain both a _multi array and a _slots array",
            ))
        }
    };
    if slots < multi {
        return Err(ApiError::json_parse(
            "context must list _multi before _slots",
        ));
    }
    Ok(())
}

/// Scan the raw document for top-level object keys and their byte
/// offsets. String-aware and depth-tracking; escapes inside keys are
/// irrelevant for the structural markers this feeds.
fn top_level_key_positions(json: &str) -> Vec<(String, usize)> {
    let bytes = json.as_bytes();
    let mut out = Vec::new();
    let mut depth: i32 = 0;
    let mut expect_key = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                expect_key = depth == 1;
                i += 1;
            }
            b'[' => {
                depth += 1;
                expect_key = false;
                i += 1;
            }
            b'}' | b']' => {
                depth -= 1;
                i += 1;
            }
            b',' => {
                if depth == 1 {
                    expect_key = true;
                }
                i += 1;
            }
            b'"' => {
                let key_at = i;
                i += 1;
                let start = i;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'"' => break,
                        _ => i += 1,
                    }
                }
                if depth == 1 && expect_key && i <= bytes.len() {
                    out.push((json[start..i.min(bytes.len())].to_string(), key_at));
                    expect_key = false;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_actions_and_slots() {
        let ctx = r#"{"shared":{"user":"u1"},"_multi":[{"a":1},{"b":2},{"c":3}],"_slots":[{"_id":"top"},{}]}"#;
        let info = inspect_context(ctx).unwrap();
        assert_eq!(info.action_count, 3);
        assert_eq!(info.slot_count(), 2);
        assert_eq!(info.slot_ids[0].as_deref(), Some("top"));
        assert_eq!(info.slot_ids[1], None);
        assert!(require_multi_before_slots(&info).is_ok());
    }

    #[test]
    fn slots_before_multi_is_rejected() {
        let ctx = r#"{"_slots":[{}],"_multi":[{"a":1}]}"#;
        let info = inspect_context(ctx).unwrap();
        let err = require_multi_before_slots(&info).unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::JsonParseError);
    }

    #[test]
    fn nested_marker_keys_are_ignored() {
        // `_multi` inside a nested object must not count as the marker.
        let ctx = r#"{"shared":{"_multi":"decoy"},"_multi":[{"a":1}],"_slots":[{}]}"#;
        let info = inspect_context(ctx).unwrap();
        assert!(require_multi_before_slots(&info).is_ok());
        assert_eq!(info.action_count, 1);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = inspect_context("{not json").unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::JsonParseError);
        let err = inspect_context("[1,2,3]").unwrap_err();
        assert_eq!(err.code, crate::status::ErrorCode::JsonParseError);
    }

    #[test]
    fn missing_markers_fail_the_multi_slot_rule() {
        let info = inspect_context(r#"{"_multi":[{"a":1}]}"#).unwrap();
        assert!(require_multi_before_slots(&info).is_err());
        let info = inspect_context(r#"{"_slots":[{}]}"#).unwrap();
        assert!(require_multi_before_slots(&info).is_err());
    }
}
