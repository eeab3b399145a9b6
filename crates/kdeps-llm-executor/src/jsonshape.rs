// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON response shaping: parse the model's text content as JSON and,
//! when requested, project it onto a fixed set of keys.

use serde_json::{Map, Value};

/// Shape `content` per the `jsonResponse`/`jsonResponseKeys` contract.
///
/// - Parse failure yields `{error, content, raw}` rather than propagating
///   a Rust-level error — a malformed model response is data, not a
///   programmer mistake.
/// - With no `keys`, the full parsed value is returned.
/// - With `keys`, project onto them; if the projection is empty (none of
///   the keys exist on the parsed object, or the parsed value isn't an
///   object), fall back to the full parsed value.
#[must_use]
pub fn shape_json_response(content: &str, keys: &[String]) -> Value {
    let parsed: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            return serde_json::json!({
                "error": e.to_string(),
                "content": content,
                "raw": content,
            });
        }
    };

    if keys.is_empty() {
        return parsed;
    }

    let Some(obj) = parsed.as_object() else {
        return parsed;
    };

    let projected: Map<String, Value> = keys
        .iter()
        .filter_map(|k| obj.get(k).map(|v| (k.clone(), v.clone())))
        .collect();

    if projected.is_empty() {
        parsed
    } else {
        Value::Object(projected)
    }
}
