//! Per-call request body mutation that defeats upstream response caching.
//!
//! Concurrent fan-out calls would otherwise carry byte-identical bodies,
//! which some providers dedupe or answer from cache. Callers opt in by
//! embedding a sentinel marker in their latest user message; before each
//! call the marker's token is rewritten with a fresh random id so every
//! body is unique on the wire.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::Value;

/// Sentinel prefix marking a replaceable task id inside message content.
/// The phrase reads "please ignore this line, unique random task id:".
pub const MARKER_PREFIX: &str = "[请忽略该行内容，唯一随机任务id：";

/// Minimum length of a generated task id.
pub const MIN_ID_LEN: usize = 16;

/// Draw a random alphanumeric id, scaled up for longer host content.
pub fn random_task_id(content_len: usize, rng: &mut impl Rng) -> String {
    let len = MIN_ID_LEN.max(content_len / 2);
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}

/// Rewrite the marker token in the most recent qualifying user message of
/// `body`'s `messages` array.
///
/// Scanning walks the array backwards and stops at the first user message
/// whose `content` is a string; earlier messages are never touched, even
/// when that message carries no marker. User messages with structured
/// (non-string) content are skipped, not terminal. A body without a
/// `messages` array passes through unchanged.
pub fn uniquify_request_body(body: &Value, call_index: usize, rng: &mut impl Rng) -> Value {
    let mut doc = body.clone();
    let Some(messages) = doc.get_mut("messages").and_then(Value::as_array_mut) else {
        return doc;
    };

    for message in messages.iter_mut().rev() {
        let Some(object) = message.as_object_mut() else {
            continue;
        };
        if object.get("role").and_then(Value::as_str) != Some("user") {
            continue;
        }
        let Some(content) = object.get("content").and_then(Value::as_str) else {
            continue;
        };
        if let Some(rewritten) = rewrite_marker(content, call_index, rng) {
            tracing::debug!(call = call_index + 1, "rewrote task id marker");
            object.insert("content".to_string(), Value::String(rewritten));
        }
        // Only the last user message is ever considered, marker or not.
        break;
    }

    doc
}

/// Replace every complete marker in `content` with a single freshly drawn
/// id, suffixed with the 1-based call number so sibling calls stay unique
/// even under identical random draws. Returns None when no complete marker
/// (non-empty token, closing bracket) exists.
fn rewrite_marker(content: &str, call_index: usize, rng: &mut impl Rng) -> Option<String> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    let mut id: Option<String> = None;

    while let Some(start) = rest.find(MARKER_PREFIX) {
        let token_at = start + MARKER_PREFIX.len();
        let after = &rest[token_at..];
        match after.find(']') {
            Some(close) if close > 0 => {
                let id = id.get_or_insert_with(|| {
                    format!("{}_C{}", random_task_id(content.len(), rng), call_index + 1)
                });
                out.push_str(&rest[..token_at]);
                out.push_str(id);
                out.push(']');
                rest = &after[close + 1..];
            }
            // Empty token or no closing bracket: not a marker, keep as-is.
            _ => {
                out.push_str(&rest[..token_at]);
                rest = after;
            }
        }
    }

    id.is_some().then(|| {
        out.push_str(rest);
        out
    })
}
