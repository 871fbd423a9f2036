//! Tests for the request-body uniquification pass.

use manifold::uniquify::{MARKER_PREFIX, MIN_ID_LEN, random_task_id, uniquify_request_body};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

fn marked_content(token: &str) -> String {
    format!("solve this carefully\n{MARKER_PREFIX}{token}]")
}

/// Pull the replacement token back out of a rewritten content string.
fn extract_token(content: &str) -> &str {
    let start = content.find(MARKER_PREFIX).expect("marker prefix survives") + MARKER_PREFIX.len();
    let end = content[start..].find(']').expect("marker stays closed") + start;
    &content[start..end]
}

fn last_user_content(body: &Value) -> &str {
    body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .rev()
        .find(|m| m["role"] == "user")
        .and_then(|m| m["content"].as_str())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Marker replacement
// ---------------------------------------------------------------------------

#[test]
fn marker_token_is_replaced_with_indexed_id() {
    let original = marked_content("OLD123");
    let body = json!({
        "model": "test-model",
        "temperature": 0.2,
        "messages": [
            {"role": "system", "content": "be terse"},
            {"role": "user", "content": original},
        ],
    });

    let mutated = uniquify_request_body(&body, 2, &mut rng());
    let content = last_user_content(&mutated);
    let token = extract_token(content);

    assert!(!token.contains("OLD123"));
    let id = token.strip_suffix("_C3").expect("call index 2 yields _C3");
    assert!(id.len() >= MIN_ID_LEN);
    assert_eq!(id.len(), original.len() / 2);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));

    // Everything outside the token is untouched.
    assert!(content.starts_with("solve this carefully\n"));
    assert_eq!(mutated["model"], "test-model");
    assert_eq!(mutated["temperature"], 0.2);
    assert_eq!(mutated["messages"][0], body["messages"][0]);
}

#[test]
fn id_length_scales_with_content_length() {
    assert_eq!(random_task_id(0, &mut rng()).len(), MIN_ID_LEN);
    assert_eq!(random_task_id(10, &mut rng()).len(), MIN_ID_LEN);
    assert_eq!(random_task_id(100, &mut rng()).len(), 50);
}

#[test]
fn id_uses_the_alphanumeric_alphabet() {
    let id = random_task_id(400, &mut rng());
    assert_eq!(id.len(), 200);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn replacement_is_deterministic_under_a_fixed_seed() {
    let body = json!({
        "messages": [{"role": "user", "content": marked_content("OLD")}],
    });

    let first = uniquify_request_body(&body, 0, &mut rng());
    let second = uniquify_request_body(&body, 0, &mut rng());
    assert_eq!(first, second);
}

#[test]
fn repeated_markers_share_one_id() {
    let content = format!(
        "{MARKER_PREFIX}AAA] middle {MARKER_PREFIX}BBB]",
    );
    let body = json!({
        "messages": [{"role": "user", "content": content}],
    });

    let mutated = uniquify_request_body(&body, 0, &mut rng());
    let rewritten = last_user_content(&mutated);

    let tokens: Vec<&str> = rewritten
        .split(MARKER_PREFIX)
        .skip(1)
        .map(|rest| &rest[..rest.find(']').unwrap()])
        .collect();

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0], tokens[1]);
    assert!(tokens[0].ends_with("_C1"));
}

// ---------------------------------------------------------------------------
// Pass-through cases
// ---------------------------------------------------------------------------

#[test]
fn content_without_marker_is_untouched() {
    let body = json!({
        "messages": [
            {"role": "user", "content": "no marker here"},
        ],
    });
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

#[test]
fn body_without_messages_passes_through() {
    let body = json!({"prompt": "not a chat payload"});
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

#[test]
fn non_object_body_passes_through() {
    let body = json!("just a string");
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

#[test]
fn unclosed_marker_is_not_rewritten() {
    let body = json!({
        "messages": [{"role": "user", "content": format!("{MARKER_PREFIX}dangling")}],
    });
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

#[test]
fn empty_token_is_not_a_marker() {
    let body = json!({
        "messages": [{"role": "user", "content": format!("{MARKER_PREFIX}]")}],
    });
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

// ---------------------------------------------------------------------------
// Message selection
// ---------------------------------------------------------------------------

#[test]
fn only_the_last_user_message_is_considered() {
    // The marker sits in an earlier user turn; the latest user turn has
    // none. Nothing may change.
    let body = json!({
        "messages": [
            {"role": "user", "content": marked_content("OLD")},
            {"role": "assistant", "content": "done"},
            {"role": "user", "content": "follow-up without marker"},
        ],
    });
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

#[test]
fn assistant_marker_is_never_rewritten() {
    let body = json!({
        "messages": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": marked_content("OLD")},
        ],
    });
    assert_eq!(uniquify_request_body(&body, 0, &mut rng()), body);
}

#[test]
fn structured_content_is_skipped_not_terminal() {
    // The last user message has array content; the scan continues to the
    // previous user turn, which holds the marker.
    let body = json!({
        "messages": [
            {"role": "user", "content": marked_content("OLD")},
            {"role": "user", "content": [{"type": "image_url", "image_url": {"url": "u"}}]},
        ],
    });

    let mutated = uniquify_request_body(&body, 1, &mut rng());
    let first = mutated["messages"][0]["content"].as_str().unwrap();
    assert!(extract_token(first).ends_with("_C2"));
    assert_eq!(mutated["messages"][1], body["messages"][1]);
}

#[test]
fn non_object_messages_are_ignored() {
    let body = json!({
        "messages": [
            "free-form string entry",
            {"role": "user", "content": marked_content("OLD")},
        ],
    });

    let mutated = uniquify_request_body(&body, 0, &mut rng());
    let content = mutated["messages"][1]["content"].as_str().unwrap();
    assert!(extract_token(content).ends_with("_C1"));
}
