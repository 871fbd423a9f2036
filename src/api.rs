//! Wire types for the `/chat` endpoint: the inbound request, one outcome per
//! upstream call, and the caller-facing response envelope.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManifoldError;

/// Default per-call timeout when the caller supplies none (or a non-positive
/// value).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Inbound request accepted on `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub organization: Option<String>,
    /// Opaque chat-completion payload, forwarded upstream after the
    /// uniquification pass. Never interpreted beyond its `messages` array.
    pub request_body: Value,
    #[serde(default)]
    pub concurrent_count: i64,
    /// Extra headers applied after the defaults, so callers can override
    /// Authorization or Content-Type if their provider needs it.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub user_message_id: Option<String>,
    /// Per-call timeout in seconds.
    #[serde(default)]
    pub request_timeout: i64,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), ManifoldError> {
        if self.base_url.is_empty() {
            return Err(ManifoldError::MissingField("baseUrl"));
        }
        if self.api_key.is_empty() {
            return Err(ManifoldError::MissingField("apiKey"));
        }
        Ok(())
    }

    /// Requested fan-out width; anything non-positive collapses to a single
    /// call.
    pub fn concurrency(&self) -> usize {
        if self.concurrent_count <= 0 {
            1
        } else {
            self.concurrent_count as usize
        }
    }

    pub fn timeout(&self) -> Duration {
        if self.request_timeout <= 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.request_timeout as u64)
        }
    }
}

/// Result of one upstream call attempt. `request_index` is the zero-based
/// call number and doubles as the outcome's slot in the aggregate collection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    /// Reserved for asynchronous dispatch; always false here.
    #[serde(skip_serializing_if = "is_false")]
    pub is_pending: bool,
}

impl CallOutcome {
    pub fn success(request_index: usize, content: String, usage: Option<Value>) -> Self {
        Self {
            success: true,
            content: Some(content),
            error: None,
            request_index,
            usage,
            is_pending: false,
        }
    }

    pub fn failure(request_index: usize, error: String) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error),
            request_index,
            usage: None,
            is_pending: false,
        }
    }
}

/// Caller-facing response envelope. The fan-out path carries the full
/// outcome collection plus counts; the single-call path omits them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    pub request_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent_results: Option<Vec<CallOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_final_result: bool,
}

impl ChatResponse {
    /// Wrap the outcome of a lone call (concurrency == 1).
    pub fn single(outcome: CallOutcome) -> Self {
        Self {
            success: outcome.success,
            content: outcome.content,
            error: outcome.error,
            usage: outcome.usage,
            request_index: outcome.request_index,
            concurrent_results: None,
            success_count: None,
            total_count: None,
            user_message_id: None,
            is_final_result: false,
        }
    }

    /// Fold an index-ordered outcome collection into the aggregate envelope.
    ///
    /// The representative content/usage come from the lowest-indexed
    /// successful outcome. On total failure the error of outcome 0 is
    /// surfaced; the empty-collection fallback cannot occur for a real
    /// fan-out but is handled rather than panicking on a bad invariant.
    pub fn aggregate(results: Vec<CallOutcome>) -> Self {
        let total_count = results.len();
        let success_count = results.iter().filter(|r| r.success).count();
        let representative = results.iter().find(|r| r.success);

        let (success, content, usage, request_index, error) = match representative {
            Some(first) => (
                true,
                first.content.clone(),
                first.usage.clone(),
                first.request_index,
                None,
            ),
            None => {
                let error = results
                    .first()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "all concurrent requests failed".to_string());
                (false, None, None, 0, Some(error))
            }
        };

        Self {
            success,
            content,
            error,
            usage,
            request_index,
            concurrent_results: Some(results),
            success_count: Some(success_count),
            total_count: Some(total_count),
            user_message_id: None,
            is_final_result: true,
        }
    }

    /// Envelope for a request rejected before any upstream call.
    pub fn rejected(error: String) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error),
            usage: None,
            request_index: 0,
            concurrent_results: None,
            success_count: None,
            total_count: None,
            user_message_id: None,
            is_final_result: false,
        }
    }

    pub fn with_user_message_id(mut self, user_message_id: Option<String>) -> Self {
        self.user_message_id = user_message_id;
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
