pub mod fanout;
pub mod upstream;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::api::ChatRequest;

/// Parameters shared by every call of one fan-out. Built once from the
/// inbound request, then handed to each call task behind an `Arc`; the
/// per-call differences (index, random id) are applied at send time.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub base_url: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub body: Value,
}

impl UpstreamCall {
    pub fn from_request(req: &ChatRequest) -> Self {
        Self {
            base_url: req.base_url.clone(),
            api_key: req.api_key.clone(),
            organization: req.organization.clone(),
            headers: req.headers.clone(),
            timeout: req.timeout(),
            body: req.request_body.clone(),
        }
    }
}
