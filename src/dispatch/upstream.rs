use std::time::Duration;

use rand::rngs::StdRng;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::UpstreamCall;
use crate::error::ManifoldError;
use crate::uniquify;

/// Cap on upstream bodies embedded in error diagnostics.
const MAX_DIAGNOSTIC_BYTES: usize = 2 * 1024 * 1024; // 2MB

pub struct UpstreamClient {
    client: Client,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Content and usage extracted from one successful completion.
#[derive(Debug)]
pub struct UpstreamReply {
    pub content: String,
    pub usage: Option<Value>,
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// Derive the chat-completions endpoint from a caller-supplied base URL:
    /// ensure a trailing `/`, insert `v1/` unless the URL already contains
    /// `/v1` anywhere in it, then append `chat/completions`.
    pub fn endpoint_url(base_url: &str) -> String {
        let mut url = base_url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        if !url.contains("/v1") {
            url.push_str("v1/");
        }
        url.push_str("chat/completions");
        url
    }

    /// Send one chat-completion call. `call_index` is zero-based; it feeds
    /// the body uniquifier and the outcome slot.
    pub async fn call(
        &self,
        call: &UpstreamCall,
        call_index: usize,
        mut rng: StdRng,
    ) -> Result<UpstreamReply, ManifoldError> {
        let url = Self::endpoint_url(&call.base_url);
        let body = uniquify::uniquify_request_body(&call.body, call_index, &mut rng);
        let headers = build_headers(call)?;

        tracing::debug!(call = call_index + 1, %url, "sending upstream request");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .timeout(call.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let error_bytes = response.bytes().await.unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(MAX_DIAGNOSTIC_BYTES)];
            return Err(ManifoldError::Upstream {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("unknown").to_string(),
                body: String::from_utf8_lossy(truncated).into_owned(),
            });
        }

        let bytes = response.bytes().await?;
        let completion: ChatCompletion = serde_json::from_slice(&bytes)?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(ManifoldError::EmptyContent);
        };

        Ok(UpstreamReply {
            content: choice.message.content.unwrap_or_default(),
            usage: completion.usage,
        })
    }
}

/// Assemble the outbound header set. Defaults first, caller-supplied headers
/// last so they can override Authorization or Content-Type.
fn build_headers(call: &UpstreamCall) -> Result<HeaderMap, ManifoldError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", call.api_key)).map_err(|_| {
            ManifoldError::InvalidHeader {
                name: "Authorization".to_string(),
            }
        })?,
    );

    if let Some(ref organization) = call.organization {
        headers.insert(
            "OpenAI-Organization",
            HeaderValue::from_str(organization).map_err(|_| ManifoldError::InvalidHeader {
                name: "OpenAI-Organization".to_string(),
            })?,
        );
    }

    for (name, value) in &call.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| ManifoldError::InvalidHeader {
                name: name.clone(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ManifoldError::InvalidHeader {
                name: name.clone(),
            })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}
