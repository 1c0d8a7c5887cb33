//! Issue an HTTP request

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use agentry_core::tool::{Tool, ToolResult};
use agentry_core::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{parse_input, parse_params};

pub const TOOL_NAME: &str = "http_request";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct HttpParams {
    timeout_secs: u64,
    /// Response bodies are cut at this size
    max_body_bytes: usize,
    user_agent: String,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_body_bytes: 1_000_000,
            user_agent: concat!("agentry/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HttpInput {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// A string is sent as-is; anything else as JSON
    body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

pub struct HttpRequestTool {
    client: Client,
    max_body_bytes: usize,
}

impl HttpRequestTool {
    pub fn new() -> Result<Self> {
        Self::from_params(&Value::Null)
    }

    pub fn from_params(params: &Value) -> Result<Self> {
        let params: HttpParams = parse_params(TOOL_NAME, params)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(params.timeout_secs))
            .user_agent(params.user_agent)
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            max_body_bytes: params.max_body_bytes,
        })
    }

    /// Use a preconfigured client
    pub fn with_client(client: Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }
}

pub(crate) fn construct(params: &Value) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(HttpRequestTool::from_params(params)?))
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Send an HTTP request and return the status, headers and body. 4xx and 5xx responses are failures."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Absolute URL"},
                "method": {"type": "string", "description": "HTTP method", "default": "GET"},
                "headers": {"type": "object", "additionalProperties": {"type": "string"}},
                "body": {"description": "Request body; strings are sent verbatim, other values as JSON"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: HttpInput = match parse_input(TOOL_NAME, input) {
            Ok(input) => input,
            Err(result) => return Ok(result),
        };
        let method = match Method::from_bytes(input.method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return Ok(ToolResult::error(format!("Invalid HTTP method '{}'", input.method)));
            }
        };

        tracing::debug!(method = %method, url = %input.url, "Sending HTTP request");

        let mut request = self.client.request(method, &input.url);
        for (name, value) in &input.headers {
            request = request.header(name, value);
        }
        request = match input.body {
            Some(Value::String(text)) => request.body(text),
            Some(other) => request.json(&other),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Ok(ToolResult::error(format!("Request failed: {}", e))),
        };

        let status = response.status();
        let url = response.url().to_string();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let is_json = headers
            .get("content-type")
            .and_then(|v| v.as_str())
            .is_some_and(|ct| ct.contains("json"));

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read response body: {}", e))),
        };
        let truncated = bytes.len() > self.max_body_bytes;
        let body = &bytes[..bytes.len().min(self.max_body_bytes)];
        let text = || Value::String(String::from_utf8_lossy(body).into_owned());
        let body = if is_json && !truncated {
            serde_json::from_slice(body).unwrap_or_else(|_| text())
        } else {
            text()
        };

        let content = json!({
            "status": status.as_u16(),
            "url": url,
            "headers": headers,
            "body": body,
            "truncated": truncated,
        });
        Ok(ToolResult {
            content,
            is_error: status.is_client_error() || status.is_server_error(),
        })
    }
}
