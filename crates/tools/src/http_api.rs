//! REST endpoints declared in `[[tools.http]]`, exposed as tools.
//!
//! `{name}` placeholders in the URL are filled from the arguments of the same
//! name. Remaining arguments go in the query string for GET/DELETE and in a
//! JSON body otherwise.

use async_trait::async_trait;
use stepvault_config::HttpToolConfig;
use stepvault_core::error::ToolError;
use stepvault_core::tool::{Tool, ToolResult};
use tracing::debug;

pub struct HttpApiTool {
    name: String,
    description: String,
    method: reqwest::Method,
    url: String,
    parameters: serde_json::Value,
    client: reqwest::Client,
}

impl HttpApiTool {
    pub fn from_config(config: &HttpToolConfig) -> Result<Self, ToolError> {
        let method = reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| {
                ToolError::InvalidArguments(format!(
                    "tool '{}' has an invalid HTTP method: {}",
                    config.name, config.method
                ))
            })?;
        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            method,
            url: config.url.clone(),
            parameters: config.parameters.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn failed(&self, reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason,
        }
    }
}

/// Substitute `{key}` placeholders; returns the URL and the unused arguments.
fn expand_url(
    template: &str,
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> (String, serde_json::Map<String, serde_json::Value>) {
    let mut url = template.to_string();
    let mut rest = serde_json::Map::new();
    for (key, value) in arguments {
        let placeholder = format!("{{{key}}}");
        if url.contains(&placeholder) {
            url = url.replace(&placeholder, &scalar_text(value));
        } else {
            rest.insert(key.clone(), value.clone());
        }
    }
    (url, rest)
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Tool for HttpApiTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args = match arguments {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected an object of arguments, got {other}"
                )));
            }
        };

        let (url, rest) = expand_url(&self.url, &args);
        debug!(tool = %self.name, method = %self.method, url = %url, "Calling HTTP API");

        let mut request = self.client.request(self.method.clone(), &url);
        if matches!(self.method, reqwest::Method::GET | reqwest::Method::DELETE) {
            let query: Vec<(String, String)> =
                rest.iter().map(|(k, v)| (k.clone(), scalar_text(v))).collect();
            request = request.query(&query);
        } else {
            request = request.json(&serde_json::Value::Object(rest));
        }

        let response = request.send().await.map_err(|e| self.failed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failed(format!("reading response: {e}")))?;

        if !status.is_success() {
            return Err(self.failed(format!("HTTP {status}: {body}")));
        }

        let data = serde_json::from_str(&body).ok();
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: body,
            data,
        })
    }
}
