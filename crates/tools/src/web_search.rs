//! Web search tool backed by the Tavily search API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepvault_core::error::ToolError;
use stepvault_core::tool::{Tool, ToolResult};
use tracing::debug;

const TAVILY_URL: &str = "https://api.tavily.com";

pub struct WebSearchTool {
    api_key: String,
    base_url: String,
    max_results: u32,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>, max_results: u32) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: TAVILY_URL.into(),
            max_results: max_results.max(1),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Tavily-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns the most relevant results \
         with titles, URLs, and content snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        debug!(query, max_results = self.max_results, "Searching the web");

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results: self.max_results,
            })
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("search API returned {status}: {body}")));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("unreadable search response: {e}")))?;

        let data = serde_json::to_value(&parsed.results)
            .map_err(|e| failed(format!("result encoding: {e}")))?;
        let output = serde_json::to_string_pretty(&data).unwrap_or_default();

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(data),
        })
    }
}
