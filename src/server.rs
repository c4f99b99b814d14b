//! MCP server implementation for the Flux server.
//!
//! This module provides the MCP server handler that exposes:
//! - `generate_image` tool for text-to-image generation
//! - `generation://{index}` resources for the most recent generation results

use crate::config::Config;
use crate::error::Error;
use crate::handler::{FluxGenerateParams, FluxHandler};
use crate::history::GenerationHistory;
use rmcp::{
    model::{
        CallToolResult, Content, ListResourcesResult, ReadResourceResult, ResourceContents,
        ServerCapabilities, ServerInfo,
    },
    ErrorData as McpError, ServerHandler,
};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// URI scheme for cached generation resources.
const RESOURCE_PREFIX: &str = "generation://";

/// MCP server for Flux image generation.
#[derive(Clone)]
pub struct FluxServer {
    /// Handler for upstream generation requests
    handler: Arc<FluxHandler>,
    /// History of recent generations, shared across concurrent dispatches
    history: Arc<RwLock<GenerationHistory>>,
}

impl FluxServer {
    /// Create a new FluxServer with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, Error> {
        let history = GenerationHistory::new(config.history_size);
        let handler = FluxHandler::new(config)?;
        Ok(Self {
            handler: Arc::new(handler),
            history: Arc::new(RwLock::new(history)),
        })
    }

    /// Generate an image and record the result in the history.
    ///
    /// Upstream transport/HTTP failures come back as a tool-level error result;
    /// invalid parameters come back as an MCP invalid-params error.
    pub async fn generate_image(
        &self,
        params: FluxGenerateParams,
    ) -> Result<CallToolResult, McpError> {
        info!(prompt = %params.prompt, "Generating image");

        match self.handler.generate(&params).await {
            Ok(payload) => {
                self.history.write().await.record(params.prompt, payload.clone());
                let text = serde_json::to_string_pretty(&payload)
                    .unwrap_or_else(|_| payload.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(Error::Validation(message)) => Err(McpError::invalid_params(
                format!("Invalid parameters: {}", message),
                None,
            )),
            Err(Error::Api { message, .. }) => Ok(CallToolResult::error(vec![Content::text(
                format!("Image generation failed: {}", message),
            )])),
            Err(e) => Err(McpError::internal_error(
                format!("Image generation failed: {}", e),
                None,
            )),
        }
    }

    /// List all cached generations as resources, newest first.
    async fn list_generation_resources(&self) -> Vec<rmcp::model::Resource> {
        let history = self.history.read().await;
        history
            .iter()
            .enumerate()
            .map(|(index, record)| rmcp::model::Resource {
                raw: rmcp::model::RawResource {
                    uri: format!("{}{}", RESOURCE_PREFIX, index),
                    name: record.label(),
                    title: None,
                    description: Some("Cached image generation result".to_string()),
                    mime_type: Some("application/json".to_string()),
                    size: None,
                    icons: None,
                    meta: None,
                },
                annotations: None,
            })
            .collect()
    }

    /// Read a cached generation by its positional index URI.
    async fn read_generation_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let index = parse_resource_index(uri).ok_or_else(|| {
            McpError::resource_not_found(format!("Unknown resource: {}", uri), None)
        })?;

        let history = self.history.read().await;
        let record = history.get(index).ok_or_else(|| {
            McpError::resource_not_found(
                format!("No cached generation at index {} ({} cached)", index, history.len()),
                None,
            )
        })?;

        let text = serde_json::to_string_pretty(&record.response)
            .unwrap_or_else(|_| record.response.to_string());

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri.to_string())],
        })
    }
}

/// Parse a `generation://{index}` URI into its positional index.
///
/// Only canonical decimal indices are accepted; signs and leading zeros are
/// rejected so each cached record has exactly one URI.
fn parse_resource_index(uri: &str) -> Option<usize> {
    let index = uri.strip_prefix(RESOURCE_PREFIX)?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if index != "0" && index.starts_with('0') {
        return None;
    }
    index.parse().ok()
}

impl ServerHandler for FluxServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Image generation server using the Black Forest Labs Flux API. \
                 Use generate_image to create images from text prompts; recent \
                 results are available as generation:// resources."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListToolsResult, McpError>> + Send + '_
    {
        async move {
            use rmcp::model::{ListToolsResult, Tool};
            use schemars::schema_for;

            let schema = schema_for!(FluxGenerateParams);
            let schema_value = serde_json::to_value(&schema).unwrap_or_default();
            let input_schema = match schema_value {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

            Ok(ListToolsResult {
                tools: vec![Tool {
                    name: Cow::Borrowed("generate_image"),
                    description: Some(Cow::Borrowed(
                        "Generate an image from a text prompt using the Flux 1.1 Pro Ultra \
                         model. Returns the raw API response; the last few results stay \
                         readable as generation:// resources.",
                    )),
                    input_schema,
                    annotations: None,
                    icons: None,
                    meta: None,
                    output_schema: None,
                    title: None,
                }],
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            match params.name.as_ref() {
                "generate_image" => {
                    let tool_params: FluxGenerateParams = params
                        .arguments
                        .map(|args| serde_json::from_value(serde_json::Value::Object(args)))
                        .transpose()
                        .map_err(|e| {
                            McpError::invalid_params(format!("Invalid parameters: {}", e), None)
                        })?
                        .ok_or_else(|| McpError::invalid_params("Missing parameters", None))?;

                    self.generate_image(tool_params).await
                }
                _ => Err(McpError::invalid_params(
                    format!("Unknown tool: {}", params.name),
                    None,
                )),
            }
        }
    }

    fn list_resources(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            debug!("Listing resources");
            Ok(ListResourcesResult {
                resources: self.list_generation_resources().await,
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            debug!(uri = %params.uri, "Reading resource");
            self.read_generation_resource(&params.uri).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            history_size: 5,
            request_timeout_secs: 5,
            port: 8080,
        }
    }

    fn test_server() -> FluxServer {
        FluxServer::new(test_config()).expect("Failed to create server")
    }

    fn minimal_params(prompt: &str) -> FluxGenerateParams {
        FluxGenerateParams {
            prompt: prompt.to_string(),
            image_prompt: None,
            image_prompt_strength: None,
            aspect_ratio: None,
            safety_tolerance: None,
            seed: None,
            output_format: None,
            raw: None,
            response_format: None,
        }
    }

    #[test]
    fn test_server_info() {
        let server = test_server();
        let info = server.get_info();
        assert!(info.instructions.is_some());
    }

    #[test]
    fn test_parse_resource_index() {
        assert_eq!(parse_resource_index("generation://0"), Some(0));
        assert_eq!(parse_resource_index("generation://4"), Some(4));
        assert_eq!(parse_resource_index("generation://10"), Some(10));
        assert_eq!(parse_resource_index("generation://abc"), None);
        assert_eq!(parse_resource_index("generation://-1"), None);
        assert_eq!(parse_resource_index("image://0"), None);
        assert_eq!(parse_resource_index("generation://"), None);
    }

    #[test]
    fn test_parse_resource_index_is_canonical() {
        // Each record has exactly one URI: no signs, no leading zeros.
        assert_eq!(parse_resource_index("generation://+0"), None);
        assert_eq!(parse_resource_index("generation://+5"), None);
        assert_eq!(parse_resource_index("generation://00"), None);
        assert_eq!(parse_resource_index("generation://007"), None);
        assert_eq!(parse_resource_index("generation:// 1"), None);
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_upstream_call() {
        let server = test_server();
        let mut params = minimal_params("a cat");
        params.safety_tolerance = Some(9);

        let result = server.generate_image(params).await;
        let err = result.expect_err("Invalid params should be a protocol-level error");
        assert!(err.message.contains("Invalid parameters"));
        assert!(err.message.contains("safety_tolerance"));
    }

    #[tokio::test]
    async fn test_upstream_failure_becomes_tool_error() {
        // base_url points at a closed port, so the call fails at the transport layer.
        let server = test_server();
        let result = server.generate_image(minimal_params("a cat")).await;

        let tool_result = result.expect("Upstream failure should not be a protocol fault");
        assert_eq!(tool_result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_upstream_failure_not_recorded() {
        let server = test_server();
        let _ = server.generate_image(minimal_params("a cat")).await;
        assert!(server.history.read().await.is_empty());
    }

    /// Serve one canned HTTP response on an ephemeral local port and return
    /// the base URL to point the server at.
    async fn spawn_upstream_stub(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub listener");
        let addr = listener.local_addr().expect("Stub should have an address");

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    fn stub_server(base_url: String) -> FluxServer {
        FluxServer::new(Config {
            base_url,
            ..test_config()
        })
        .expect("Failed to create server")
    }

    fn tool_result_text(result: &CallToolResult) -> String {
        match &result.content[0].raw {
            rmcp::model::RawContent::Text(t) => t.text.clone(),
            other => panic!("Expected text content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_http_error_body_surfaces_in_tool_error() {
        let base_url = spawn_upstream_stub(
            "HTTP/1.1 422 Unprocessable Entity",
            r#"{"error": {"message": "Prompt was flagged by moderation"}}"#,
        )
        .await;
        let server = stub_server(base_url);

        let tool_result = server
            .generate_image(minimal_params("a cat"))
            .await
            .expect("Upstream HTTP failure should not be a protocol fault");

        assert_eq!(tool_result.is_error, Some(true));
        let text = tool_result_text(&tool_result);
        assert!(
            text.contains("Prompt was flagged by moderation"),
            "Tool error text should carry the upstream message, got: {}",
            text
        );
        assert!(server.history.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_generation_recorded_and_readable() {
        let base_url = spawn_upstream_stub(
            "HTTP/1.1 200 OK",
            r#"{"data": [{"url": "https://example.com/cat.png"}]}"#,
        )
        .await;
        let server = stub_server(base_url);

        let tool_result = server
            .generate_image(minimal_params("a cat"))
            .await
            .expect("2xx response should succeed");
        assert_ne!(tool_result.is_error, Some(true));

        let expected = json!({"data": [{"url": "https://example.com/cat.png"}]});
        let parsed: serde_json::Value =
            serde_json::from_str(&tool_result_text(&tool_result)).unwrap();
        assert_eq!(parsed, expected);

        // The generation is immediately readable as resource index 0.
        let resources = server.list_generation_resources().await;
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].raw.uri, "generation://0");

        let read = server
            .read_generation_resource("generation://0")
            .await
            .expect("Index 0 should be readable");
        match &read.contents[0] {
            ResourceContents::TextResourceContents { text, .. } => {
                let parsed: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(parsed, expected);
            }
            other => panic!("Expected text contents, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_resources_empty() {
        let server = test_server();
        let resources = server.list_generation_resources().await;
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn test_list_resources_after_generations() {
        let server = test_server();
        {
            let mut history = server.history.write().await;
            history.record("first prompt", json!({"id": 1}));
            history.record("second prompt", json!({"id": 2}));
        }

        let resources = server.list_generation_resources().await;
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].raw.uri, "generation://0");
        assert_eq!(resources[0].raw.name, "second prompt");
        assert_eq!(resources[1].raw.uri, "generation://1");
        assert_eq!(resources[1].raw.name, "first prompt");
    }

    #[tokio::test]
    async fn test_read_resource_returns_payload() {
        let server = test_server();
        let payload = json!({"data": [{"url": "https://example.com/cat.png"}]});
        server.history.write().await.record("a cat", payload.clone());

        let result = server
            .read_generation_resource("generation://0")
            .await
            .expect("Index 0 should be readable");

        assert_eq!(result.contents.len(), 1);
        match &result.contents[0] {
            ResourceContents::TextResourceContents { text, .. } => {
                let parsed: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(parsed, payload);
            }
            other => panic!("Expected text contents, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_resource_out_of_range() {
        let server = test_server();
        {
            let mut history = server.history.write().await;
            for i in 0..3 {
                history.record(format!("prompt {}", i), json!(null));
            }
        }

        let err = server
            .read_generation_resource("generation://5")
            .await
            .expect_err("Out-of-range index should be not-found");
        assert!(err.message.contains("index 5"));
    }

    #[tokio::test]
    async fn test_read_resource_malformed_uri() {
        let server = test_server();
        let err = server
            .read_generation_resource("generation://latest")
            .await
            .expect_err("Malformed URI should be not-found");
        assert!(err.message.contains("Unknown resource"));
    }
}
