//! Immutable catalog of the tools a conversation may use.

use super::normalize::{normalize, OutputLimits};
use super::{
    ToolError, ToolKind, ToolResult, ToolSpec, ToolTransport, HUMAN_ASSISTANCE_TOOL,
};
use crate::llm::ToolDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default deadline for one remote tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry of remote tools plus the `human_assistance` pseudo-tool.
///
/// Built once at startup with [`ToolRegistryBuilder`] and shared as
/// `Arc<ToolRegistry>`; it is never mutated afterwards, so concurrent turns
/// resolve and invoke without locking.
///
/// # Example
///
/// ```rust,no_run
/// use parley_core::tool::{McpHttpTransport, ToolRegistry};
/// use std::sync::Arc;
///
/// # async fn run() {
/// let registry = ToolRegistry::builder()
///     .discover(Arc::new(McpHttpTransport::new("med_tools", "http://localhost:8001/mcp")))
///     .await
///     .build();
///
/// for def in registry.definitions() {
///     println!("{}: {}", def.name, def.description);
/// }
/// # }
/// ```
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    index: HashMap<String, usize>,
    transports: HashMap<String, Arc<dyn ToolTransport>>,
    limits: OutputLimits,
    default_timeout: Duration,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("servers", &self.transports.keys().collect::<Vec<_>>())
            .field("limits", &self.limits)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// A registry with no remote tools.
    pub fn empty() -> Self {
        ToolRegistryBuilder::new().build()
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolSpec, ToolError> {
        self.index
            .get(name)
            .map(|&i| &self.specs[i])
            .ok_or_else(|| ToolError::not_found(name))
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Number of remote tools.
    pub fn remote_count(&self) -> usize {
        self.specs.iter().filter(|s| s.is_remote()).count()
    }

    pub fn limits(&self) -> OutputLimits {
        self.limits
    }

    /// Definitions bound in the `query_or_respond` node.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs
            .iter()
            .filter(|s| s.is_remote())
            .map(ToolSpec::definition)
            .collect()
    }

    /// Definition bound in the `generate` node.
    pub fn human_assistance(&self) -> ToolDefinition {
        match self.resolve(HUMAN_ASSISTANCE_TOOL) {
            Ok(spec) => spec.definition(),
            Err(_) => ToolSpec::human_assistance().definition(),
        }
    }

    /// Run a remote tool and normalize its output.
    ///
    /// Never retries. The call is bounded by the tool's timeout, or the
    /// registry default.
    pub async fn invoke(&self, spec: &ToolSpec, arguments: Value) -> Result<ToolResult, ToolError> {
        let name = spec.name.as_str();
        if spec.kind == ToolKind::HumanAssistance {
            return Err(ToolError::invalid_arguments(format!(
                "'{}' is answered by an operator, not invoked",
                name
            )));
        }
        spec.validate_args(&arguments)?;

        let server = spec.server.as_deref().unwrap_or_default();
        let transport = self
            .transports
            .get(server)
            .ok_or_else(|| ToolError::unreachable(format!("no transport for server '{}'", server)))?;

        let deadline = spec.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let output = tokio::time::timeout(deadline, transport.call_tool(name, arguments))
            .await
            .map_err(|_| ToolError::timeout(deadline))??;

        if output.is_error {
            let reported = normalize(name, &output, self.limits);
            return Err(ToolError::malformed(format!(
                "tool reported an error: {}",
                reported.content
            )));
        }

        let result = normalize(name, &output, self.limits);
        debug!(
            tool = name,
            server,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = result.content.chars().count(),
            truncated = result.truncated,
            "tool call completed"
        );
        Ok(result)
    }
}

/// Collects tool specs and transports, then freezes them into a registry.
pub struct ToolRegistryBuilder {
    specs: Vec<ToolSpec>,
    transports: HashMap<String, Arc<dyn ToolTransport>>,
    limits: OutputLimits,
    default_timeout: Duration,
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            transports: HashMap::new(),
            limits: OutputLimits::default(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_limits(mut self, limits: OutputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Deadline for tool calls and for discovery.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a transport without listing its tools.
    pub fn with_transport(mut self, transport: Arc<dyn ToolTransport>) -> Self {
        self.transports
            .insert(transport.server().to_string(), transport);
        self
    }

    pub fn register(mut self, spec: ToolSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// List a server's tools and register them.
    ///
    /// A server that cannot be reached, answers with an error status, or
    /// returns garbage contributes no tools; the failure is logged and the
    /// builder carries on.
    pub async fn discover(mut self, transport: Arc<dyn ToolTransport>) -> Self {
        let server = transport.server().to_string();

        match tokio::time::timeout(self.default_timeout, transport.list_tools()).await {
            Ok(Ok(tools)) => {
                info!(server = %server, count = tools.len(), "discovered tools");
                for tool in tools {
                    self.specs.push(ToolSpec::remote(
                        &server,
                        tool.name,
                        tool.description.unwrap_or_default(),
                        tool.input_schema,
                    ));
                }
            }
            Ok(Err(e)) => {
                warn!(server = %server, error = %e, "tool discovery failed, continuing without its tools");
            }
            Err(_) => {
                warn!(
                    server = %server,
                    timeout_ms = self.default_timeout.as_millis() as u64,
                    "tool discovery timed out, continuing without its tools"
                );
            }
        }

        self.transports.insert(server, transport);
        self
    }

    pub fn build(self) -> ToolRegistry {
        let mut specs: Vec<ToolSpec> = Vec::with_capacity(self.specs.len() + 1);
        let mut index = HashMap::new();

        for spec in self.specs {
            if spec.is_remote() && spec.name == HUMAN_ASSISTANCE_TOOL {
                warn!(server = ?spec.server, "ignoring remote tool with reserved name '{}'", HUMAN_ASSISTANCE_TOOL);
                continue;
            }
            if index.contains_key(&spec.name) {
                warn!(tool = %spec.name, server = ?spec.server, "duplicate tool name, keeping the first");
                continue;
            }
            index.insert(spec.name.clone(), specs.len());
            specs.push(spec);
        }

        if !index.contains_key(HUMAN_ASSISTANCE_TOOL) {
            index.insert(HUMAN_ASSISTANCE_TOOL.to_string(), specs.len());
            specs.push(ToolSpec::human_assistance());
        }

        ToolRegistry {
            specs,
            index,
            transports: self.transports,
            limits: self.limits,
            default_timeout: self.default_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{RemoteTool, ToolErrorKind, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticServer {
        name: String,
        fail_listing: bool,
        delay: Duration,
    }

    impl StaticServer {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_listing: false,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ToolTransport for StaticServer {
        fn server(&self) -> &str {
            &self.name
        }

        async fn list_tools(&self) -> Result<Vec<RemoteTool>, ToolError> {
            if self.fail_listing {
                return Err(ToolError::unreachable("connection refused"));
            }
            Ok(vec![RemoteTool {
                name: "search_abstracts".to_string(),
                description: Some("Search PubMed abstracts".to_string()),
                input_schema: json!({"type": "object", "properties": {"term": {"type": "string"}}}),
            }])
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(self.delay).await;
            if arguments.get("fail").is_some() {
                return Ok(ToolOutput {
                    is_error: true,
                    ..ToolOutput::text("upstream rejected the query")
                });
            }
            Ok(ToolOutput::json(&json!({"tool": name, "args": arguments})))
        }
    }

    #[tokio::test]
    async fn test_discovery_registers_remote_tools() {
        let registry = ToolRegistry::builder()
            .discover(Arc::new(StaticServer::new("med_tools")))
            .await
            .build();

        assert_eq!(registry.remote_count(), 1);
        let spec = registry.resolve("search_abstracts").unwrap();
        assert_eq!(spec.server.as_deref(), Some("med_tools"));
        assert!(registry.resolve(HUMAN_ASSISTANCE_TOOL).is_ok());

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["search_abstracts"]);
    }

    #[tokio::test]
    async fn test_failed_discovery_contributes_nothing() {
        let server = StaticServer {
            fail_listing: true,
            ..StaticServer::new("med_tools")
        };
        let registry = ToolRegistry::builder().discover(Arc::new(server)).await.build();

        assert_eq!(registry.remote_count(), 0);
        assert!(registry.definitions().is_empty());
        assert_eq!(registry.human_assistance().name, HUMAN_ASSISTANCE_TOOL);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let registry = ToolRegistry::empty();
        let err = registry.resolve("nope").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_invoke_returns_normalized_payload() {
        let registry = ToolRegistry::builder()
            .discover(Arc::new(StaticServer::new("med_tools")))
            .await
            .build();

        let result = registry
            .invoke(registry.resolve("search_abstracts").unwrap(), json!({"term": "asthma"}))
            .await
            .unwrap();
        assert_eq!(result.tool, "search_abstracts");
        assert!(result.content.contains("asthma"));
    }

    #[tokio::test]
    async fn test_tool_reported_error_is_malformed_response() {
        let registry = ToolRegistry::builder()
            .discover(Arc::new(StaticServer::new("med_tools")))
            .await
            .build();

        let err = registry
            .invoke(registry.resolve("search_abstracts").unwrap(), json!({"fail": true}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::MalformedResponse);
        assert!(err.message.contains("upstream rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tool_times_out() {
        let server = StaticServer {
            delay: Duration::from_secs(60),
            ..StaticServer::new("med_tools")
        };
        let registry = ToolRegistry::builder()
            .with_default_timeout(Duration::from_secs(5))
            .discover(Arc::new(server))
            .await
            .build();

        let err = registry
            .invoke(registry.resolve("search_abstracts").unwrap(), json!({"term": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_human_assistance_cannot_be_invoked() {
        let registry = ToolRegistry::empty();
        let err = registry
            .invoke(registry.resolve(HUMAN_ASSISTANCE_TOOL).unwrap(), json!({"query": "?"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_registered_spec_routes_to_its_transport() {
        let registry = ToolRegistry::builder()
            .with_transport(Arc::new(StaticServer::new("med_tools")))
            .register(ToolSpec::remote(
                "med_tools",
                "search_abstracts",
                "Search PubMed abstracts",
                json!({"type": "object"}),
            ))
            .build();

        let result = registry
            .invoke(registry.resolve("search_abstracts").unwrap(), json!({"term": "copd"}))
            .await
            .unwrap();
        assert!(result.content.contains("copd"));
    }

    #[tokio::test]
    async fn test_duplicate_names_keep_first() {
        let registry = ToolRegistry::builder()
            .register(ToolSpec::remote("a", "lookup", "first", json!({"type": "object"})))
            .register(ToolSpec::remote("b", "lookup", "second", json!({"type": "object"})))
            .build();

        assert_eq!(registry.resolve("lookup").unwrap().description, "first");
        assert_eq!(registry.remote_count(), 1);
    }
}
