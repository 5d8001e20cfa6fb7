//! Tool registration: name, description, parameter schema and handler.
//!
//! Registration happens once at startup. Schemas are compiled ahead of time
//! so invocation only pays for validation, and an unknown tool name is a
//! `TOOL_NOT_FOUND` error.

use analytica_cache::Priority;
use analytica_core::{AnalyticalError, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-invocation context handed to tool handlers.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// API key selected by the rate-limit manager, for externally-dependent
    /// tools.
    pub api_key: Option<String>,
}

/// Async handler taking validated parameters and returning a JSON result.
pub type ToolHandler = Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Caching behavior for one tool's results.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub namespace: String,
    pub ttl: Duration,
    pub priority: Priority,
    pub tags: Vec<String>,
}

/// Declares that a tool calls out to an external provider and must run
/// through the rate limiter and the resilience wrapper.
#[derive(Debug, Clone)]
pub struct ExternalDeps {
    pub provider: String,
    pub endpoint: String,
    pub rotate_keys_on_rate_limit: bool,
}

/// Everything needed to register one tool.
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub handler: ToolHandler,
    pub cache: Option<CachePolicy>,
    pub external: Option<ExternalDeps>,
}

/// A registered tool with its compiled schema validator.
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub handler: ToolHandler,
    pub cache: Option<CachePolicy>,
    pub external: Option<ExternalDeps>,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .field("cache", &self.cache)
            .field("external", &self.external)
            .finish_non_exhaustive()
    }
}

impl RegisteredTool {
    /// Validates parameters, reporting the violating path in context.
    pub fn validate(&self, params: &Value) -> Result<()> {
        match self.validator.validate(params) {
            Ok(()) => Ok(()),
            Err(violation) => Err(AnalyticalError::validation(format!(
                "invalid parameters for '{}': {violation}",
                self.name
            ))
            .with_context("path", violation.instance_path.to_string())
            .with_tool(self.name.clone())),
        }
    }
}

/// Wire shape for `tools/list`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub schema: Value,
}

/// All registered tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        if self.tools.contains_key(&spec.name) {
            return Err(AnalyticalError::configuration(format!(
                "tool '{}' registered twice",
                spec.name
            )));
        }
        let validator = jsonschema::validator_for(&spec.schema).map_err(|err| {
            AnalyticalError::configuration(format!(
                "tool '{}' has an invalid parameter schema: {err}",
                spec.name
            ))
        })?;
        self.tools.insert(
            spec.name.clone(),
            Arc::new(RegisteredTool {
                name: spec.name,
                description: spec.description,
                schema: spec.schema,
                handler: spec.handler,
                cache: spec.cache,
                external: spec.external,
                validator,
            }),
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<RegisteredTool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| AnalyticalError::tool_not_found(name))
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name.clone(),
                description: tool.description.clone(),
                schema: tool.schema.clone(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
