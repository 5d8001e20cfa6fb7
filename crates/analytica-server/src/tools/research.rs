//! Research tool backed by the external search provider.
//!
//! The handler itself only performs the HTTP call; the invocation shell
//! routes it through the rate limiter (with key rotation), the resilience
//! wrapper and the research cache because of the `external` declaration.

use crate::client::ResearchClient;
use crate::registry::{CachePolicy, ExternalDeps, ToolSpec};
use analytica_cache::Priority;
use analytica_core::{AnalyticalError, ErrorCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const RESEARCH_PROVIDER: &str = "exa";
pub const SEARCH_ENDPOINT: &str = "search";

pub fn research_search_spec(client: Arc<ResearchClient>) -> ToolSpec {
    ToolSpec {
        name: "research_search".into(),
        description: "Web search through the research provider, with cached and rate-limited access".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "minLength": 1},
                "numResults": {"type": "integer", "minimum": 1, "maximum": 25}
            },
            "required": ["query"]
        }),
        handler: Arc::new(move |params, ctx| {
            let client = Arc::clone(&client);
            Box::pin(async move {
                let Some(api_key) = ctx.api_key else {
                    return Err(AnalyticalError::new(
                        ErrorCode::ToolDependencyMissing,
                        "research provider API key is not configured",
                    ));
                };
                let query = params["query"].as_str().unwrap_or_default().to_string();
                let num_results = params["numResults"].as_u64().unwrap_or(5);
                client.search(&api_key, &query, num_results).await
            })
        }),
        cache: Some(CachePolicy {
            namespace: "research".into(),
            ttl: Duration::from_secs(1800),
            priority: Priority::High,
            tags: vec!["research".into()],
        }),
        external: Some(ExternalDeps {
            provider: RESEARCH_PROVIDER.into(),
            endpoint: SEARCH_ENDPOINT.into(),
            rotate_keys_on_rate_limit: true,
        }),
    }
}
