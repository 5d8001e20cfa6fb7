//! Tool invocation shell.
//!
//! Composes the infrastructure around every tool call: schema validation,
//! cache lookup on a deterministic key, rate-limited + circuit-broken
//! execution for externally-dependent tools, result caching, and metrics.

use crate::canonical::tool_cache_key;
use crate::registry::{RegisteredTool, ToolContext, ToolDescriptor, ToolRegistry};
use analytica_cache::{CacheEngine, CacheStats, SetOptions};
use analytica_core::{AnalyticalError, RecoveryTable, Result};
use analytica_ratelimit::{ExecuteOptions, RateLimitManager, RateLimitStats};
use analytica_resilience::{Resilience, ResilienceMetrics};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const SUMMARY_MAX_ITEMS: usize = 10;
const SUMMARY_MAX_CHARS: usize = 120;
const SUMMARY_MAX_DEPTH: usize = 3;

/// Wraps every registered tool with validation, caching, rate limiting,
/// resilience and metrics.
pub struct InvocationShell {
    registry: ToolRegistry,
    cache: CacheEngine<Value>,
    ratelimit: Arc<RateLimitManager>,
    guards: Mutex<HashMap<String, Arc<Resilience>>>,
    recovery: Arc<RecoveryTable>,
    cache_enabled: bool,
}

impl InvocationShell {
    pub fn new(
        registry: ToolRegistry,
        cache: CacheEngine<Value>,
        ratelimit: Arc<RateLimitManager>,
        recovery: Arc<RecoveryTable>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            registry,
            cache,
            ratelimit,
            guards: Mutex::new(HashMap::new()),
            recovery,
            cache_enabled,
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    /// Runs one tool call through the full stack.
    pub async fn invoke(&self, name: &str, params: Value) -> Result<Value> {
        let started = Instant::now();
        let outcome = self.invoke_inner(name, &params).await;
        let elapsed = started.elapsed();
        metrics::histogram!("tool_duration_seconds", "tool" => name.to_string())
            .record(elapsed.as_secs_f64());
        metrics::counter!(
            "tool_calls_total",
            "tool" => name.to_string(),
            "outcome" => if outcome.is_ok() { "success" } else { "error" }
        )
        .increment(1);

        outcome.map_err(|err| {
            tracing::debug!(
                tool = name,
                code = err.code().as_str(),
                "tool call failed"
            );
            err.with_tool(name.to_string())
                .with_context("params", summarize(&params, 0))
        })
    }

    async fn invoke_inner(&self, name: &str, params: &Value) -> Result<Value> {
        let tool = self.registry.get(name)?;
        tool.validate(params)?;

        let address = tool
            .cache
            .as_ref()
            .map(|policy| (policy.clone(), tool_cache_key(name, params)));

        if self.cache_enabled {
            if let Some((policy, key)) = &address {
                if let Some(value) = self.cache.get(&policy.namespace, key) {
                    metrics::counter!("tool_cache_hits_total", "tool" => name.to_string())
                        .increment(1);
                    return Ok(value);
                }
                metrics::counter!("tool_cache_misses_total", "tool" => name.to_string())
                    .increment(1);
            }
        }

        match self.run_handler(&tool, params.clone()).await {
            Ok(value) => {
                if self.cache_enabled {
                    if let Some((policy, key)) = &address {
                        self.cache.set(
                            &policy.namespace,
                            key,
                            value.clone(),
                            SetOptions::new()
                                .ttl(policy.ttl)
                                .priority(policy.priority)
                                .tags(policy.tags.iter().cloned()),
                        );
                    }
                }
                Ok(value)
            }
            Err(err) => {
                // A concurrent caller (or background refresh) may have
                // repopulated the key while we were failing; the recovery
                // table decides whether serving it beats surfacing the error.
                if self.cache_enabled {
                    if let Some((policy, key)) = &address {
                        let stale_allowed = self
                            .recovery
                            .strategy_for(err.code())
                            .is_some_and(|strategy| strategy.cache_stale_on_failure);
                        if stale_allowed {
                            if let Some(value) = self.cache.get(&policy.namespace, key) {
                                tracing::warn!(
                                    tool = name,
                                    code = err.code().as_str(),
                                    "serving cached value after call failure"
                                );
                                return Ok(value);
                            }
                        }
                    }
                }
                Err(err)
            }
        }
    }

    async fn run_handler(&self, tool: &Arc<RegisteredTool>, params: Value) -> Result<Value> {
        let Some(external) = &tool.external else {
            return (tool.handler)(params, ToolContext::default()).await;
        };
        let guard = self.guard_for(&external.endpoint);
        let opts = ExecuteOptions::new(&external.provider, &external.endpoint)
            .rotate_keys_on_rate_limit(external.rotate_keys_on_rate_limit);
        let handler = Arc::clone(&tool.handler);
        self.ratelimit
            .execute(&opts, move |api_key| {
                let guard = Arc::clone(&guard);
                let handler = Arc::clone(&handler);
                let params = params.clone();
                async move {
                    guard
                        .execute(|| {
                            handler(
                                params.clone(),
                                ToolContext {
                                    api_key: Some(api_key.clone()),
                                },
                            )
                        })
                        .await
                }
            })
            .await
    }

    fn guard_for(&self, endpoint: &str) -> Arc<Resilience> {
        let mut guards = self.guards.lock().unwrap();
        Arc::clone(guards.entry(endpoint.to_string()).or_insert_with(|| {
            Arc::new(
                Resilience::builder()
                    .name(endpoint)
                    .recovery(Arc::clone(&self.recovery))
                    .build(),
            )
        }))
    }

    /// Snapshots for the metrics surface.
    pub fn cache_stats(&self) -> Vec<CacheStats> {
        self.cache.stats_all()
    }

    pub fn ratelimit_stats(&self) -> RateLimitStats {
        self.ratelimit.stats()
    }

    pub fn resilience_metrics(&self) -> Vec<ResilienceMetrics> {
        self.guards
            .lock()
            .unwrap()
            .values()
            .map(|guard| guard.metrics())
            .collect()
    }
}

/// Condensed rendering of call parameters for error context: large arrays
/// become length summaries, long strings are truncated, nesting is capped.
/// Raw argument payloads never land in logs or error objects.
fn summarize(value: &Value, depth: usize) -> Value {
    if depth >= SUMMARY_MAX_DEPTH {
        return json!("…");
    }
    match value {
        Value::Array(items) if items.len() > SUMMARY_MAX_ITEMS => {
            let sample: Vec<Value> = items.iter().take(3).map(|v| summarize(v, depth + 1)).collect();
            json!({"type": "array", "length": items.len(), "sample": sample})
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| summarize(v, depth + 1)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), summarize(v, depth + 1)))
                .collect(),
        ),
        Value::String(s) if s.chars().count() > SUMMARY_MAX_CHARS => {
            let prefix: String = s.chars().take(SUMMARY_MAX_CHARS).collect();
            json!(format!("{prefix}… ({} chars)", s.chars().count()))
        }
        other => other.clone(),
    }
}
