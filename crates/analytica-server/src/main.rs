use analytica_cache::{CacheConfig, CacheEngine};
use analytica_core::{AnalyticalError, ErrorCode, RecoveryTable, Result};
use analytica_ratelimit::RateLimitManager;
use analytica_server::client::ResearchClient;
use analytica_server::config::ServerConfig;
use analytica_server::registry::ToolRegistry;
use analytica_server::shell::InvocationShell;
use analytica_server::surface::{self, SurfaceState};
use analytica_server::tools::{research, statistics};
use analytica_server::transport;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const RESEARCH_BASE_URL: &str = "https://api.exa.ai";

#[tokio::main]
async fn main() {
    // Initialization failures terminate with exit code 1; anything after
    // startup surfaces as tool errors without ending the process.
    if let Err(err) = run().await {
        eprintln!("initialization failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(&config);
    tracing::info!(mode = config.run_mode.as_str(), "starting analytica server");

    let recovery = Arc::new(RecoveryTable::standard());

    let mut cache_builder = CacheConfig::builder()
        .name("analytica")
        .max_size(config.cache_max_size)
        .default_ttl(config.cache_default_ttl)
        .cleanup_interval(Some(config.cache_cleanup_interval))
        .refresh_threshold(config.cache_refresh_threshold);
    if config.research_cache_enabled {
        cache_builder = cache_builder
            .persist_dir(config.cache_dir.clone())
            .persistent_namespace("research");
    }
    let cache: CacheEngine<serde_json::Value> = CacheEngine::new(cache_builder.build());
    if config.research_cache_enabled {
        let restored = cache.preload().await;
        tracing::info!(restored, "cache preload complete");
    }
    cache.start_sweeper();

    let ratelimit = Arc::new(
        RateLimitManager::builder()
            .name("external")
            .recovery(Arc::clone(&recovery))
            .build(),
    );
    if let Some(key) = &config.research_api_key {
        ratelimit.register_keys(research::RESEARCH_PROVIDER, [key.clone()]);
    }
    ratelimit.configure_endpoint(
        research::SEARCH_ENDPOINT,
        config.rate_limit_max_requests,
        config.rate_limit_window,
    );

    let mut registry = ToolRegistry::new();
    registry.register(statistics::analyze_dataset_spec())?;
    registry.register(statistics::correlation_spec())?;
    registry.register(research::research_search_spec(Arc::new(
        ResearchClient::new(RESEARCH_BASE_URL),
    )))?;

    let shell = Arc::new(InvocationShell::new(
        registry,
        cache,
        ratelimit,
        recovery,
        config.research_cache_enabled,
    ));

    if config.metrics_enabled {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|err| {
            AnalyticalError::configuration(format!("cannot install metrics recorder: {err}"))
        })?;
        let state = Arc::new(SurfaceState::new(
            Arc::clone(&shell),
            Some(handle),
            config.metrics_rate_limit,
            config.max_metrics_bytes,
        ));
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(err) = surface::serve(state, port).await {
                tracing::error!(error = %err, "metrics surface terminated");
            }
        });
    }

    transport::run(shell).await.map_err(|err| {
        AnalyticalError::new(
            ErrorCode::ToolExecutionFailed,
            format!("stdio transport failed: {err}"),
        )
    })
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));
    // Tool responses own stdout; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
