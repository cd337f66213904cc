use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use mr_domain::config::{Config, ConfigSeverity, CorsConfig, StorageBackend};
use mr_gateway::api;
use mr_gateway::cli::{Cli, Command, ConfigCommand};
use mr_gateway::runtime::session_lock::SessionLockMap;
use mr_gateway::state::AppState;
use mr_providers::ModelRouter;
use mr_sessions::{
    MemorySessionStore, RedisSessionStore, SessionKeyPolicy, SessionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = mr_gateway::cli::load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = mr_gateway::cli::load_config(&cli.config)?;
            if !mr_gateway::cli::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = mr_gateway::cli::load_config(&cli.config)?;
            mr_gateway::cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("modelrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mr_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("ModelRelay starting");

    // ── Config validation (fail-fast) ────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── Model router (providers + mappings) ──────────────────────────
    let router = Arc::new(
        ModelRouter::from_config(&config).context("initializing model router")?,
    );
    tracing::info!(
        providers = router.registry().len(),
        models = router.list_models().len(),
        "model router ready"
    );

    // ── Session store ────────────────────────────────────────────────
    let ttl = Duration::from_secs(config.storage.session_ttl_secs);
    let store: Arc<dyn SessionStore> = match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(MemorySessionStore::new());

            // TTL sweep for the in-process backend.
            let sweeper = store.clone();
            let interval = Duration::from_secs(config.storage.sweep_interval_secs.max(1));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let evicted = sweeper.sweep_expired(ttl);
                    if evicted > 0 {
                        tracing::info!(evicted, "expired sessions evicted");
                    }
                }
            });
            tracing::info!(ttl_secs = ttl.as_secs(), "in-memory session store ready");
            store
        }
        StorageBackend::Redis => {
            let url = config
                .storage
                .redis_url
                .as_deref()
                .context("storage.redis_url missing")?;
            let store = Arc::new(
                RedisSessionStore::new(url, ttl)
                    .context("initializing redis session store")?,
            );
            // Expiry is native to the backend; no sweep task needed.
            tracing::info!(ttl_secs = ttl.as_secs(), "redis session store ready");
            store
        }
    };

    // ── Session locks (per-session single-flight) ────────────────────
    let session_locks = Arc::new(SessionLockMap::new());
    {
        let locks = session_locks.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                locks.prune_idle();
            }
        });
    }

    // ── Key derivation policy ────────────────────────────────────────
    let key_policy = Arc::new(SessionKeyPolicy::from_config(&config.storage));

    let state = AppState {
        config: config.clone(),
        store,
        router,
        session_locks,
        key_policy,
    };

    // ── HTTP surface ─────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);
    let app = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ))
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "ModelRelay listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins. A single
/// `"*"` entry allows every origin.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
