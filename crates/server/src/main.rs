use rust_push_gateway::AppResources;
use rust_push_gateway::api::start_webserver;
use rust_push_gateway::cache::{GatewayCaches, spawn_cache_sweeper};
use rust_push_gateway::config::load_config_or_panic;
use rust_push_gateway::push::WebPushClient;
use rust_push_gateway::security::log::SecurityLog;
use rust_push_gateway::security::rate_limit::FixedWindowLimiter;
use sea_orm::Database;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "rust_push_gateway=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    dotenvy::dotenv().ok();

    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Set up SeaORM database connection
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    // Set up the Web Push delivery client
    let push = Arc::new(
        WebPushClient::new(&config.push).expect("Failed to initialize Web Push client"),
    );

    // Process-wide stateful services
    let caches = GatewayCaches::default();
    let limiter = Arc::new(FixedWindowLimiter::new(
        Duration::from_secs(config.security.rate_limit_window_secs),
        config.security.rate_limit_max_requests,
    ));
    let security_log = Arc::new(SecurityLog::new(db.clone()));

    // Start background cleanup task for the cache namespaces
    spawn_cache_sweeper(caches.clone());

    let resources = AppResources {
        db,
        push,
        config,
        caches,
        limiter,
        security_log,
    };

    tracing::info!(
        name = "main.configured",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        webhook_signature = %resources.config.webhook_secret_enabled().is_some(),
        rate_limit_max = %resources.config.security.rate_limit_max_requests,
        message = "Gateway configured"
    );

    start_webserver(resources).await?;
    Ok(())
}
