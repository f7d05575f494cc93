use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use vpn_account_api::config::Config;
use vpn_account_api::repository::AccountRepository;
use vpn_account_api::sqlite_repo::SqliteRepository;
use vpn_account_api::{build_app, db, AppState};

fn build_cors(config: &Config) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
}

/// Background job: ping the database and report outages and recoveries.
async fn heartbeat_job(repo: Arc<dyn AccountRepository>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    let mut healthy = true;

    loop {
        interval.tick().await;

        match repo.health_check().await {
            Ok(()) => {
                if !healthy {
                    tracing::info!("Database reachable again");
                }
                healthy = true;
            }
            Err(e) => {
                if healthy {
                    tracing::error!("Database heartbeat failed: {e}");
                }
                healthy = false;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let address_pool = config
        .address_pool()
        .unwrap_or_else(|e| panic!("Invalid address configuration: {e}"));

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to initialize database");

    tracing::info!("Database initialized at {}", config.database_url);
    tracing::info!(
        subnet = %address_pool.v4_subnet(),
        max_devices = config.max_devices,
        change_feed_table = %config.change_feed_table,
        "Allocation settings loaded"
    );

    let cors = build_cors(&config);

    let repo: Arc<dyn AccountRepository> = Arc::new(SqliteRepository::new(pool));
    let state = AppState::new(
        repo.clone(),
        address_pool,
        config.max_devices,
        config.resource_dir.clone(),
        &config.change_feed_table,
    );

    let notifier = state.notifier.clone();
    let app = build_app(state)
        .layer(RequestBodyLimitLayer::new(config.max_payload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_request(trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    trace::DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        )
        .layer(cors);

    tokio::spawn(heartbeat_job(
        repo,
        Duration::from_secs(config.heartbeat_secs),
    ));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            notifier.shutdown();
        })
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutting down...");
}
