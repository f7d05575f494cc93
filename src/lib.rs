pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod ip_pool;
pub mod middleware;
pub mod models;
pub mod notifier;
pub mod provisioning;
pub mod repository;
pub mod sqlite_repo;
pub mod token;
pub mod util;
pub mod voucher;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use ip_pool::AddressPool;
use notifier::ChangeNotifier;
use repository::AccountRepository;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn AccountRepository>,
    pub notifier: ChangeNotifier,
    pub address_pool: Arc<AddressPool>,
    pub max_devices: i64,
    pub resource_dir: PathBuf,
}

impl AppState {
    /// Wires the notifier to the repository change feed. Must be called
    /// inside a tokio runtime.
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        address_pool: AddressPool,
        max_devices: i64,
        resource_dir: PathBuf,
        change_feed_table: &str,
    ) -> Self {
        let notifier = ChangeNotifier::new(change_feed_table);
        notifier.spawn_bridge(repo.subscribe_changes());
        Self {
            repo,
            notifier,
            address_pool: Arc::new(address_pool),
            max_devices,
            resource_dir,
        }
    }
}

fn authenticated_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/accounts/v1/accounts/me", get(handlers::accounts::get_me))
        .route(
            "/accounts/v1/devices",
            post(handlers::devices::create_device).get(handlers::devices::list_devices),
        )
        .route(
            "/accounts/v1/devices/{id}",
            get(handlers::devices::get_device).delete(handlers::devices::delete_device),
        )
        .route(
            "/app/v1/submit-voucher",
            post(handlers::app::submit_voucher),
        )
        .route(
            "/app/v1/www-auth-token",
            post(handlers::auth::create_www_auth_token),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_bearer_token,
        ))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/v1/token", post(handlers::auth::create_token))
        .route(
            "/accounts/v1/accounts",
            post(handlers::accounts::create_account),
        )
        .route("/app/v1/relays", get(handlers::app::get_relays))
        .route("/app/v1/api-addrs", get(handlers::app::get_api_addrs))
        .route(
            "/app/v1/releases/{platform}/{version}",
            get(handlers::app::get_release),
        )
        .route("/sse/events", get(handlers::events::stream_events))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

/// Build the full application router (used by main and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(authenticated_routes(&state))
        .merge(public_routes())
        .merge(health_routes())
        .with_state(state)
}
