use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::constants::media::URL_PREFIX;
use crate::db::Store;
use crate::permissions::Policy;
use crate::services::{AuthService, ImageStore};
use crate::state::SharedState;

pub mod auth;
mod error;
mod extract;
mod images;
mod locations;
mod notifications;
mod observability;
mod profile;
mod tickets;
mod turns;
mod types;
mod user_permissions;
mod users;
mod validation;

pub use error::ApiError;
pub use extract::Payload;
pub use types::*;
pub use validation::FieldErrors;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.shared.policy
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.shared.images
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();
    let media_root = state.images().root().to_path_buf();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/token", post(auth::obtain_token))
        .route("/auth/token/refresh", post(auth::refresh_token))
        .route("/health", get(observability::health))
        .route("/metrics", get(observability::get_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            observability::request_log_middleware,
        ))
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .nest_service(URL_PREFIX, ServeDir::new(media_root))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let upload_limit = state.config().server.max_upload_mb * 1024 * 1024;

    Router::new()
        .route(
            "/users/",
            get(users::list::<users::AllUsers>).post(users::create::<users::AllUsers>),
        )
        .route(
            "/users/{id}/",
            get(users::retrieve::<users::AllUsers>)
                .patch(users::update::<users::AllUsers>)
                .put(users::update::<users::AllUsers>)
                .delete(users::destroy::<users::AllUsers>),
        )
        .route(
            "/employees/",
            get(users::list::<users::Employees>).post(users::create::<users::Employees>),
        )
        .route(
            "/employees/{id}/",
            get(users::retrieve::<users::Employees>)
                .patch(users::update::<users::Employees>)
                .put(users::update::<users::Employees>)
                .delete(users::destroy::<users::Employees>),
        )
        .route(
            "/coworkers/",
            get(users::list::<users::Coworkers>).post(users::create::<users::Coworkers>),
        )
        .route(
            "/coworkers/{id}/",
            get(users::retrieve::<users::Coworkers>)
                .patch(users::update::<users::Coworkers>)
                .put(users::update::<users::Coworkers>)
                .delete(users::destroy::<users::Coworkers>),
        )
        .route(
            "/usersImage/",
            get(images::list)
                .post(images::create)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/usersImage/{id}/",
            get(images::retrieve)
                .patch(images::update)
                .delete(images::destroy)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/tickets/", get(tickets::list).post(tickets::create))
        .route(
            "/tickets/{id}/",
            get(tickets::retrieve)
                .patch(tickets::update)
                .put(tickets::update)
                .delete(tickets::destroy),
        )
        .route("/turns/", get(turns::list).post(turns::create))
        .route(
            "/turns/{id}/",
            get(turns::retrieve)
                .patch(turns::update)
                .put(turns::update)
                .delete(turns::destroy),
        )
        .route("/readTurns/", get(turns::list_own))
        .route("/readTurns/{id}/", get(turns::retrieve_own))
        .route(
            "/notifications/",
            get(notifications::list).post(notifications::create),
        )
        .route(
            "/notifications/{id}/",
            get(notifications::retrieve).delete(notifications::destroy),
        )
        .route("/notificationTypes/", get(notifications::list_types))
        .route(
            "/EditProfile",
            get(profile::get_profile).patch(profile::update_profile),
        )
        .route(
            "/UserPermissionList/{id}",
            get(user_permissions::list_permissions),
        )
        .route(
            "/ChangeUserPermissionList/{id}",
            patch(user_permissions::change_permissions),
        )
        .route("/countries/", get(locations::list_countries))
        .route(
            "/countries/{id}/provinces/",
            get(locations::list_provinces),
        )
        .route("/provinces/{id}/cities/", get(locations::list_cities))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
