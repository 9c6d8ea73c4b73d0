//! HTTP router construction.
//!
//! `/health`, `/login`, `/logout` and `/docs` are public; the dashboard page and
//! every `/api/*` route sit behind [`auth::require_session`].

use std::sync::Arc;

use axum::middleware;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::state::AppState;
use crate::{api, auth, doc, page};

async fn index() -> Html<String> {
    Html(page::dashboard())
}

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(index))
        .route("/api/data", get(api::data))
        .route("/api/stats", get(api::stats))
        .route("/api/anomalies", get(api::anomalies))
        .route("/api/current_alert", get(api::current_alert))
        .route("/api/drift", get(api::drift))
        .route("/api/roi", get(api::roi))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(api::health))
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/logout", get(auth::logout))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", doc::ApiDoc::openapi()))
}
