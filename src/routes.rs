// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, catalog, dashboard, manage},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Public catalog routes need no token.
/// * Attempt and dashboard routes need any authenticated user.
/// * `/api/manage` needs a teacher or admin, `/api/admin` an admin.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let catalog_routes = Router::new()
        .route("/", get(catalog::list_tests))
        .route("/{id}", get(catalog::get_test))
        .merge(
            Router::new()
                .route("/{id}/attempts", post(attempt::start_attempt))
                .layer(auth.clone()),
        );

    let attempt_routes = Router::new()
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", post(attempt::submit_answer))
        .route("/{id}/submit", post(attempt::submit_attempt))
        .route("/{id}/results", get(attempt::get_results))
        .layer(auth.clone());

    let me_routes = Router::new()
        .route("/dashboard", get(dashboard::get_dashboard))
        .layer(auth.clone());

    let manage_routes = Router::new()
        .route("/tests", get(manage::list_my_tests).post(manage::create_test))
        .route(
            "/tests/{id}",
            get(manage::get_managed_test)
                .put(manage::update_test)
                .delete(manage::delete_test),
        )
        .route("/tests/{id}/publish", put(manage::set_published))
        .route("/attempts", get(manage::search_attempts))
        // Auth first, then the role check
        .layer(middleware::from_fn(staff_middleware))
        .layer(auth.clone());

    let admin_routes = Router::new()
        .route("/attempts/{id}/abandon", post(admin::abandon_attempt))
        .route("/users/{id}/stats/rebuild", post(admin::rebuild_stats))
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth);

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api/tests", catalog_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/me", me_routes)
        .nest("/api/manage", manage_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
