use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all Polaris endpoints.
pub fn build_router(state: AppState, permissive_cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(handler::health_handler))
        .route(
            "/objects/:oid",
            get(handler::get_object).post(handler::apply_operation),
        )
        .route("/objects/:oid/transforms", get(handler::get_transforms))
        .route(
            "/objects/:oid/versions/:version/locations",
            get(handler::list_locations),
        )
        .route(
            "/objects/:oid/versions/:version/locations/:did",
            get(handler::has_location)
                .post(handler::add_location)
                .delete(handler::remove_location),
        )
        .route("/batch/transforms", post(handler::batch_transforms))
        .route("/batch/locations", post(handler::batch_locations))
        .layer(TraceLayer::new_for_http());
    let router = if permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };
    router.with_state(state)
}
