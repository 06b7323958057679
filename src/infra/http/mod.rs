mod error;
mod handlers;
mod middleware;
mod models;
mod state;

pub use error::{ApiError, codes};
pub use middleware::CurrentUser;
pub use state::HttpState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;

use self::middleware::{log_responses, require_user, set_request_context};

/// Full HTTP surface: participant login, the feed, interactions and experiments.
pub fn build_router(state: HttpState) -> Router {
    let authenticated = Router::new()
        .route("/feed", get(handlers::get_feed))
        .route("/interactions/like", post(handlers::like))
        .route("/interactions/dislike", post(handlers::dislike))
        .route("/interactions/next", post(handlers::next))
        .route("/interactions/judgeAI", post(handlers::judge_ai))
        .route("/experiments/set", post(handlers::set_experiment))
        .route("/experiments/options", get(handlers::experiment_options))
        .route("/experiments/stats", get(handlers::experiment_stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ));

    let open = Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/_health/db", get(handlers::db_health));

    authenticated
        .merge(open)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
