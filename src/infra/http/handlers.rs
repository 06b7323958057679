use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Query, State};
use serde::Deserialize;
use slopfeed_api_types::{
    ExperimentOptionsResponse, ExperimentSetRequest, ExperimentSetResponse,
    ExperimentStatsResponse, FeedPost, FeedResponse, JudgeRequest, LoginRequest, LoginResponse,
    MessageResponse, UserSummary,
};

use crate::application::interactions::RecordOutcome;
use crate::domain::types::{InteractionAction, PostSource};

use super::error::ApiError;
use super::middleware::CurrentUser;
use super::models::{feed_post, post_reference, stats_view};
use super::state::HttpState;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedQuery {
    pub limit: Option<usize>,
    pub source: Option<String>,
}

pub async fn get_feed(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> ApiResult<FeedResponse> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::bad_request("Invalid query", Some(rejection.body_text()))
            .with_source("infra::http::feed")
    })?;

    let source = match query.source.as_deref() {
        None => PostSource::default(),
        Some(raw) => PostSource::try_from(raw).map_err(|_| {
            ApiError::bad_request(
                "Invalid source",
                Some(format!("unknown source `{raw}`, expected `posts` or `humorposts`")),
            )
            .with_source("infra::http::feed")
        })?,
    };

    let batch = state
        .feed
        .next_batch(user.id, source, query.limit)
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::feed"))?;

    let posts: Vec<FeedPost> = batch.entries.into_iter().map(feed_post).collect();
    Ok(Json(FeedResponse {
        count: posts.len(),
        posts,
        ai_posts_count: batch.ai_posts_count,
        batch_size: batch.batch_size,
    }))
}

pub async fn like(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<FeedPost>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    record(state, user, body, InteractionAction::Like, "Post liked successfully").await
}

pub async fn dislike(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<FeedPost>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    record(
        state,
        user,
        body,
        InteractionAction::Dislike,
        "Post disliked successfully",
    )
    .await
}

pub async fn next(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<FeedPost>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    record(state, user, body, InteractionAction::Next, "Post marked as seen").await
}

async fn record(
    state: HttpState,
    user: CurrentUser,
    body: Result<Json<FeedPost>, JsonRejection>,
    action: InteractionAction,
    ack: &'static str,
) -> ApiResult<MessageResponse> {
    let Json(post) = body.map_err(post_rejection)?;
    state
        .interactions
        .record(user.id, &post_reference(&post), action)
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::interactions"))?;
    Ok(Json(MessageResponse::new(ack)))
}

pub async fn judge_ai(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<JudgeRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = body.map_err(|rejection| {
        ApiError::bad_request(
            "Invalid data provided. Need post and isAI fields",
            Some(rejection.body_text()),
        )
        .with_source("infra::http::interactions")
    })?;

    let outcome = state
        .interactions
        .judge(user.id, &post_reference(&request.post), request.is_ai)
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::interactions"))?;

    let message = match outcome {
        RecordOutcome::Recorded | RecordOutcome::AlreadyRecorded => {
            "AI judgment recorded successfully"
        }
        RecordOutcome::Ignored => "Judgment received",
    };
    Ok(Json(MessageResponse::new(message)))
}

fn post_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("No post data provided", Some(rejection.body_text()))
        .with_source("infra::http::interactions")
}

pub async fn set_experiment(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<ExperimentSetRequest>, JsonRejection>,
) -> ApiResult<ExperimentSetResponse> {
    let Json(request) = body.map_err(|rejection| {
        ApiError::bad_request("invalid experiment", Some(rejection.body_text()))
            .with_source("infra::http::experiments")
    })?;

    let assignment = state
        .experiments
        .assign(user.id, request.experiment.as_deref())
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::experiments"))?;

    Ok(Json(ExperimentSetResponse {
        ok: true,
        current: assignment.visible().map(str::to_string),
    }))
}

pub async fn experiment_options(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<ExperimentOptionsResponse> {
    let options = state
        .experiments
        .options(user.id)
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::experiments"))?;

    Ok(Json(ExperimentOptionsResponse {
        experiments: options.experiments,
        supports_random: options.supports_random,
        current: options.current,
    }))
}

pub async fn experiment_stats(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<ExperimentStatsResponse> {
    let stats = state
        .experiments
        .stats(user.id)
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::experiments"))?;

    Ok(Json(ExperimentStatsResponse {
        stats: stats.into_iter().map(stats_view).collect(),
    }))
}

pub async fn login(
    State(state): State<HttpState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let Json(request) = body.map_err(|rejection| {
        ApiError::bad_request("username required", Some(rejection.body_text()))
            .with_source("infra::http::auth")
    })?;

    let session = state
        .auth
        .login(request.username.as_deref(), request.password.as_deref())
        .await
        .map_err(|err| ApiError::from(err).with_source("infra::http::auth"))?;

    Ok(Json(LoginResponse {
        token: session.token,
        user: UserSummary {
            id: session.user.id,
            username: session.user.username,
        },
    }))
}

pub async fn db_health(State(state): State<HttpState>) -> axum::response::Response {
    super::db_health_response(state.health.ping().await)
}
