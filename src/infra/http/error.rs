use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::auth::AuthError;
use crate::application::error::ErrorReport;
use crate::application::experiments::ExperimentError;
use crate::application::feed::FeedError;
use crate::application::interactions::InteractionError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const TOKEN_EXPIRED: &str = "token_expired";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_LIMIT: &str = "invalid_limit";
    pub const INVALID_EXPERIMENT: &str = "invalid_experiment";
    pub const MISSING_TITLE: &str = "missing_title";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    source: &'static str,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            source: "infra::http",
        }
    }

    /// Names the handler or layer that produced the error in the response log.
    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message, None)
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Internal server error",
            Some(hint.into()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            self.source,
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => Self::new(
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "Duplicate record",
                Some(constraint),
            ),
            RepoError::NotFound => Self::not_found("Resource not found", None),
            RepoError::InvalidInput { message } => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Invalid input",
                Some(message),
            ),
            RepoError::Integrity { message } => Self::new(
                StatusCode::CONFLICT,
                codes::INTEGRITY,
                "Integrity constraint violated",
                Some(message),
            ),
            RepoError::Timeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
                None,
            ),
            RepoError::Persistence(message) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
                Some(message),
            ),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownExperiment { name } => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_EXPERIMENT,
                "invalid experiment",
                Some(name),
            ),
            DomainError::Validation { message } => {
                Self::bad_request("Invalid request", Some(message))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidLimit { requested, max } => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_LIMIT,
                "Invalid limit",
                Some(format!("limit {requested} exceeds the maximum of {max}")),
            ),
            FeedError::Repo(err) => err.into(),
        }
    }
}

impl From<InteractionError> for ApiError {
    fn from(err: InteractionError) -> Self {
        match err {
            InteractionError::MissingTitle => Self::new(
                StatusCode::BAD_REQUEST,
                codes::MISSING_TITLE,
                "No post data provided",
                Some("post.title is required".to_string()),
            ),
            InteractionError::UnknownAiPost(id) => {
                Self::not_found("AI post not found", Some(format!("ai-{id}")))
            }
            InteractionError::UnknownHumorPost(id) => {
                Self::not_found("Humor post not found", Some(id.to_string()))
            }
            InteractionError::Repo(err) => err.into(),
        }
    }
}

impl From<ExperimentError> for ApiError {
    fn from(err: ExperimentError) -> Self {
        match err {
            ExperimentError::MissingExperiment => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_EXPERIMENT,
                "invalid experiment",
                Some("experiment is required".to_string()),
            ),
            ExperimentError::Domain(err) => err.into(),
            ExperimentError::UnknownUser(_) => Self::unauthorized("user not found"),
            ExperimentError::Repo(err) => err.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingUsername => Self::bad_request("username required", None),
            AuthError::InvalidCredentials => Self::unauthorized("invalid credentials"),
            AuthError::MissingToken => Self::unauthorized("missing bearer token"),
            AuthError::InvalidToken => Self::unauthorized("invalid token"),
            AuthError::ExpiredToken => Self::new(
                StatusCode::UNAUTHORIZED,
                codes::TOKEN_EXPIRED,
                "invalid token",
                Some("token expired".to_string()),
            ),
            AuthError::UnknownUser => Self::unauthorized("user not found"),
            AuthError::Issue(err) => Self::internal(err.to_string()),
            AuthError::Repo(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn body_carries_code_message_and_hint() {
        let response = ApiError::from(FeedError::InvalidLimit {
            requested: 500,
            max: 100,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<ErrorReport>().is_some());

        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"]["code"], codes::INVALID_LIMIT);
        assert_eq!(body["error"]["message"], "Invalid limit");
        assert_eq!(
            body["error"]["hint"],
            "limit 500 exceeds the maximum of 100"
        );
    }

    #[test]
    fn auth_failures_are_unauthorized() {
        for err in [
            AuthError::MissingToken,
            AuthError::InvalidToken,
            AuthError::ExpiredToken,
            AuthError::UnknownUser,
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(ApiError::from(err).status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(
            ApiError::from(AuthError::MissingUsername).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_experiment_is_a_bad_request() {
        let err = ApiError::from(ExperimentError::Domain(DomainError::unknown_experiment(
            "poetry",
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_EXPERIMENT);
    }

    #[test]
    fn missing_archive_post_is_not_found() {
        let err = ApiError::from(InteractionError::UnknownAiPost(7));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
