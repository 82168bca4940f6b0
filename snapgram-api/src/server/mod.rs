use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use serde::Serialize;
use snapgram_common::{
    model::{
        Id,
        auth::{SessionTokenDecodeError, SessionTokenHashError},
        gram::{GramForm, GramMarker},
        user::UserMarker,
        validation::{FieldError, ValidationErrors},
    },
    util::PositiveDuration,
};
use snapgram_db::{Database, DbError};
use snapgram_store::{ObjectStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

mod auth;
mod json;
mod routes;
#[cfg(test)]
mod test_helpers;

pub const SIGN_IN_PATH: &str = "/users/sign_in";
pub const ROOT_PATH: &str = "/";
pub const COMMENT_GRAM_NOT_FOUND_BODY: &str = "Not Found :(";

pub type ServerRouter = Router<ServerState>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SessionConfig {
    /// `None` keeps sessions valid forever.
    pub lifetime: Option<PositiveDuration>,
}

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub db: Arc<dyn Database>,
    pub store: Arc<dyn ObjectStore>,
    pub sessions: SessionConfig,
}

pub fn app(state: ServerState, upload_limit_bytes: usize) -> Router {
    routes::routes(&state)
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(upload_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(uri: Uri) -> ServerError {
    ServerError::UnknownRoute(uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Comment target path rejected: {0}")]
    CommentPathRejection(PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Incoming multipart form rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading multipart form failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided session token could not be decoded: {0}")]
    InvalidSessionToken(#[from] SessionTokenDecodeError),
    #[error("The session token could not be hashed: {0}")]
    SessionTokenHash(#[from] SessionTokenHashError),
    #[error("Hashing the session token did not finish: {0}")]
    SessionTokenHashTask(#[from] JoinError),
    #[error("Provided session was unknown or expired")]
    InvalidSession,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Gram with id {0} was not found.")]
    GramByIdNotFound(Id<GramMarker>),
    #[error("Picture of gram {0} was not found.")]
    PictureNotFound(Id<GramMarker>),
    #[error("Cannot comment on gram {0}, it was not found.")]
    CommentGramNotFound(Id<GramMarker>),
    #[error("User {user_id} does not own gram {gram_id}.")]
    NotGramOwner {
        gram_id: Id<GramMarker>,
        user_id: Id<UserMarker>,
    },
    #[error("Gram form was invalid: {0:?}")]
    InvalidGramForm(Box<GramForm>),
    #[error("Registration was invalid: {0}")]
    InvalidRegistration(ValidationErrors),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::CommentPathRejection(_)
            | ServerError::GramByIdNotFound(_)
            | ServerError::PictureNotFound(_)
            | ServerError::CommentGramNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidSessionToken(_)
            | ServerError::InvalidSession => StatusCode::SEE_OTHER,
            ServerError::NotGramOwner { .. } => StatusCode::FORBIDDEN,
            ServerError::InvalidGramForm(_) | ServerError::InvalidRegistration(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServerError::Database(DbError::HandleTaken(_)) => StatusCode::CONFLICT,
            ServerError::JsonRejection(rejection) => rejection.status(),
            ServerError::MultipartRejection(rejection) => rejection.status(),
            ServerError::Multipart(err) => err.status(),
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::Store(_)
            | ServerError::SessionTokenHash(_)
            | ServerError::SessionTokenHashTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn requires_sign_in(&self) -> bool {
        self.status() == StatusCode::SEE_OTHER
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.requires_sign_in() {
            debug!(reason = %self, "Redirecting to sign in");
            return Redirect::to(SIGN_IN_PATH).into_response();
        }

        let status = self.status();
        error!(error = %self, %status, "Replying with error");

        match self {
            ServerError::CommentPathRejection(_) | ServerError::CommentGramNotFound(_) => {
                (status, COMMENT_GRAM_NOT_FOUND_BODY).into_response()
            }
            ServerError::InvalidGramForm(form) => (status, Json(*form)).into_response(),
            ServerError::InvalidRegistration(errors) => {
                let error_response = ErrorResponse {
                    status: status.as_u16(),
                    errors: errors.into_inner(),
                };
                (status, Json(error_response)).into_response()
            }
            _ => {
                let error_response = ErrorResponse {
                    status: status.as_u16(),
                    errors: Vec::new(),
                };
                (status, Json(error_response)).into_response()
            }
        }
    }
}
