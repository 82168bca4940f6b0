use crate::server::{
    ROOT_PATH, Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::{
    extract::{State, rejection::PathRejection},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use snapgram_common::model::{
    Id,
    comment::{CommentSubmission, CreateComment},
    gram::GramMarker,
};
use snapgram_db::{Database, DbError};
use std::sync::Arc;
use tracing::{debug, info};

pub fn protected_routes() -> ServerRouter {
    ServerRouter::new().typed_post(create_comment)
}

/// An unparsable gram id is answered like a missing gram.
#[derive(Debug)]
pub struct CommentPathRejection(PathRejection);

impl From<PathRejection> for CommentPathRejection {
    fn from(rejection: PathRejection) -> Self {
        Self(rejection)
    }
}

impl IntoResponse for CommentPathRejection {
    fn into_response(self) -> Response {
        ServerError::CommentPathRejection(self.0).into_response()
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/grams/{id}/comments", rejection(CommentPathRejection))]
struct GramCommentsPath {
    id: Id<GramMarker>,
}

/// Invalid comments are dropped; the caller is sent back to the listing either way.
async fn create_comment(
    GramCommentsPath { id }: GramCommentsPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
    submission: Result<Json<CommentSubmission>, ServerError>,
) -> Result<Redirect> {
    if db.fetch_gram(id).await?.is_none() {
        return Err(ServerError::CommentGramNotFound(id));
    }
    let Json(submission) = submission?;

    if let Err(errors) = submission.validate() {
        debug!(gram_id = %id, %errors, "Dropping invalid comment");
        return Ok(Redirect::to(ROOT_PATH));
    }

    let new_comment = CreateComment {
        gram_id: id,
        owner: user.user_id(),
        message: submission.message,
    };

    match db.create_comment(&new_comment).await {
        Ok(comment) => info!(
            comment_id = %comment.id,
            gram_id = %id,
            user_id = %user.user_id(),
            "Created comment"
        ),
        Err(DbError::MissingReference("gram")) => {
            return Err(ServerError::CommentGramNotFound(id));
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Redirect::to(ROOT_PATH))
}
