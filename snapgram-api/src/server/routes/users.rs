use crate::server::{
    Result, ServerError, ServerRouter, SessionConfig, auth::hash_token, json::Json,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use snapgram_common::model::{
    auth::{Session, SessionToken},
    user::{Registration, User},
};
use snapgram_db::Database;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::info;

pub fn public_routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(sign_in)
        .typed_post(register)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/sign_in", rejection(ServerError))]
struct SignInPath();

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct SignInInstructions {
    message: &'static str,
    authorization: &'static str,
    sign_up: &'static str,
}

async fn sign_in(SignInPath(): SignInPath) -> Json<SignInInstructions> {
    Json(SignInInstructions {
        message: "You need to sign in or sign up before continuing.",
        authorization: "Bearer <token>",
        sign_up: "/users",
    })
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users", rejection(ServerError))]
struct UsersPath();

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct Registered {
    user: User,
    token: String,
}

async fn register(
    UsersPath(): UsersPath,
    State(db): State<Arc<dyn Database>>,
    State(sessions): State<SessionConfig>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<Registered>)> {
    let new_user = registration
        .validate()
        .map_err(ServerError::InvalidRegistration)?;
    let user = db.create_user(&new_user).await?;

    let token = SessionToken::generate(user.id);
    let session = Session {
        user: user.id,
        token_hash: hash_token(&token).await?,
        created_at: UtcDateTime::now(),
        expires_after: sessions.lifetime,
    };
    db.create_session(&session).await?;

    info!(user_id = %user.id, "Registered user");
    Ok((
        StatusCode::CREATED,
        Json(Registered {
            user,
            token: token.as_token_str(),
        }),
    ))
}
