use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use snapgram_common::model::{
    Id,
    auth::{SessionToken, SessionTokenHash},
    user::UserMarker,
};
use snapgram_db::Database;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::task;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user behind a valid, unexpired session token.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Database>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<Self>() {
            return Ok(*user);
        }

        let request_token: SessionToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = hash_token(&request_token).await?;

        let session = Arc::<dyn Database>::from_ref(state)
            .fetch_session(&token_hash)
            .await?
            .ok_or(ServerError::InvalidSession)?;

        if session.user != request_token.user_id || session.is_expired_at(UtcDateTime::now()) {
            return Err(ServerError::InvalidSession);
        }

        let user = Self { id: session.user };
        parts.extensions.insert(user);
        Ok(user)
    }
}

/// Runs the argon2 hash of a token off the async workers.
pub async fn hash_token(token: &SessionToken) -> Result<SessionTokenHash, ServerError> {
    let token = token.clone();
    let token_hash = task::spawn_blocking(move || token.hash()).await??;
    Ok(token_hash)
}

/// Rejects the request before any path or body is looked at unless it carries
/// a valid session.
pub async fn require_user(user: AuthenticatedUser, mut request: Request, next: Next) -> Response {
    debug!(user_id = %user.user_id(), "Authenticated request");
    request.extensions_mut().insert(user);
    next.run(request).await
}
