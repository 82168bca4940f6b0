use crate::server::{ServerRouter, ServerState, auth::require_user};
use axum::middleware::from_fn_with_state;

mod comments;
mod grams;
mod users;

/// Public routes merged with the ones that need a signed-in user.
///
/// Authentication runs as a route layer so it happens before the handler
/// extracts paths or bodies.
pub fn routes(state: &ServerState) -> ServerRouter {
    let protected = ServerRouter::new()
        .merge(grams::protected_routes())
        .merge(comments::protected_routes())
        .route_layer(from_fn_with_state(state.clone(), require_user));

    ServerRouter::new()
        .merge(grams::public_routes())
        .merge(users::public_routes())
        .merge(protected)
}
