use crate::server::ServerError;
use axum::{
    Json as AxumJson,
    extract::FromRequest,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

/// JSON body in both directions; rejections and serialization failures become
/// [`ServerError`]s.
#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => (TypedHeader(ContentType::json()), body).into_response(),
            Err(err) => ServerError::JsonResponse(err).into_response(),
        }
    }
}
