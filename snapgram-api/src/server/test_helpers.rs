use crate::server::{ServerState, SessionConfig, app};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use bytes::Bytes;
use serde_json::Value;
use snapgram_common::{
    model::{
        auth::{Session, SessionToken},
        gram::{CreateGram, Gram, Picture, PictureKey},
        user::{CreateUser, User, UserHandle},
    },
    util::PositiveDuration,
};
use snapgram_db::{Database, MemoryDatabase};
use snapgram_store::{LocalStore, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::UtcDateTime;
use tower::ServiceExt;

pub const TEST_UPLOAD_LIMIT: usize = 1024 * 1024;
pub const PICTURE_BYTES: &[u8] = b"\xff\xd8\xff\xe0 not quite a jpeg";
const BOUNDARY: &str = "snapgram-test-boundary";

/// The full router over an in-memory database and a temporary picture directory.
pub struct TestApp {
    pub router: Router,
    pub db: Arc<MemoryDatabase>,
    pub store: Arc<LocalStore>,
    _upload_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_upload_limit(TEST_UPLOAD_LIMIT)
    }

    pub fn with_upload_limit(upload_limit: usize) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let db = Arc::new(MemoryDatabase::default());
        let store = Arc::new(LocalStore::new(upload_dir.path()));

        let state = ServerState {
            db: db.clone(),
            store: store.clone(),
            sessions: SessionConfig::default(),
        };

        Self {
            router: app(state, upload_limit),
            db,
            store,
            _upload_dir: upload_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// A user with a fresh session; returns the bearer token.
    pub async fn user(&self, handle: &str) -> (User, String) {
        self.user_with_session(handle, UtcDateTime::now(), None)
            .await
    }

    pub async fn user_with_session(
        &self,
        handle: &str,
        created_at: UtcDateTime,
        expires_after: Option<PositiveDuration>,
    ) -> (User, String) {
        let user = self
            .db
            .create_user(&CreateUser {
                handle: UserHandle::new(handle.into()).unwrap(),
            })
            .await
            .unwrap();

        let token = SessionToken::generate(user.id);
        self.db
            .create_session(&Session {
                user: user.id,
                token_hash: token.hash().unwrap(),
                created_at,
                expires_after,
            })
            .await
            .unwrap();

        (user, token.as_token_str())
    }

    /// A gram with its picture already in the store.
    pub async fn gram(&self, owner: &User, message: &str) -> Gram {
        let key = PictureKey::for_upload(owner.id, rand::random(), Some("picture.jpg"));
        self.store
            .put(key.get(), Bytes::from_static(PICTURE_BYTES))
            .await
            .unwrap();

        self.db
            .create_gram(&CreateGram {
                owner: owner.id,
                message: message.into(),
                picture: Picture {
                    key,
                    content_type: "image/jpeg".into(),
                },
            })
            .await
            .unwrap()
    }

    pub async fn grams(&self) -> Vec<Gram> {
        self.db.fetch_grams().await.unwrap()
    }
}

fn builder(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    builder(method, uri, token).body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    builder(method, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// A new-gram form with the given fields; a picture is `(file name, bytes)`
/// sent as a JPEG.
pub fn gram_form_request(
    token: Option<&str>,
    message: Option<&str>,
    picture: Option<(&str, &[u8])>,
) -> Request<Body> {
    multipart_gram_request(
        token,
        message,
        picture.map(|(file_name, data)| (file_name, "image/jpeg", data)),
    )
}

/// A new-gram form whose picture is `(file name, content type, bytes)`.
pub fn typed_gram_form_request(
    token: Option<&str>,
    message: Option<&str>,
    picture: (&str, &str, &[u8]),
) -> Request<Body> {
    multipart_gram_request(token, message, Some(picture))
}

fn multipart_gram_request(
    token: Option<&str>,
    message: Option<&str>,
    picture: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();

    if let Some(message) = message {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"message\"\r\n\r\n\
                {message}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = picture {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"picture\"; filename=\"{file_name}\"\r\n\
                Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    builder(Method::POST, "/grams", token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[track_caller]
pub fn assert_redirect(response: &Response<Body>, location: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], location);
}
