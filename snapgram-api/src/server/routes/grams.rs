use crate::server::{
    ROOT_PATH, Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect},
};
use axum_extra::routing::{RouterExt, TypedPath};
use bytes::Bytes;
use serde::Deserialize;
use snapgram_common::model::{
    Id,
    gram::{
        CreateGram, DEFAULT_PICTURE_CONTENT_TYPE, Gram, GramDetails, GramEdit, GramForm,
        GramMarker, GramSubmission, Picture, PictureKey, PictureUpload,
    },
};
use snapgram_db::Database;
use snapgram_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub fn public_routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(list_grams)
        .typed_get(show_gram)
        .typed_get(get_picture)
}

pub fn protected_routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(new_gram_form)
        .typed_post(create_gram)
        .typed_get(edit_gram_form)
        .typed_patch(update_gram)
        .typed_delete(destroy_gram)
}

/// Loads a gram the user is allowed to change.
///
/// A missing gram is reported before a foreign one.
async fn fetch_owned_gram(
    db: &dyn Database,
    id: Id<GramMarker>,
    user: AuthenticatedUser,
) -> Result<Gram> {
    let gram = db
        .fetch_gram(id)
        .await?
        .ok_or(ServerError::GramByIdNotFound(id))?;

    if !gram.is_owned_by(user.user_id()) {
        return Err(ServerError::NotGramOwner {
            gram_id: id,
            user_id: user.user_id(),
        });
    }

    Ok(gram)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

async fn index(
    IndexPath(): IndexPath,
    State(db): State<Arc<dyn Database>>,
) -> Result<Json<Vec<Gram>>> {
    Ok(Json(db.fetch_grams().await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/grams", rejection(ServerError))]
struct GramsPath();

async fn list_grams(
    GramsPath(): GramsPath,
    State(db): State<Arc<dyn Database>>,
) -> Result<Json<Vec<Gram>>> {
    Ok(Json(db.fetch_grams().await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/grams/{id}", rejection(ServerError))]
struct GramPath {
    id: Id<GramMarker>,
}

async fn show_gram(
    GramPath { id }: GramPath,
    State(db): State<Arc<dyn Database>>,
) -> Result<Json<GramDetails>> {
    let gram = db
        .fetch_gram(id)
        .await?
        .ok_or(ServerError::GramByIdNotFound(id))?;
    let comments = db.fetch_gram_comments(id).await?;

    Ok(Json(GramDetails { gram, comments }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/grams/{id}/picture", rejection(ServerError))]
struct GramPicturePath {
    id: Id<GramMarker>,
}

async fn get_picture(
    GramPicturePath { id }: GramPicturePath,
    State(db): State<Arc<dyn Database>>,
    State(store): State<Arc<dyn ObjectStore>>,
) -> Result<impl IntoResponse> {
    let gram = db
        .fetch_gram(id)
        .await?
        .ok_or(ServerError::GramByIdNotFound(id))?;
    let data = store
        .get_opt(gram.picture.key.get())
        .await?
        .ok_or(ServerError::PictureNotFound(id))?;

    let content_type = HeaderValue::from_str(gram.picture.served_content_type())
        .unwrap_or(HeaderValue::from_static(DEFAULT_PICTURE_CONTENT_TYPE));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        data,
    ))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/grams/new", rejection(ServerError))]
struct NewGramPath();

async fn new_gram_form(NewGramPath(): NewGramPath, _user: AuthenticatedUser) -> Json<GramForm> {
    Json(GramForm::default())
}

/// Reads the new-gram form. Field names may be bare or nested under `gram`.
async fn read_submission(mut multipart: Multipart) -> Result<GramSubmission> {
    let mut submission = GramSubmission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(ToOwned::to_owned);

        match name.as_deref() {
            Some("message" | "gram[message]") => {
                submission.message = Some(field.text().await?);
            }
            Some("picture" | "gram[picture]") => {
                let file_name = field.file_name().map(ToOwned::to_owned);
                let content_type = field.content_type().map(ToOwned::to_owned);
                let data = field.bytes().await?;

                submission.picture = Some(PictureUpload {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            other => debug!(field = ?other, "Ignoring unknown form field"),
        }
    }

    Ok(submission)
}

async fn create_gram(
    GramsPath(): GramsPath,
    State(db): State<Arc<dyn Database>>,
    State(store): State<Arc<dyn ObjectStore>>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Redirect> {
    let submission = read_submission(multipart?).await?;
    let submitted_message = submission.message.clone().unwrap_or_default();

    let submission = submission.validate().map_err(|errors| {
        ServerError::InvalidGramForm(Box::new(GramForm::rejected(
            None,
            submitted_message,
            errors,
        )))
    })?;

    let key = PictureKey::for_upload(
        user.user_id(),
        rand::random(),
        submission.picture.file_name.as_deref(),
    );
    let picture = Picture {
        key: key.clone(),
        content_type: submission.picture.content_type().to_owned(),
    };

    store
        .put(key.get(), Bytes::from(submission.picture.data))
        .await?;

    let new_gram = CreateGram {
        owner: user.user_id(),
        message: submission.message,
        picture,
    };

    let gram = match db.create_gram(&new_gram).await {
        Ok(gram) => gram,
        Err(err) => {
            if let Err(store_err) = store.delete(key.get()).await {
                warn!(%key, error = %store_err, "Could not remove picture of failed gram");
            }
            return Err(err.into());
        }
    };

    info!(gram_id = %gram.id, user_id = %user.user_id(), "Created gram");
    Ok(Redirect::to(ROOT_PATH))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/grams/{id}/edit", rejection(ServerError))]
struct EditGramPath {
    id: Id<GramMarker>,
}

async fn edit_gram_form(
    EditGramPath { id }: EditGramPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
) -> Result<Json<GramForm>> {
    let gram = fetch_owned_gram(&*db, id, user).await?;

    Ok(Json(GramForm::edit(&gram)))
}

async fn update_gram(
    GramPath { id }: GramPath,
    State(db): State<Arc<dyn Database>>,
    user: AuthenticatedUser,
    edit: Result<Json<GramEdit>, ServerError>,
) -> Result<Redirect> {
    fetch_owned_gram(&*db, id, user).await?;
    let Json(edit) = edit?;

    if let Err(errors) = edit.validate() {
        return Err(ServerError::InvalidGramForm(Box::new(GramForm::rejected(
            Some(id),
            edit.message,
            errors,
        ))));
    }

    db.update_gram_message(id, &edit.message)
        .await?
        .ok_or(ServerError::GramByIdNotFound(id))?;

    info!(gram_id = %id, user_id = %user.user_id(), "Updated gram");
    Ok(Redirect::to(ROOT_PATH))
}

async fn destroy_gram(
    GramPath { id }: GramPath,
    State(db): State<Arc<dyn Database>>,
    State(store): State<Arc<dyn ObjectStore>>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    fetch_owned_gram(&*db, id, user).await?;

    let gram = db
        .delete_gram(id)
        .await?
        .ok_or(ServerError::GramByIdNotFound(id))?;

    if let Err(err) = store.delete(gram.picture.key.get()).await {
        warn!(gram_id = %id, error = %err, "Could not remove picture of deleted gram");
    }

    info!(gram_id = %id, user_id = %user.user_id(), "Destroyed gram");
    Ok(Redirect::to(ROOT_PATH))
}
