use snapgram_common::model::{
    Id, ModelValidationError,
    auth::Session,
    comment::Comment,
    gram::{Gram, Picture},
    user::{User, UserHandle},
    validation::is_blank,
};
use sqlx::FromRow;
use time::{Duration, PrimitiveDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct GramRecord {
    pub gram_snowflake: i64,
    pub message: String,
    pub picture_key: String,
    pub picture_content_type: String,
    pub user_snowflake: i64,
    pub handle: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_snowflake: i64,
    pub gram_snowflake: i64,
    pub message: String,
    pub user_snowflake: i64,
    pub handle: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct SessionRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<GramRecord> for Gram {
    type Error = ModelValidationError;

    fn try_from(value: GramRecord) -> Result<Self, Self::Error> {
        if is_blank(&value.message) {
            return Err(ModelValidationError::BlankMessage("gram"));
        }

        Ok(Self {
            id: Id::from_db(value.gram_snowflake),
            owner: User {
                id: Id::from_db(value.user_snowflake),
                handle: UserHandle::new(value.handle)?,
            },
            message: value.message,
            picture: Picture {
                key: value.picture_key.try_into()?,
                content_type: value.picture_content_type,
            },
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_snowflake),
            gram_id: Id::from_db(value.gram_snowflake),
            owner: User {
                id: Id::from_db(value.user_snowflake),
                handle: UserHandle::new(value.handle)?,
            },
            message: value.message,
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
