use crate::{
    Database, DbError, IdGenerator, Result,
    record::{CommentRecord, GramRecord, SessionRecord},
};
use async_trait::async_trait;
use snapgram_common::{
    model::{
        Id,
        auth::{Session, SessionTokenHash},
        comment::{Comment, CommentMarker, CreateComment},
        gram::{CreateGram, Gram, GramMarker},
        user::{CreateUser, User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as};
use time::PrimitiveDateTime;
use tracing::{debug, info};

const GRAM_COLUMNS: &str = "
    grams.gram_snowflake,
    grams.message,
    grams.picture_key,
    grams.picture_content_type,
    users.user_snowflake,
    users.handle
";

/// Postgres-backed [`Database`].
pub struct DbClient {
    pool: PgPool,
    ids: IdGenerator,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            pool,
            ids: IdGenerator::new(worker_id, process_id),
        }
    }

    /// Connects to `url` and brings the schema up to date.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");

        Ok(Self::new(pool, worker_id, process_id))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|err| err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|err| err.is_foreign_key_violation())
}

#[async_trait]
impl Database for DbClient {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user_id: Id<UserMarker> = self.ids.next().await?;

        query(
            "
            INSERT INTO users.users (user_snowflake, handle)
            VALUES ($1, $2)
            ",
        )
        .bind(user_id.to_db())
        .bind(user.handle.get())
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                DbError::HandleTaken(user.handle.get().to_owned())
            } else {
                err.into()
            }
        })?;

        Ok(User {
            id: user_id,
            handle: user.handle.clone(),
        })
    }

    async fn create_session(&self, session: &Session) -> Result<()> {
        let created_at = PrimitiveDateTime::new(session.created_at.date(), session.created_at.time());

        query(
            "
            INSERT INTO users.sessions (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(session.token_hash.as_bytes())
        .bind(session.user.to_db())
        .bind(created_at)
        .bind(session.expires_after.map(|lifetime| lifetime.whole_seconds()))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                DbError::MissingReference("user")
            } else {
                err.into()
            }
        })?;

        Ok(())
    }

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT
                sessions.user_snowflake,
                sessions.token_hash,
                sessions.created_at,
                sessions.expires_after_seconds
            FROM
                users.sessions
            WHERE
                sessions.token_hash = $1
            ",
        )
        .bind(token_hash.as_bytes())
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }

    async fn fetch_grams(&self) -> Result<Vec<Gram>> {
        let records = query_as::<_, GramRecord>(&format!(
            "
            SELECT {GRAM_COLUMNS}
            FROM
                grams.grams JOIN users.users USING (user_snowflake)
            ORDER BY
                grams.gram_snowflake DESC
            "
        ))
        .fetch_all(&self.pool)
        .await?;

        let grams = records
            .into_iter()
            .map(Gram::try_from)
            .collect::<Result<_, _>>()?;
        Ok(grams)
    }

    async fn fetch_gram(&self, gram_id: Id<GramMarker>) -> Result<Option<Gram>> {
        let record = query_as::<_, GramRecord>(&format!(
            "
            SELECT {GRAM_COLUMNS}
            FROM
                grams.grams JOIN users.users USING (user_snowflake)
            WHERE
                grams.gram_snowflake = $1
            "
        ))
        .bind(gram_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let gram = record.map(Gram::try_from).transpose()?;
        Ok(gram)
    }

    async fn create_gram(&self, gram: &CreateGram) -> Result<Gram> {
        let gram_id: Id<GramMarker> = self.ids.next().await?;

        let record = query_as::<_, GramRecord>(&format!(
            "
            WITH grams AS (
                INSERT INTO grams.grams
                    (gram_snowflake, user_snowflake, message, picture_key, picture_content_type)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            )
            SELECT {GRAM_COLUMNS}
            FROM
                grams JOIN users.users USING (user_snowflake)
            "
        ))
        .bind(gram_id.to_db())
        .bind(gram.owner.to_db())
        .bind(&gram.message)
        .bind(gram.picture.key.get())
        .bind(&gram.picture.content_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                DbError::MissingReference("user")
            } else {
                err.into()
            }
        })?;

        debug!(%gram_id, "Inserted gram");
        Ok(record.try_into()?)
    }

    async fn update_gram_message(
        &self,
        gram_id: Id<GramMarker>,
        message: &str,
    ) -> Result<Option<Gram>> {
        let record = query_as::<_, GramRecord>(&format!(
            "
            WITH grams AS (
                UPDATE grams.grams
                SET message = $2
                WHERE gram_snowflake = $1
                RETURNING *
            )
            SELECT {GRAM_COLUMNS}
            FROM
                grams JOIN users.users USING (user_snowflake)
            "
        ))
        .bind(gram_id.to_db())
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;

        let gram = record.map(Gram::try_from).transpose()?;
        Ok(gram)
    }

    async fn delete_gram(&self, gram_id: Id<GramMarker>) -> Result<Option<Gram>> {
        let mut transaction = self.pool.begin().await?;

        let comments = query("DELETE FROM grams.comments WHERE gram_snowflake = $1")
            .bind(gram_id.to_db())
            .execute(&mut *transaction)
            .await?
            .rows_affected();

        let record = query_as::<_, GramRecord>(&format!(
            "
            WITH grams AS (
                DELETE FROM grams.grams
                WHERE gram_snowflake = $1
                RETURNING *
            )
            SELECT {GRAM_COLUMNS}
            FROM
                grams JOIN users.users USING (user_snowflake)
            "
        ))
        .bind(gram_id.to_db())
        .fetch_optional(&mut *transaction)
        .await?;

        transaction.commit().await?;

        debug!(%gram_id, comments, "Deleted gram");
        let gram = record.map(Gram::try_from).transpose()?;
        Ok(gram)
    }

    async fn fetch_gram_comments(&self, gram_id: Id<GramMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_snowflake,
                comments.gram_snowflake,
                comments.message,
                users.user_snowflake,
                users.handle
            FROM
                grams.comments JOIN users.users USING (user_snowflake)
            WHERE
                comments.gram_snowflake = $1
            ORDER BY
                comments.comment_snowflake ASC
            ",
        )
        .bind(gram_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let comment_id: Id<CommentMarker> = self.ids.next().await?;

        let record = query_as::<_, CommentRecord>(
            "
            WITH comments AS (
                INSERT INTO grams.comments
                    (comment_snowflake, gram_snowflake, user_snowflake, message)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            SELECT
                comments.comment_snowflake,
                comments.gram_snowflake,
                comments.message,
                users.user_snowflake,
                users.handle
            FROM
                comments JOIN users.users USING (user_snowflake)
            ",
        )
        .bind(comment_id.to_db())
        .bind(comment.gram_id.to_db())
        .bind(comment.owner.to_db())
        .bind(&comment.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                DbError::MissingReference("gram")
            } else {
                err.into()
            }
        })?;

        Ok(record.try_into()?)
    }
}
