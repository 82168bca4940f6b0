pub mod client;
pub mod memory;
mod record;

use async_trait::async_trait;
use snapgram_common::{
    model::{
        Id, ModelValidationError, SnapgramSnowflakeGenerator,
        auth::{Session, SessionTokenHash},
        comment::{Comment, CreateComment},
        gram::{CreateGram, Gram, GramMarker},
        user::{CreateUser, User},
    },
    snowflake::{ProcessId, SnowflakeTimeError, WorkerId},
};
use thiserror::Error;
use tokio::sync::Mutex;

pub use client::DbClient;
pub use memory::MemoryDatabase;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    IdGeneration(#[from] SnowflakeTimeError),
    #[error("The handle {0:?} is already taken")]
    HandleTaken(String),
    #[error("The referenced {0} does not exist")]
    MissingReference(&'static str),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for users, sessions, grams and comments.
#[async_trait]
pub trait Database: Send + Sync {
    /// Fails with [`DbError::HandleTaken`] if the handle is in use.
    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn create_session(&self, session: &Session) -> Result<()>;

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>>;

    /// All grams, newest first.
    async fn fetch_grams(&self) -> Result<Vec<Gram>>;

    async fn fetch_gram(&self, gram_id: Id<GramMarker>) -> Result<Option<Gram>>;

    async fn create_gram(&self, gram: &CreateGram) -> Result<Gram>;

    /// Returns `None` if the gram does not exist.
    async fn update_gram_message(
        &self,
        gram_id: Id<GramMarker>,
        message: &str,
    ) -> Result<Option<Gram>>;

    /// Deletes a gram together with its comments and returns what was deleted.
    async fn delete_gram(&self, gram_id: Id<GramMarker>) -> Result<Option<Gram>>;

    /// Comments on a gram, oldest first.
    async fn fetch_gram_comments(&self, gram_id: Id<GramMarker>) -> Result<Vec<Comment>>;

    /// Fails with [`DbError::MissingReference`] if the gram is gone.
    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment>;
}

/// Hands out snowflake ids for new rows.
#[derive(Debug)]
pub struct IdGenerator(Mutex<SnapgramSnowflakeGenerator>);

impl IdGenerator {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self(Mutex::new(SnapgramSnowflakeGenerator::new(
            worker_id, process_id,
        )))
    }

    pub async fn next<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self.0.lock().await.generate()?;
        Ok(snowflake.into())
    }
}
