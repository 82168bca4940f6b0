use crate::{Database, DbError, IdGenerator, Result};
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
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<Id<UserMarker>, User>,
    sessions: HashMap<SessionTokenHash, Session>,
    grams: BTreeMap<Id<GramMarker>, Gram>,
    comments: BTreeMap<Id<CommentMarker>, Comment>,
}

/// A [`Database`] that lives in process memory and is gone on restart.
///
/// Snowflake ids grow with time, so id order is creation order.
#[derive(Debug)]
pub struct MemoryDatabase {
    ids: IdGenerator,
    tables: RwLock<Tables>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            ids: IdGenerator::new(worker_id, process_id),
            tables: RwLock::default(),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let id = self.ids.next().await?;
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|existing| existing.handle == user.handle) {
            return Err(DbError::HandleTaken(user.handle.get().to_owned()));
        }

        let user = User {
            id,
            handle: user.handle.clone(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&session.user) {
            return Err(DbError::MissingReference("user"));
        }

        tables
            .sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(token_hash).cloned())
    }

    async fn fetch_grams(&self) -> Result<Vec<Gram>> {
        Ok(self.tables.read().await.grams.values().rev().cloned().collect())
    }

    async fn fetch_gram(&self, gram_id: Id<GramMarker>) -> Result<Option<Gram>> {
        Ok(self.tables.read().await.grams.get(&gram_id).cloned())
    }

    async fn create_gram(&self, gram: &CreateGram) -> Result<Gram> {
        let id = self.ids.next().await?;
        let mut tables = self.tables.write().await;

        let owner = tables
            .users
            .get(&gram.owner)
            .cloned()
            .ok_or(DbError::MissingReference("user"))?;

        let gram = Gram {
            id,
            owner,
            message: gram.message.clone(),
            picture: gram.picture.clone(),
        };
        tables.grams.insert(id, gram.clone());

        debug!(gram_id = %id, "Inserted gram");
        Ok(gram)
    }

    async fn update_gram_message(
        &self,
        gram_id: Id<GramMarker>,
        message: &str,
    ) -> Result<Option<Gram>> {
        let mut tables = self.tables.write().await;
        let gram = tables.grams.get_mut(&gram_id).map(|gram| {
            message.clone_into(&mut gram.message);
            gram.clone()
        });
        Ok(gram)
    }

    async fn delete_gram(&self, gram_id: Id<GramMarker>) -> Result<Option<Gram>> {
        let mut tables = self.tables.write().await;

        let Some(gram) = tables.grams.remove(&gram_id) else {
            return Ok(None);
        };

        let before = tables.comments.len();
        tables.comments.retain(|_, comment| comment.gram_id != gram_id);

        debug!(%gram_id, comments = before - tables.comments.len(), "Deleted gram");
        Ok(Some(gram))
    }

    async fn fetch_gram_comments(&self, gram_id: Id<GramMarker>) -> Result<Vec<Comment>> {
        Ok(self
            .tables
            .read()
            .await
            .comments
            .values()
            .filter(|comment| comment.gram_id == gram_id)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let id = self.ids.next().await?;
        let mut tables = self.tables.write().await;

        if !tables.grams.contains_key(&comment.gram_id) {
            return Err(DbError::MissingReference("gram"));
        }
        let owner = tables
            .users
            .get(&comment.owner)
            .cloned()
            .ok_or(DbError::MissingReference("user"))?;

        let comment = Comment {
            id,
            gram_id: comment.gram_id,
            owner,
            message: comment.message.clone(),
        };
        tables.comments.insert(id, comment.clone());
        Ok(comment)
    }
}

