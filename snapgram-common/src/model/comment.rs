use crate::model::{
    Id,
    gram::GramMarker,
    user::{User, UserMarker},
    validation::{ValidationErrors, Validator},
};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub gram_id: Id<GramMarker>,
    pub owner: User,
    pub message: String,
}

/// Body of a new comment, before validation.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct CommentSubmission {
    #[serde(default)]
    pub message: String,
}

impl CommentSubmission {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .presence("message", Some(&self.message))
            .finish()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateComment {
    pub gram_id: Id<GramMarker>,
    pub owner: Id<UserMarker>,
    pub message: String,
}
