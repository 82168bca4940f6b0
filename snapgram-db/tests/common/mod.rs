// Backend-independent assertions for every `Database` method. Each backend has
// its own test file that hands a fresh database to these functions.
//
// Handles carry a per-call suffix so the suites can share one Postgres
// database without truncating between tests.

#![allow(dead_code)]

use snapgram_common::model::{
    Id,
    auth::{Session, SessionToken},
    comment::CreateComment,
    gram::{CreateGram, Gram, Picture, PictureKey},
    user::{CreateUser, User, UserHandle},
};
use snapgram_db::{Database, DbError};
use std::sync::atomic::{AtomicU32, Ordering};
use time::{UtcDateTime, macros::utc_datetime};

static HANDLE_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_handle(prefix: &str) -> UserHandle {
    let nanos = UtcDateTime::now().unix_timestamp_nanos();
    let count = HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed);
    UserHandle::new(format!("{prefix}-{nanos:x}-{count}")).unwrap()
}

async fn user(db: &dyn Database, prefix: &str) -> User {
    db.create_user(&CreateUser {
        handle: unique_handle(prefix),
    })
    .await
    .unwrap()
}

fn new_gram(owner: &User, message: &str) -> CreateGram {
    CreateGram {
        owner: owner.id,
        message: message.into(),
        picture: Picture {
            key: PictureKey::for_upload(owner.id, 0, Some("picture.jpg")),
            content_type: "image/jpeg".into(),
        },
    }
}

fn comment(gram: &Gram, owner: &User, message: &str) -> CreateComment {
    CreateComment {
        gram_id: gram.id,
        owner: owner.id,
        message: message.into(),
    }
}

pub async fn test_handles_are_unique(db: &dyn Database) {
    let taken = user(db, "gramfan").await;

    let result = db
        .create_user(&CreateUser {
            handle: taken.handle.clone(),
        })
        .await;
    assert!(matches!(result, Err(DbError::HandleTaken(handle)) if handle == taken.handle.get()));
}

pub async fn test_sessions_round_trip(db: &dyn Database) {
    let owner = user(db, "owner").await;
    let token = SessionToken::generate(owner.id);
    let session = Session {
        user: owner.id,
        token_hash: token.hash().unwrap(),
        created_at: utc_datetime!(2025-06-01 12:00),
        expires_after: None,
    };
    db.create_session(&session).await.unwrap();

    let fetched = db.fetch_session(&session.token_hash).await.unwrap();
    assert_eq!(fetched, Some(session));

    let unknown = SessionToken::generate(owner.id).hash().unwrap();
    assert!(db.fetch_session(&unknown).await.unwrap().is_none());

    let orphan = Session {
        user: Id::from(1),
        token_hash: unknown,
        created_at: utc_datetime!(2025-06-01 12:00),
        expires_after: None,
    };
    assert!(matches!(
        db.create_session(&orphan).await,
        Err(DbError::MissingReference("user"))
    ));
}

pub async fn test_grams_are_listed_newest_first(db: &dyn Database) {
    let owner = user(db, "owner").await;

    let first = db.create_gram(&new_gram(&owner, "first")).await.unwrap();
    let second = db.create_gram(&new_gram(&owner, "second")).await.unwrap();
    assert_eq!(first.owner, owner);
    assert_eq!(second.picture.content_type, "image/jpeg");

    let listed: Vec<Gram> = db
        .fetch_grams()
        .await
        .unwrap()
        .into_iter()
        .filter(|gram| gram.owner.id == owner.id)
        .collect();
    assert_eq!(listed, [second, first.clone()]);
    assert_eq!(db.fetch_gram(first.id).await.unwrap(), Some(first));
    assert!(db.fetch_gram(Id::from(1)).await.unwrap().is_none());
}

pub async fn test_gram_for_missing_owner_is_rejected(db: &dyn Database) {
    let ghost = User {
        id: Id::from(1),
        handle: unique_handle("ghost"),
    };

    assert!(matches!(
        db.create_gram(&new_gram(&ghost, "boo")).await,
        Err(DbError::MissingReference("user"))
    ));
}

pub async fn test_update_gram_message(db: &dyn Database) {
    let owner = user(db, "owner").await;
    let gram = db.create_gram(&new_gram(&owner, "initial Value")).await.unwrap();

    let updated = db.update_gram_message(gram.id, "changed").await.unwrap();
    assert_eq!(
        updated,
        Some(Gram {
            message: "changed".into(),
            ..gram.clone()
        })
    );
    assert_eq!(db.fetch_gram(gram.id).await.unwrap().unwrap().message, "changed");
    assert!(
        db.update_gram_message(Id::from(1), "changed")
            .await
            .unwrap()
            .is_none()
    );
}

pub async fn test_delete_cascades_to_comments(db: &dyn Database) {
    let owner = user(db, "owner").await;
    let commenter = user(db, "commenter").await;
    let kept = db.create_gram(&new_gram(&owner, "kept")).await.unwrap();
    let doomed = db.create_gram(&new_gram(&owner, "doomed")).await.unwrap();

    for gram in [&kept, &doomed] {
        db.create_comment(&comment(gram, &commenter, "nice"))
            .await
            .unwrap();
    }

    let deleted = db.delete_gram(doomed.id).await.unwrap();
    assert_eq!(deleted, Some(doomed.clone()));
    assert!(db.fetch_gram(doomed.id).await.unwrap().is_none());
    assert!(db.fetch_gram_comments(doomed.id).await.unwrap().is_empty());
    assert_eq!(db.fetch_gram_comments(kept.id).await.unwrap().len(), 1);
    assert!(db.delete_gram(doomed.id).await.unwrap().is_none());
}

pub async fn test_comments_are_oldest_first(db: &dyn Database) {
    let owner = user(db, "owner").await;
    let commenter = user(db, "commenter").await;
    let gram = db.create_gram(&new_gram(&owner, "hello!")).await.unwrap();

    let first = db
        .create_comment(&comment(&gram, &commenter, "first!"))
        .await
        .unwrap();
    let second = db
        .create_comment(&comment(&gram, &owner, "thanks"))
        .await
        .unwrap();
    assert_eq!(first.owner, commenter);
    assert_eq!(first.gram_id, gram.id);

    let comments = db.fetch_gram_comments(gram.id).await.unwrap();
    assert_eq!(comments, [first, second]);
}

pub async fn test_comments_need_an_existing_gram(db: &dyn Database) {
    let commenter = user(db, "commenter").await;

    let result = db
        .create_comment(&CreateComment {
            gram_id: Id::from(12345),
            owner: commenter.id,
            message: "hello?".into(),
        })
        .await;
    assert!(matches!(result, Err(DbError::MissingReference("gram"))));
}
