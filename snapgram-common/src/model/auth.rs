//! Bearer session tokens.
//!
//! A token reads `<user id>:<base64 core>:<base64 salt>`. Only the argon2 hash
//! of the core, salted with the salt, is ever persisted.

use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const SESSION_TOKEN_CORE_LEN: usize = 24;
pub const SESSION_TOKEN_SALT_LEN: usize = 18;
pub const SESSION_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing session token failed: {0}")]
pub struct SessionTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The core part must be {SESSION_TOKEN_CORE_LEN} bytes")]
    InvalidCoreLength,
    #[error("The salt part must be {SESSION_TOKEN_SALT_LEN} bytes")]
    InvalidSaltLength,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionToken {
    pub user_id: Id<UserMarker>,
    core: [u8; SESSION_TOKEN_CORE_LEN],
    salt: [u8; SESSION_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionTokenHash(Box<[u8; SESSION_TOKEN_HASH_LEN]>);

/// A stored session, as looked up by token hash.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub user: Id<UserMarker>,
    pub token_hash: SessionTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Session {
    /// A lifetime reaching past the representable range never expires.
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after.is_some_and(|lifetime| {
            self.created_at
                .checked_add(lifetime.get())
                .is_some_and(|end| end < now)
        })
    }
}

impl SessionToken {
    #[must_use]
    pub fn generate(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            core: rand::random(),
            salt: rand::random(),
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        format!(
            "{}:{}:{}",
            self.user_id,
            Base64Display::new(&self.core, &BASE64_STANDARD),
            Base64Display::new(&self.salt, &BASE64_STANDARD),
        )
    }

    pub fn hash(&self) -> Result<SessionTokenHash, SessionTokenHashError> {
        let mut hash = Box::new([0; SESSION_TOKEN_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(SessionTokenHashError)?;

        Ok(SessionTokenHash(hash))
    }
}

impl FromStr for SessionToken {
    type Err = SessionTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_id, rest) = s.split_once(':').ok_or(Self::Err::NotEnoughParts)?;
        let (core, salt) = rest.split_once(':').ok_or(Self::Err::NotEnoughParts)?;

        Ok(Self {
            user_id: user_id.parse().map_err(Self::Err::InvalidUserId)?,
            core: BASE64_STANDARD
                .decode(core)?
                .try_into()
                .map_err(|_| Self::Err::InvalidCoreLength)?,
            salt: BASE64_STANDARD
                .decode(salt)?
                .try_into()
                .map_err(|_| Self::Err::InvalidSaltLength)?,
        })
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SessionTokenHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl Debug for SessionTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The session token hash had an invalid length")]
pub struct InvalidSessionTokenHashError;

impl TryFrom<Vec<u8>> for SessionTokenHash {
    type Error = InvalidSessionTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let bytes: [u8; SESSION_TOKEN_HASH_LEN] =
            value.try_into().map_err(|_| InvalidSessionTokenHashError)?;
        Ok(Self(Box::new(bytes)))
    }
}
