pub mod auth;
pub mod comment;
pub mod gram;
pub mod user;
pub mod validation;

use crate::{
    model::{auth::InvalidSessionTokenHashError, user::InvalidUserHandleError},
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData, num::ParseIntError, str::FromStr};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

/// A stored value that no longer satisfies the model's invariants.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserHandle(#[from] InvalidUserHandleError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidSessionTokenHashError),
    #[error("Stored {0} message is blank")]
    BlankMessage(&'static str),
    #[error("Stored picture key is invalid: {0:?}")]
    PictureKey(String),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnapgramEpoch;
impl Epoch for SnapgramEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type SnapgramSnowflake = Snowflake<SnapgramEpoch>;
pub type SnapgramSnowflakeGenerator = SnowflakeGenerator<SnapgramEpoch>;

/// A snowflake id tagged with the kind of entity it identifies.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(SnapgramSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: SnapgramSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> SnapgramSnowflake {
        self.0
    }

    /// The id as stored in a signed `BIGINT` column.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self::new)
    }
}

impl<Marker> From<SnapgramSnowflake> for Id<Marker> {
    fn from(value: SnapgramSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(SnapgramSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

#[cfg(test)]
mod tests {
    use super::{Id, gram::GramMarker};

    #[test]
    fn db_representation_keeps_high_bit() {
        let id = Id::<GramMarker>::from(u64::MAX - 7);
        assert_eq!(id.to_db(), -8);
        assert_eq!(Id::<GramMarker>::from_db(id.to_db()), id);
    }

    #[test]
    fn serializes_as_number() {
        let id = Id::<GramMarker>::from(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(serde_json::from_str::<Id<GramMarker>>("42").unwrap(), id);
    }
}
