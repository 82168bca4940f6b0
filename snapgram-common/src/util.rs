use serde::{Deserialize, Deserializer, de::Error as _};
use thiserror::Error;
use time::Duration;

/// A strictly positive [`Duration`], used for session lifetimes.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    #[must_use]
    pub fn from_seconds(seconds: i64) -> Option<Self> {
        Self::new(Duration::seconds(seconds))
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn whole_seconds(&self) -> i64 {
        self.0.whole_seconds()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

/// Deserializes from a number of seconds.
impl<'de> Deserialize<'de> for PositiveDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = i64::deserialize(deserializer)?;
        Self::from_seconds(seconds)
            .ok_or_else(|| D::Error::custom(format!("{seconds} is not a positive number of seconds")))
    }
}
