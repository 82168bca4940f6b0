//! Module for generating and taking apart snowflake IDs.
//!
//! Layout, from the most significant bit: 42 bits of milliseconds since the
//! [`Epoch`], 5 bits worker id, 5 bits process id, 12 bits increment.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const INCREMENT_BITS: u32 = 12;

const INCREMENT_SHIFT: u32 = 0;
const PROCESS_ID_SHIFT: u32 = INCREMENT_SHIFT + INCREMENT_BITS;
const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimeError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
    #[error("All increments of the current millisecond were used up.")]
    IncrementExhausted,
}

macro_rules! node_part {
    ($name:ident, $bits:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(u8);

        impl $name {
            #[must_use]
            pub fn new(id: u8) -> Option<Self> {
                (u64::from(id) <= mask($bits)).then_some(Self(id))
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = u8::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    D::Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

node_part!(WorkerId, WORKER_ID_BITS);
node_part!(ProcessId, PROCESS_ID_BITS);

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    fn part(self, shift: u32, bits: u32) -> u64 {
        (self.0 >> shift) & mask(bits)
    }

    /// Milliseconds since the epoch.
    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        self.part(TIMESTAMP_SHIFT, TIMESTAMP_BITS)
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        // At most 42 bits, always fits.
        #[allow(clippy::cast_possible_wrap)]
        let millis = self.timestamp_millis() as i64;
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> WorkerId {
        WorkerId(self.part(WORKER_ID_SHIFT, WORKER_ID_BITS) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> ProcessId {
        ProcessId(self.part(PROCESS_ID_SHIFT, PROCESS_ID_BITS) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn increment(self) -> u16 {
        self.part(INCREMENT_SHIFT, INCREMENT_BITS) as u16
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> FromStr for Snowflake<SnowflakeEpoch> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::new)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

fn millis_since_epoch<SnowflakeEpoch: Epoch>(
    time: UtcDateTime,
) -> Result<u64, SnowflakeTimeError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    let millis = u64::try_from(millis).map_err(|_| {
        if millis < 0 {
            SnowflakeTimeError::TimeBeforeEpoch
        } else {
            SnowflakeTimeError::TimestampTooLarge
        }
    })?;

    if millis > mask(TIMESTAMP_BITS) {
        return Err(SnowflakeTimeError::TimestampTooLarge);
    }
    Ok(millis)
}

/// Hands out strictly increasing snowflakes for one worker and process.
///
/// The increment restarts every millisecond. A clock that moves backwards keeps
/// using the latest millisecond seen.
#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_millis: Option<u64>,
    next_increment: u16,
    epoch: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_millis: None,
            next_increment: 0,
            epoch: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimeError> {
        let mut millis = millis_since_epoch::<SnowflakeEpoch>(time)?;

        match self.last_millis {
            Some(last) if millis <= last => millis = last,
            _ => {
                self.last_millis = Some(millis);
                self.next_increment = 0;
            }
        }

        let increment = self.next_increment;
        if u64::from(increment) > mask(INCREMENT_BITS) {
            return Err(SnowflakeTimeError::IncrementExhausted);
        }
        self.next_increment = increment + 1;

        Ok(Snowflake::new(
            millis << TIMESTAMP_SHIFT
                | u64::from(self.worker_id.get()) << WORKER_ID_SHIFT
                | u64::from(self.process_id.get()) << PROCESS_ID_SHIFT
                | u64::from(increment) << INCREMENT_SHIFT,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimeError> {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::{Epoch, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeTimeError, WorkerId};
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-1-1 00:00);
    }

    #[test]
    fn node_ids_are_five_bits() {
        for legal in [0, 0xD, 0x1F] {
            assert!(WorkerId::new(legal).is_some());
            assert!(ProcessId::new(legal).is_some());
        }
        for illegal in [0x20, 0xF0, u8::MAX] {
            assert!(WorkerId::new(illegal).is_none());
            assert!(ProcessId::new(illegal).is_none());
        }
    }

    #[test]
    fn generated_parts_round_trip() {
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();
        let time = utc_datetime!(2025-10-24 10:30);

        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(worker_id, process_id);
        let snowflake = generator.generate_at(time).unwrap();

        assert_eq!(snowflake.created_at(), time);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), 0);

        let next = generator.generate_at(time).unwrap();
        assert_eq!(next.increment(), 1);
        assert!(next > snowflake);
    }

    #[test]
    fn increment_is_exhausted_within_one_millisecond() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            WorkerId::new(0).unwrap(),
            ProcessId::new(0).unwrap(),
        );
        let time = utc_datetime!(2025-10-24 10:55);

        let last = (0..=0xFFF)
            .map(|_| generator.generate_at(time).unwrap())
            .last()
            .unwrap();
        assert_eq!(last.increment(), 0xFFF);
        assert_eq!(
            generator.generate_at(time),
            Err(SnowflakeTimeError::IncrementExhausted)
        );

        let next = generator
            .generate_at(time + Duration::milliseconds(1))
            .unwrap();
        assert_eq!(next.increment(), 0);
        assert!(next > last);
    }

    #[test]
    fn clock_going_backwards_keeps_ids_increasing() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::default();
        let time = utc_datetime!(2025-10-24 10:55);

        let first = generator.generate_at(time).unwrap();
        let second = generator
            .generate_at(time - Duration::seconds(5))
            .unwrap();

        assert!(second > first);
        assert_eq!(second.timestamp_millis(), first.timestamp_millis());
        assert_eq!(second.increment(), 1);
    }

    #[test]
    fn time_outside_timestamp_range() {
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::default();

        assert_eq!(
            generator.generate_at(MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)),
            Err(SnowflakeTimeError::TimeBeforeEpoch)
        );
        assert_eq!(
            generator.generate_at(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimeError::TimestampTooLarge)
        );
        assert!(
            generator
                .generate_at(MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x03FF_FFFF_FFFF))
                .is_ok()
        );
    }

    #[test]
    fn parses_from_path_segments() {
        assert_eq!(
            "1234".parse::<Snowflake<MillennialEpoch>>(),
            Ok(Snowflake::new(1234))
        );
        assert!("tacos".parse::<Snowflake<MillennialEpoch>>().is_err());
    }
}
