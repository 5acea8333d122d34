//! Pickup scheduling values and admin date-range bounds.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when parsing scheduling values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PickupError {
    /// Not a calendar date in a supported format.
    #[error("invalid pickup date: {0}")]
    InvalidDate(String),
    /// Not a wall-clock time in `HH:MM` or `HH:MM:SS` form.
    #[error("invalid pickup time: {0}")]
    InvalidTime(String),
    /// Not a strict `YYYY-MM-DD` date.
    #[error("invalid date format: {0} (expected YYYY-MM-DD)")]
    InvalidBound(String),
}

/// The calendar day a customer will collect their order.
///
/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp, in which case only the
/// date part is kept. Always serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PickupDate(NaiveDate);

impl PickupDate {
    /// Parse a pickup date.
    ///
    /// # Errors
    ///
    /// Returns [`PickupError::InvalidDate`] if the input is neither a date nor
    /// an RFC 3339 timestamp.
    pub fn parse(s: &str) -> Result<Self, PickupError> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self(date));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|ts| Self(ts.date_naive()))
            .map_err(|_| PickupError::InvalidDate(s.to_owned()))
    }

    /// Get the underlying date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for PickupDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for PickupDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for PickupDate {
    type Err = PickupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Time of day for collection, e.g. `14:30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PickupTime(NaiveTime);

impl PickupTime {
    /// Parse `HH:MM` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Returns [`PickupError::InvalidTime`] for anything else.
    pub fn parse(s: &str) -> Result<Self, PickupError> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Self)
            .map_err(|_| PickupError::InvalidTime(s.to_owned()))
    }

    /// Get the underlying time.
    #[must_use]
    pub const fn time(&self) -> NaiveTime {
        self.0
    }
}

impl From<NaiveTime> for PickupTime {
    fn from(time: NaiveTime) -> Self {
        Self(time)
    }
}

impl fmt::Display for PickupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for PickupTime {
    type Err = PickupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One end of an admin date-range filter.
///
/// Only the exact `YYYY-MM-DD` shape is accepted: four-digit year, two-digit
/// month and day, and a real calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateBound(NaiveDate);

impl DateBound {
    /// Parse a strict `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns [`PickupError::InvalidBound`] if the shape or date is wrong.
    pub fn parse(s: &str) -> Result<Self, PickupError> {
        let invalid = || PickupError::InvalidBound(s.to_owned());
        let bytes = s.as_bytes();
        let shape_ok = bytes.len() == 10
            && bytes.iter().enumerate().all(|(i, b)| match i {
                4 | 7 => *b == b'-',
                _ => b.is_ascii_digit(),
            });
        if !shape_ok {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| invalid())
    }

    /// Get the underlying date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for DateBound {
    type Err = PickupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(PickupDate);
string_serde!(PickupTime);
