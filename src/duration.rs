//! Human-readable durations for configuration structs.
//!
//! A [`ConfigDuration`] is written as `"<amount> <unit>"`, for example
//! `"30 seconds"` or `"1 days"`, and deserializes straight from a resolved
//! config:
//!
//! ```
//! use dragon_conf::ConfigDuration;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Pool {
//!     max_wait: ConfigDuration,
//! }
//!
//! let pool: Pool = serde_json::from_str(r#"{"max_wait": "1500 millis"}"#)?;
//! assert_eq!(Duration::from(pool.max_wait), Duration::from_millis(1500));
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Units accepted in a [`ConfigDuration`], case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Nanos,
    Micros,
    Millis,
    Seconds,
    Minutes,
    Hours,
    HalfDays,
    Days,
}

impl DurationUnit {
    pub const ALL: [DurationUnit; 8] = [
        DurationUnit::Nanos,
        DurationUnit::Micros,
        DurationUnit::Millis,
        DurationUnit::Seconds,
        DurationUnit::Minutes,
        DurationUnit::Hours,
        DurationUnit::HalfDays,
        DurationUnit::Days,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DurationUnit::Nanos => "NANOS",
            DurationUnit::Micros => "MICROS",
            DurationUnit::Millis => "MILLIS",
            DurationUnit::Seconds => "SECONDS",
            DurationUnit::Minutes => "MINUTES",
            DurationUnit::Hours => "HOURS",
            DurationUnit::HalfDays => "HALF_DAYS",
            DurationUnit::Days => "DAYS",
        }
    }

    /// `amount` of this unit, or `None` if it does not fit in a [`Duration`].
    pub fn duration(self, amount: u64) -> Option<Duration> {
        let seconds_per = match self {
            DurationUnit::Nanos => return Some(Duration::from_nanos(amount)),
            DurationUnit::Micros => return Some(Duration::from_micros(amount)),
            DurationUnit::Millis => return Some(Duration::from_millis(amount)),
            DurationUnit::Seconds => 1,
            DurationUnit::Minutes => 60,
            DurationUnit::Hours => 60 * 60,
            DurationUnit::HalfDays => 12 * 60 * 60,
            DurationUnit::Days => 24 * 60 * 60,
        };
        amount.checked_mul(seconds_per).map(Duration::from_secs)
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DurationUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DurationUnit::ALL
            .into_iter()
            .find(|unit| unit.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to convert \"{input}\" to a duration because {reason}. String must be on the form \"<amount> <unit>\", where the unit is one of {} (case-insensitive)", supported_units())]
pub struct DurationError {
    pub input: String,
    pub reason: String,
}

fn supported_units() -> String {
    DurationUnit::ALL
        .iter()
        .map(|unit| unit.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A span of time written as `"<amount> <unit>"`.
///
/// Two durations are equal when they span the same time, so `"1 days"` equals
/// `"24 hours"`. The string form keeps the unit it was written with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigDuration {
    amount: u64,
    unit: DurationUnit,
    duration: Duration,
}

impl ConfigDuration {
    pub fn new(amount: u64, unit: DurationUnit) -> Option<Self> {
        let duration = unit.duration(amount)?;
        Some(Self {
            amount,
            unit,
            duration,
        })
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> DurationUnit {
        self.unit
    }

    pub fn as_duration(&self) -> Duration {
        self.duration
    }
}

impl FromStr for ConfigDuration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: &str| DurationError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.split_whitespace();
        let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(error("it is not an amount followed by a unit"));
        };

        let amount: u64 = amount
            .parse()
            .map_err(|e| error(&format!("'{amount}' is not a non-negative whole number: {e}")))?;
        let unit: DurationUnit = unit
            .parse()
            .map_err(|()| error(&format!("'{unit}' is not a supported unit")))?;

        Self::new(amount, unit).ok_or_else(|| error("the duration is too large"))
    }
}

impl TryFrom<String> for ConfigDuration {
    type Error = DurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ConfigDuration> for String {
    fn from(d: ConfigDuration) -> Self {
        d.to_string()
    }
}

impl From<ConfigDuration> for Duration {
    fn from(d: ConfigDuration) -> Self {
        d.duration
    }
}

impl fmt::Display for ConfigDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

impl PartialEq for ConfigDuration {
    fn eq(&self, other: &Self) -> bool {
        self.duration == other.duration
    }
}

impl Eq for ConfigDuration {}

impl Hash for ConfigDuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.duration.hash(state);
    }
}

impl PartialOrd for ConfigDuration {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConfigDuration {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.duration.cmp(&other.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn parse(s: &str) -> ConfigDuration {
        s.parse().unwrap()
    }

    fn hash_of(d: &ConfigDuration) -> u64 {
        let mut hasher = DefaultHasher::new();
        d.hash(&mut hasher);
        hasher.finish()
    }

    fn unit_strategy() -> impl Strategy<Value = DurationUnit> {
        proptest::sample::select(DurationUnit::ALL.to_vec())
    }

    #[test]
    fn test_equal_when_spans_are_equal() {
        assert_eq!(parse("1 days"), parse("24 hours"));
        assert_eq!(parse("24 hours"), parse("1440 minutes"));
        assert_eq!(parse("2 half_days"), parse("1 days"));
        assert_eq!(hash_of(&parse("1 days")), hash_of(&parse("1440 minutes")));

        assert_ne!(parse("4 days"), parse("5 days"));
        assert_ne!(parse("4 days"), parse("1337 nanos"));
    }

    #[test]
    fn test_display_keeps_written_unit() {
        assert_eq!(parse("42 minutes").to_string(), "42 MINUTES");
        assert_eq!(parse("1 Half_Days").to_string(), "1 HALF_DAYS");
        assert_eq!(parse("  7\tseconds ").to_string(), "7 SECONDS");
    }

    #[test]
    fn test_serde_uses_string_form() {
        let d: ConfigDuration = serde_json::from_str(r#""1 seconds""#).unwrap();
        assert_eq!(Duration::from(d), Duration::from_secs(1));
        assert_eq!(serde_json::to_string(&d).unwrap(), r#""1 SECONDS""#);

        let err = serde_json::from_str::<ConfigDuration>(r#""1 fortnights""#).unwrap_err();
        assert!(err.to_string().contains("'fortnights' is not a supported unit"));
    }

    #[test]
    fn test_rejects_malformed_strings() {
        for input in ["", "seconds", "10", "10seconds", "1.5 seconds", "-1 seconds", "1 2 seconds", "1 weeks"] {
            let err = input.parse::<ConfigDuration>().unwrap_err();
            assert_eq!(err.input, input);
            assert!(err.to_string().contains("NANOS, MICROS, MILLIS, SECONDS, MINUTES, HOURS, HALF_DAYS, DAYS"));
        }
    }

    #[test]
    fn test_rejects_overflow() {
        let err = format!("{} days", u64::MAX).parse::<ConfigDuration>().unwrap_err();
        assert!(err.reason.contains("too large"));
    }

    proptest! {
        #[test]
        fn test_parses_every_unit(amount in 0u64..1_000_000, unit in unit_strategy()) {
            let parsed = parse(&format!("{amount} {}", unit.name().to_lowercase()));
            prop_assert_eq!(parsed.as_duration(), unit.duration(amount).unwrap());
            prop_assert_eq!(parsed.amount(), amount);
            prop_assert_eq!(parsed.unit(), unit);
        }

        #[test]
        fn test_string_form_parses_back(amount in 0u64..1_000_000, unit in unit_strategy()) {
            let original = ConfigDuration::new(amount, unit).unwrap();
            let reparsed = parse(&original.to_string());
            prop_assert_eq!(reparsed, original);
            prop_assert_eq!(reparsed.unit(), unit);
        }

        #[test]
        fn test_unparseable_strings(s in "[^0-9]*") {
            prop_assert!(s.parse::<ConfigDuration>().is_err());
        }
    }
}
