use crate::{Error, Result};
use chrono::{NaiveDateTime, NaiveTime};
use std::fmt;

/// When to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSpec {
    /// Today at this time; already past means start immediately.
    TimeOfDay(NaiveTime),
    /// A specific local date and time.
    At(NaiveDateTime),
}

impl WaitSpec {
    /// Parse `HH:MM` or `YYYY-MM-DD HH:MM`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let parsed = if spec.contains(' ') {
            NaiveDateTime::parse_from_str(spec, "%Y-%m-%d %H:%M").map(WaitSpec::At)
        } else {
            NaiveTime::parse_from_str(spec, "%H:%M").map(WaitSpec::TimeOfDay)
        };
        parsed.map_err(|_| {
            Error::Config(format!(
                "run.wait_until_time '{}' is malformed: use HH:MM (e.g. 09:59) or YYYY-MM-DD HH:MM (e.g. 2025-11-01 00:00)",
                spec
            ))
        })
    }

    /// Local deadline for a run starting at `now`, or `None` when it is already due.
    pub fn deadline(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let target = match *self {
            WaitSpec::TimeOfDay(t) => now.date().and_time(t),
            WaitSpec::At(at) => at,
        };
        (target > now).then_some(target)
    }
}

impl fmt::Display for WaitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitSpec::TimeOfDay(t) => write!(f, "{}", t.format("%H:%M")),
            WaitSpec::At(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M")),
        }
    }
}
