//! Time-of-day values as written on feeding schedules (`h:mm a`).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;

use crate::error::Error;

const PARSE_FORMAT: &str = "%I:%M %p";
const DISPLAY_FORMAT: &str = "%-I:%M %p";

/// A feeding time on the 12-hour clock, ordered chronologically from
/// `12:00 AM` to `11:59 PM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeedingTime(NaiveTime);

impl FeedingTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }
}

impl FromStr for FeedingTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::Validation("feeding time is empty".to_owned()));
        }
        let (clock, _) = raw
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::Validation(format!("feeding time '{raw}' has no AM/PM marker")))?;
        let well_formed = clock
            .split_once(':')
            .is_some_and(|(h, m)| (1..=2).contains(&h.len()) && m.len() == 2);
        if !well_formed {
            return Err(Error::Validation(format!(
                "feeding time '{raw}' is not in h:mm AM/PM form"
            )));
        }
        NaiveTime::parse_from_str(raw, PARSE_FORMAT)
            .map(Self)
            .map_err(|e| Error::Validation(format!("feeding time '{raw}' is not valid: {e}")))
    }
}

impl fmt::Display for FeedingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DISPLAY_FORMAT))
    }
}
