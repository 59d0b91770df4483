// Chart / history time ranges ("5m", "1h", "7d", ...)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time range: {0:?}")]
pub struct RangeParseError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h", alias = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::FiveMinutes => "5m",
            TimeRange::FifteenMinutes => "15m",
            TimeRange::ThirtyMinutes => "30m",
            TimeRange::OneHour => "1h",
            TimeRange::FourHours => "4h",
            TimeRange::SixHours => "6h",
            TimeRange::EightHours => "8h",
            TimeRange::TwelveHours => "12h",
            TimeRange::OneDay => "24h",
            TimeRange::SevenDays => "7d",
            TimeRange::ThirtyDays => "30d",
            TimeRange::NinetyDays => "90d",
        }
    }

    pub fn duration(&self) -> Duration {
        const MIN: u64 = 60;
        const HOUR: u64 = 60 * MIN;
        const DAY: u64 = 24 * HOUR;
        Duration::from_secs(match self {
            TimeRange::FiveMinutes => 5 * MIN,
            TimeRange::FifteenMinutes => 15 * MIN,
            TimeRange::ThirtyMinutes => 30 * MIN,
            TimeRange::OneHour => HOUR,
            TimeRange::FourHours => 4 * HOUR,
            TimeRange::SixHours => 6 * HOUR,
            TimeRange::EightHours => 8 * HOUR,
            TimeRange::TwelveHours => 12 * HOUR,
            TimeRange::OneDay => DAY,
            TimeRange::SevenDays => 7 * DAY,
            TimeRange::ThirtyDays => 30 * DAY,
            TimeRange::NinetyDays => 90 * DAY,
        })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "5m" => TimeRange::FiveMinutes,
            "15m" => TimeRange::FifteenMinutes,
            "30m" => TimeRange::ThirtyMinutes,
            "1h" => TimeRange::OneHour,
            "4h" => TimeRange::FourHours,
            "6h" => TimeRange::SixHours,
            "8h" => TimeRange::EightHours,
            "12h" => TimeRange::TwelveHours,
            "24h" | "1d" => TimeRange::OneDay,
            "7d" => TimeRange::SevenDays,
            "30d" => TimeRange::ThirtyDays,
            "90d" => TimeRange::NinetyDays,
            other => return Err(RangeParseError(other.to_string())),
        })
    }
}

/// Parse a free-form duration such as "90m", "2h", "3d" or "45s".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = s.split_at(split);
    let n: u64 = num.parse().ok()?;
    let secs = match unit {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86_400)?,
        _ => return None,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}
