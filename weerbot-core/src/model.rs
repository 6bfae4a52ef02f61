use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::severity::Severity;

/// Which report template a run renders and which recipient list it goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Summary,
    Details,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Summary => "summary",
            ReportKind::Details => "details",
        }
    }

    pub const fn all() -> &'static [ReportKind] {
        &[ReportKind::Summary, ReportKind::Details]
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown report kind '{0}'. Supported kinds: summary, details.")]
pub struct UnknownReportKind(pub String);

impl FromStr for ReportKind {
    type Err = UnknownReportKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "summary" => Ok(ReportKind::Summary),
            "details" | "detail" => Ok(ReportKind::Details),
            _ => Err(UnknownReportKind(value.to_string())),
        }
    }
}

/// Telegram chat identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChatId)
    }
}

/// Latitude/longitude pair, written as `"lat,lon"` in configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl FromStr for Coordinates {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected \"lat,lon\", got \"{s}\""))?;

        let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude \"{lat}\""))?;
        let lon: f64 = lon.trim().parse().map_err(|_| format!("invalid longitude \"{lon}\""))?;

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(format!("coordinates out of range: {lat},{lon}"));
        }

        Ok(Coordinates { lat, lon })
    }
}

/// Forecast for a single day as reported by the weather API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayForecast {
    pub icon: String,
    pub max_temp: String,
    pub min_temp: String,
    pub rain_chance: String,
    pub sun_chance: String,
}

/// One complete observation from the weather API.
///
/// Values are kept exactly as the API rendered them; the reports print them
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub timestamp: String,
    pub temperature: String,
    pub feels_like: String,
    pub summary: String,
    pub humidity: String,
    pub wind_direction: String,
    pub wind_speed_kmh: String,
    pub expectation: String,
    pub sunrise: String,
    pub sunset: String,
    pub image: String,
    pub today: DayForecast,
    pub tomorrow: DayForecast,
    pub alarm_text: String,
}

/// A parsed snapshot together with the raw payload it came from.
#[derive(Debug, Clone)]
pub struct FetchedWeather {
    pub snapshot: WeatherSnapshot,
    pub raw: serde_json::Value,
}

/// Explicit failure result handed to the operator instead of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{}: {}", self.error, self.message))
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Offset used to present the time of maximum UV (fixed UTC+1, no DST).
const UV_TIME_OFFSET_HOURS: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct UvReading {
    pub uv: f64,
    pub uv_max: f64,
    pub uv_max_time: DateTime<Utc>,
    /// Minutes of safe exposure for skin type 1. Absent when the sun is down.
    pub safe_exposure_minutes: Option<f64>,
    pub severity: Severity,
    pub max_severity: Severity,
}

impl UvReading {
    pub fn new(
        uv: f64,
        uv_max: f64,
        uv_max_time: DateTime<Utc>,
        safe_exposure_minutes: Option<f64>,
    ) -> Self {
        Self {
            uv,
            uv_max,
            uv_max_time,
            safe_exposure_minutes,
            severity: Severity::classify(uv),
            max_severity: Severity::classify(uv_max),
        }
    }

    /// Time of maximum UV as `HH:MM` in UTC+1.
    pub fn uv_max_time_local(&self) -> String {
        (self.uv_max_time + TimeDelta::hours(UV_TIME_OFFSET_HOURS))
            .format("%H:%M")
            .to_string()
    }
}
