//! Core data types shared across the session layer.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The four presentation modes of the dashboard. Exactly one is active at a
/// time; switching is driven by [`crate::session::SessionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Current,
    Forecast,
    Historical,
    Marine,
}

impl View {
    pub const ALL: [View; 4] = [View::Current, View::Forecast, View::Historical, View::Marine];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            View::Current => "current",
            View::Forecast => "forecast",
            View::Historical => "historical",
            View::Marine => "marine",
        }
    }

    /// Mode flag appended to the provider request. Marine data comes from the
    /// forecast endpoint, so both views share the same flag.
    #[must_use]
    pub(crate) fn mode_param(self) -> Option<&'static str> {
        match self {
            View::Current => None,
            View::Forecast | View::Marine => Some("forecast=1"),
            View::Historical => Some("historical_data=1"),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Location identity the provider reports alongside every snapshot. The
/// provider sends coordinates as strings, so parsing is lenient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLocation {
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(deserialize_with = "f64_lenient")]
    pub lat: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub lon: f64,
}

impl SnapshotLocation {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.lat,
            longitude: self.lon,
        }
    }
}

/// One fetched provider payload for a (view, query) pair. Measurement fields
/// are passed through untouched; the session core only reads the location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: SnapshotLocation,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
