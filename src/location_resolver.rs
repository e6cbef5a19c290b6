//! Three-tier location resolution.
//!
//! Resolves the user's location through device positioning, network-address
//! lookup, and a fixed default, in that priority order. Every tier is
//! time-bounded and every failure is absorbed: `resolve` always produces a
//! location, so callers never handle an error from this path.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::config::LocationConfig;
use crate::models::Coordinates;

/// Fallback when every detection tier fails.
pub const DEFAULT_LOCATION_NAME: &str = "London";
pub const DEFAULT_COORDINATES: Coordinates = Coordinates {
    latitude: 51.5073,
    longitude: -0.1276,
};

/// Label used when device coordinates resolve but reverse geocoding cannot
/// name them.
pub const GENERIC_LOCATION_LABEL: &str = "Current Location";

/// How a location was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    Device,
    Network,
    Default,
}

/// A resolved location, always populated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub name: String,
    pub coordinates: Coordinates,
    pub method: ResolutionMethod,
}

/// Platform seam for device-reported coordinates.
#[async_trait]
pub trait DevicePositionSource: Send + Sync {
    /// Current device coordinates, or an error when the capability is
    /// unsupported, refused, or unable to produce a fix.
    async fn current_position(&self) -> anyhow::Result<Coordinates>;
}

/// Bundled source for environments without a positioning capability.
#[derive(Debug, Default)]
pub struct NoDevicePosition;

#[async_trait]
impl DevicePositionSource for NoDevicePosition {
    async fn current_position(&self) -> anyhow::Result<Coordinates> {
        Err(anyhow::anyhow!("device positioning unavailable"))
    }
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    #[serde(default)]
    address: ReverseGeocodeAddress,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReverseGeocodeAddress {
    city: Option<String>,
    county: Option<String>,
    state: Option<String>,
}

impl ReverseGeocodeResponse {
    /// First non-empty of city, county, state, then the top-level name.
    fn place_name(&self) -> Option<String> {
        [
            &self.address.city,
            &self.address.county,
            &self.address.state,
            &self.name,
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .cloned()
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Service resolving the user's location through the three detection tiers.
pub struct LocationResolver {
    client: Client,
    device: Arc<dyn DevicePositionSource>,
    config: LocationConfig,
}

impl LocationResolver {
    #[must_use]
    pub fn new(
        client: Client,
        device: Arc<dyn DevicePositionSource>,
        config: LocationConfig,
    ) -> Self {
        Self {
            client,
            device,
            config,
        }
    }

    /// Resolve a location. Never fails: device position, then network
    /// lookup, then the fixed default.
    pub async fn resolve(&self) -> ResolvedLocation {
        if let Some(resolved) = self.try_device().await {
            debug!(name = %resolved.name, "location detected via device positioning");
            return resolved;
        }

        if let Some(resolved) = self.try_network().await {
            debug!(name = %resolved.name, "location detected via network address");
            return resolved;
        }

        debug!("location detection failed, using {DEFAULT_LOCATION_NAME} as default");
        ResolvedLocation {
            name: DEFAULT_LOCATION_NAME.to_string(),
            coordinates: DEFAULT_COORDINATES,
            method: ResolutionMethod::Default,
        }
    }

    /// Time-bounded device position sample, absorbed to `None` on refusal,
    /// timeout, or a missing capability.
    pub(crate) async fn device_position(&self) -> Option<Coordinates> {
        match timeout(self.tier_bound(), self.device.current_position()).await {
            Ok(Ok(coords)) => Some(coords),
            Ok(Err(e)) => {
                debug!("device position unavailable: {e}");
                None
            }
            Err(_) => {
                debug!("device position request timed out");
                None
            }
        }
    }

    async fn try_device(&self) -> Option<ResolvedLocation> {
        let coords = self.device_position().await?;

        // Coordinates already count as a success; a failed reverse geocode
        // only costs the place name, it does not fall through to the next
        // tier.
        let name = self
            .reverse_geocode(coords)
            .await
            .unwrap_or_else(|| GENERIC_LOCATION_LABEL.to_string());

        Some(ResolvedLocation {
            name,
            coordinates: coords,
            method: ResolutionMethod::Device,
        })
    }

    /// Reverse geocode coordinates to a place name. `None` when the service
    /// fails or reports no usable field.
    pub(crate) async fn reverse_geocode(&self, coords: Coordinates) -> Option<String> {
        let url = format!(
            "{}?format=json&lat={}&lon={}",
            self.config.reverse_geocode_url, coords.latitude, coords.longitude
        );

        let response = match timeout(self.tier_bound(), self.client.get(&url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("reverse geocoding request failed: {e}");
                return None;
            }
            Err(_) => {
                debug!("reverse geocoding timed out");
                return None;
            }
        };

        match response.json::<ReverseGeocodeResponse>().await {
            Ok(body) => body.place_name(),
            Err(e) => {
                debug!("reverse geocoding response unreadable: {e}");
                None
            }
        }
    }

    async fn try_network(&self) -> Option<ResolvedLocation> {
        let url = format!("{}?fields=city,lat,lon", self.config.ip_lookup_url);

        let response = match timeout(self.tier_bound(), self.client.get(&url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("network geolocation request failed: {e}");
                return None;
            }
            Err(_) => {
                debug!("network geolocation timed out");
                return None;
            }
        };

        let body = match response.json::<IpLookupResponse>().await {
            Ok(body) => body,
            Err(e) => {
                debug!("network geolocation response unreadable: {e}");
                return None;
            }
        };

        // Any missing field means the attempt failed.
        let city = body.city.filter(|city| !city.trim().is_empty())?;
        let latitude = body.lat?;
        let longitude = body.lon?;

        Some(ResolvedLocation {
            name: city,
            coordinates: Coordinates {
                latitude,
                longitude,
            },
            method: ResolutionMethod::Network,
        })
    }

    fn tier_bound(&self) -> Duration {
        Duration::from_secs(self.config.geolocation_timeout_seconds)
    }
}
