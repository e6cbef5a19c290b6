//! Weatherdeck - session coordination core for a multi-view weather dashboard
//!
//! This library provides the client-side plumbing between user intent and a
//! weather provider: debounced search, a time-boxed response cache, tiered
//! location resolution, and the session controller that ties them together.

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod geo;
pub mod location_resolver;
pub mod models;
pub mod provider;
pub mod session;

// Re-export core types for public API
pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use config::WeatherdeckConfig;
pub use debounce::Debounce;
pub use error::{FetchError, WeatherdeckError};
pub use location_resolver::{DevicePositionSource, LocationResolver, ResolvedLocation};
pub use models::{Coordinates, View, WeatherSnapshot};
pub use provider::{WeatherProvider, WeatherstackClient};
pub use session::{FetchOutcome, SessionController, SessionState, SessionTasks};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, WeatherdeckError>;
