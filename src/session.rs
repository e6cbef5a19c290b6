//! Weather session controller: the coordination core of the dashboard.
//!
//! Owns the session state and decides when to fetch: it debounces rapid
//! search input, consults the response cache before touching the network,
//! classifies provider failures, auto-refreshes the active view on a timer,
//! and reconciles the device position against the displayed location.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::SessionConfig;
use crate::debounce::Debounce;
use crate::geo;
use crate::location_resolver::LocationResolver;
use crate::models::{View, WeatherSnapshot};
use crate::provider::WeatherProvider;

/// Fixed suggestion list shown while typing; the upstream service has no
/// suggestion endpoint.
const SUGGESTION_POOL: &[&str] = &[
    "London, UK",
    "Los Angeles, USA",
    "New York, USA",
    "Tokyo, Japan",
    "Sydney, Australia",
    "Paris, France",
    "Dubai, UAE",
    "Singapore",
];

/// Read model of one user session.
///
/// Mutated only by the controller; rendering collaborators receive clones
/// via [`SessionController::state`] and never see a half-applied update.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub active_view: View,
    /// The location currently displayed, provisional until resolution runs.
    pub current_query: String,
    /// The most recent text the user searched for.
    pub search_query: String,
    pub snapshots: HashMap<View, WeatherSnapshot>,
    pub loading: bool,
    pub error: Option<String>,
    pub rate_limited: bool,
    /// Set when the last fetch was served from the cache.
    pub cache_notice: Option<String>,
    pub suggestions: Vec<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub auto_refresh_minutes: u64,
}

impl SessionState {
    fn new(config: &SessionConfig) -> Self {
        Self {
            active_view: View::Current,
            current_query: config.default_query.clone(),
            search_query: String::new(),
            snapshots: HashMap::new(),
            loading: false,
            error: None,
            rate_limited: false,
            cache_notice: None,
            suggestions: Vec::new(),
            last_update: None,
            auto_refresh_minutes: config.auto_refresh_minutes,
        }
    }

    /// Last snapshot fetched for `view`, if any.
    #[must_use]
    pub fn snapshot(&self, view: View) -> Option<&WeatherSnapshot> {
        self.snapshots.get(&view)
    }
}

/// How a fetch request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fresh data fetched from the provider.
    Fetched,
    /// Served from the cache without network I/O.
    Cached,
    /// Dropped because an identical fetch was already in flight.
    InFlight,
    /// The provider call failed; details are recorded in the session state.
    Failed,
}

struct Inner {
    provider: Arc<dyn WeatherProvider>,
    resolver: LocationResolver,
    cache: Mutex<ResponseCache>,
    state: Mutex<SessionState>,
    debounce: Mutex<Debounce>,
    in_flight: Mutex<HashSet<CacheKey>>,
    config: SessionConfig,
}

/// Orchestrates one user session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        resolver: LocationResolver,
        cache: ResponseCache,
        config: SessionConfig,
    ) -> Self {
        let state = SessionState::new(&config);
        Self {
            inner: Arc::new(Inner {
                provider,
                resolver,
                cache: Mutex::new(cache),
                state: Mutex::new(state),
                debounce: Mutex::new(Debounce::new()),
                in_flight: Mutex::new(HashSet::new()),
                config,
            }),
        }
    }

    /// Cloned view of the current session state for rendering collaborators.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.lock().stats()
    }

    pub fn clear_cache(&self) {
        self.inner.cache.lock().clear();
    }

    /// Resolve the user's location and load the initial Current view.
    ///
    /// Location resolution is infallible, so this always ends in a fetch
    /// attempt, falling back to the fixed default query at worst.
    pub async fn initialize(&self) -> FetchOutcome {
        self.resolve_and_fetch().await
    }

    /// Re-run location detection on user request and reload the Current view.
    pub async fn detect_location(&self) -> FetchOutcome {
        self.resolve_and_fetch().await
    }

    async fn resolve_and_fetch(&self) -> FetchOutcome {
        let resolved = self.inner.resolver.resolve().await;
        info!(name = %resolved.name, method = ?resolved.method, "session location resolved");
        {
            let mut state = self.inner.state.lock();
            state.current_query = resolved.name.clone();
        }
        self.fetch(View::Current, &resolved.name).await
    }

    /// Debounced search. Empty or whitespace-only input is a no-op.
    ///
    /// Each call cancels the previously pending trigger, so fast typing
    /// collapses into one fetch for the final text once the quiet window
    /// elapses. The active view is captured at call time.
    pub fn search(&self, text: &str) {
        let query = text.trim();
        if query.is_empty() {
            return;
        }
        let query = query.to_string();

        let view = {
            let mut state = self.inner.state.lock();
            state.search_query = query.clone();
            state.active_view
        };

        let controller = self.clone();
        let delay = Duration::from_millis(self.inner.config.debounce_ms);
        self.inner.debounce.lock().trigger(delay, move || async move {
            let _ = controller.fetch(view, &query).await;
            controller.inner.state.lock().suggestions.clear();
        });
    }

    /// Update the suggestion list for a partially typed query. Inputs of up
    /// to two characters clear the list.
    pub fn suggest(&self, input: &str) {
        let mut state = self.inner.state.lock();
        if input.len() > 2 {
            let needle = input.to_lowercase();
            state.suggestions = SUGGESTION_POOL
                .iter()
                .filter(|entry| entry.to_lowercase().contains(&needle))
                .map(ToString::to_string)
                .collect();
        } else {
            state.suggestions.clear();
        }
    }

    /// Switch the active view.
    ///
    /// Tab changes are user-deliberate, not typing noise, so the fetch for
    /// the new view runs immediately when a query is established.
    pub async fn switch_view(&self, view: View) -> Option<FetchOutcome> {
        let query = {
            let mut state = self.inner.state.lock();
            state.active_view = view;
            state.current_query.clone()
        };

        if query.trim().is_empty() {
            return None;
        }
        Some(self.fetch(view, &query).await)
    }

    /// The unit of work: cache consultation, provider call, classification,
    /// and state update for one (view, query) pair.
    ///
    /// A duplicate call for a pair already in flight is dropped. Independent
    /// pairs may still race; shared flags resolve last-writer-wins.
    pub async fn fetch(&self, view: View, query: &str) -> FetchOutcome {
        let key = CacheKey::new(view, query);

        if !self.inner.in_flight.lock().insert(key.clone()) {
            debug!(%view, query, "identical fetch already in flight, dropping");
            return FetchOutcome::InFlight;
        }

        let outcome = self.fetch_inner(view, query, &key).await;
        self.inner.in_flight.lock().remove(&key);
        outcome
    }

    async fn fetch_inner(&self, view: View, query: &str, key: &CacheKey) -> FetchOutcome {
        {
            let mut state = self.inner.state.lock();
            state.loading = true;
            state.error = None;
            state.rate_limited = false;
            state.cache_notice = None;
        }

        let cached = self.inner.cache.lock().get(key);
        if let Some(snapshot) = cached {
            debug!(%view, query, "serving cached snapshot");
            let mut state = self.inner.state.lock();
            state.cache_notice = Some(format!("Using cached {view} data for {query}"));
            Self::apply_snapshot(&mut state, view, query, snapshot);
            state.loading = false;
            return FetchOutcome::Cached;
        }

        let result = self.inner.provider.fetch(view, query).await;

        // One lock for the whole outcome: no interleaved fetch observes a
        // half-applied update, and loading is released on every path.
        let mut state = self.inner.state.lock();
        state.loading = false;
        match result {
            Ok(snapshot) => {
                self.inner.cache.lock().set(key.clone(), snapshot.clone());
                Self::apply_snapshot(&mut state, view, query, snapshot);
                FetchOutcome::Fetched
            }
            Err(err) => {
                warn!(%view, query, error = %err, "fetch failed");
                state.rate_limited = err.is_rate_limited();
                state.error = Some(err.to_string());
                FetchOutcome::Failed
            }
        }
    }

    fn apply_snapshot(state: &mut SessionState, view: View, query: &str, snapshot: WeatherSnapshot) {
        state.snapshots.insert(view, snapshot);
        state.error = None;
        state.rate_limited = false;
        if view == View::Current {
            state.current_query = query.to_string();
            state.last_update = Some(Utc::now());
        }
    }

    /// One auto-refresh pass: refetch the active view with the current query.
    ///
    /// Skipped while no query is established, and while another fetch is
    /// still loading so overlapping ticks never pile up.
    pub async fn auto_refresh_tick(&self) -> Option<FetchOutcome> {
        let (view, query, busy) = {
            let state = self.inner.state.lock();
            (state.active_view, state.current_query.clone(), state.loading)
        };

        if query.trim().is_empty() {
            return None;
        }
        if busy {
            debug!("auto-refresh skipped, a fetch is still loading");
            return None;
        }

        info!(%view, query, "auto-refreshing weather data");
        Some(self.fetch(view, &query).await)
    }

    /// One drift-watch pass: best-effort background correction of the
    /// displayed location. Every failure is absorbed, never surfaced.
    pub async fn check_location_drift(&self) -> Option<FetchOutcome> {
        let displayed = {
            let state = self.inner.state.lock();
            state
                .snapshot(View::Current)
                .map(|snapshot| snapshot.location.coordinates())
        }?;

        let position = self.inner.resolver.device_position().await?;
        let moved_km = geo::distance_km(position, displayed);
        if moved_km <= self.inner.config.drift_threshold_km {
            return None;
        }
        debug!(moved_km, "device position drifted from displayed location");

        let name = self.inner.resolver.reverse_geocode(position).await?;
        {
            let state = self.inner.state.lock();
            if state.current_query == name {
                return None;
            }
        }

        info!(%name, "location drift detected, updating displayed location");
        {
            let mut state = self.inner.state.lock();
            state.current_query = name.clone();
        }
        Some(self.fetch(View::Current, &name).await)
    }

    /// Register the periodic auto-refresh and location-drift tasks.
    ///
    /// The returned handle aborts both tasks on [`SessionTasks::shutdown`]
    /// or drop, so a discarded session cannot leak timers.
    #[must_use]
    pub fn start(&self) -> SessionTasks {
        let auto_refresh = tokio::spawn({
            let controller = self.clone();
            async move {
                let period =
                    Duration::from_secs(controller.inner.config.auto_refresh_minutes * 60);
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; skip it so the first
                // refresh happens one full period after startup.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    controller.auto_refresh_tick().await;
                }
            }
        });

        let drift_watch = tokio::spawn({
            let controller = self.clone();
            async move {
                let period = Duration::from_secs(controller.inner.config.drift_check_seconds);
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    controller.check_location_drift().await;
                }
            }
        });

        SessionTasks {
            auto_refresh,
            drift_watch,
        }
    }
}

/// Handles for the periodic background tasks of one session.
pub struct SessionTasks {
    auto_refresh: JoinHandle<()>,
    drift_watch: JoinHandle<()>,
}

impl SessionTasks {
    /// Stop both periodic tasks.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        self.auto_refresh.abort();
        self.drift_watch.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationConfig;
    use crate::error::{FetchError, RATE_LIMIT_CODE};
    use crate::location_resolver::NoDevicePosition;
    use async_trait::async_trait;
    use serde_json::json;

    fn sample_snapshot(name: &str, lat: f64, lon: f64) -> WeatherSnapshot {
        serde_json::from_value(json!({
            "location": { "name": name, "country": "Test", "lat": lat, "lon": lon },
            "current": { "temperature": 15 }
        }))
        .unwrap()
    }

    /// Provider fake recording every call and replaying canned results.
    struct FakeProvider {
        calls: Mutex<Vec<(View, String)>>,
        result: Box<dyn Fn(View, &str) -> Result<WeatherSnapshot, FetchError> + Send + Sync>,
        delay: Option<Duration>,
    }

    impl FakeProvider {
        fn ok() -> Self {
            Self::with(|_, query| Ok(sample_snapshot(query, 51.5073, -0.1276)))
        }

        fn with(
            result: impl Fn(View, &str) -> Result<WeatherSnapshot, FetchError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                result: Box::new(result),
                delay: None,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> Vec<(View, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn fetch(&self, view: View, query: &str) -> Result<WeatherSnapshot, FetchError> {
            self.calls.lock().push((view, query.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.result)(view, query)
        }
    }

    fn offline_resolver() -> LocationResolver {
        LocationResolver::new(
            reqwest::Client::new(),
            Arc::new(NoDevicePosition),
            LocationConfig {
                geolocation_timeout_seconds: 1,
                reverse_geocode_url: "http://127.0.0.1:9/reverse".to_string(),
                ip_lookup_url: "http://127.0.0.1:9/json/".to_string(),
            },
        )
    }

    fn controller_with(provider: Arc<FakeProvider>, config: SessionConfig) -> SessionController {
        SessionController::new(
            provider,
            offline_resolver(),
            ResponseCache::default(),
            config,
        )
    }

    #[tokio::test]
    async fn test_fetch_success_updates_state_and_cache() {
        let provider = Arc::new(FakeProvider::ok());
        let controller = controller_with(provider.clone(), SessionConfig::default());

        let outcome = controller.fetch(View::Current, "Tokyo").await;
        assert_eq!(outcome, FetchOutcome::Fetched);

        let state = controller.state();
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert_eq!(state.current_query, "Tokyo");
        assert!(state.last_update.is_some());
        assert_eq!(state.snapshot(View::Current).unwrap().location.name, "Tokyo");
        assert_eq!(controller.cache_stats().len, 1);
    }

    #[tokio::test]
    async fn test_fetch_for_secondary_view_keeps_current_query() {
        let provider = Arc::new(FakeProvider::ok());
        let controller = controller_with(provider.clone(), SessionConfig::default());

        controller.fetch(View::Forecast, "Tokyo").await;

        let state = controller.state();
        assert_eq!(state.current_query, "London");
        assert!(state.last_update.is_none());
        assert!(state.snapshot(View::Forecast).is_some());
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let provider = Arc::new(FakeProvider::ok());
        let controller = controller_with(provider.clone(), SessionConfig::default());

        assert_eq!(controller.fetch(View::Current, "Tokyo").await, FetchOutcome::Fetched);
        assert_eq!(controller.fetch(View::Current, "Tokyo").await, FetchOutcome::Cached);

        assert_eq!(provider.calls().len(), 1);
        let state = controller.state();
        assert!(state.cache_notice.is_some());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_rate_limited_envelope_sets_flag_and_message() {
        let provider = Arc::new(FakeProvider::with(|_, _| {
            Err(FetchError::provider(RATE_LIMIT_CODE, "usage limit reached"))
        }));
        let controller = controller_with(provider, SessionConfig::default());

        let outcome = controller.fetch(View::Current, "Tokyo").await;
        assert_eq!(outcome, FetchOutcome::Failed);

        let state = controller.state();
        assert!(state.rate_limited);
        assert!(state.error.as_deref().unwrap().contains("usage limit reached"));
        assert!(!state.loading);
        // The failed query is not recorded as the displayed location.
        assert_eq!(state.current_query, "London");
    }

    #[tokio::test]
    async fn test_successful_fetch_clears_previous_error() {
        let provider = Arc::new(FakeProvider::with(|_, query| {
            if query == "nowhere" {
                Err(FetchError::network("connection refused"))
            } else {
                Ok(sample_snapshot(query, 51.5073, -0.1276))
            }
        }));
        let controller = controller_with(provider, SessionConfig::default());

        controller.fetch(View::Current, "nowhere").await;
        assert!(controller.state().error.is_some());

        controller.fetch(View::Current, "Tokyo").await;
        let state = controller.state();
        assert_eq!(state.error, None);
        assert!(!state.rate_limited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_in_flight_fetch_is_dropped() {
        let provider = Arc::new(FakeProvider::ok().slow(Duration::from_millis(100)));
        let controller = controller_with(provider.clone(), SessionConfig::default());

        let (first, second) = tokio::join!(
            controller.fetch(View::Current, "Tokyo"),
            controller.fetch(View::Current, "Tokyo"),
        );

        assert_eq!(provider.calls().len(), 1);
        assert!(
            (first == FetchOutcome::Fetched && second == FetchOutcome::InFlight)
                || (first == FetchOutcome::InFlight && second == FetchOutcome::Fetched)
        );
    }

    #[tokio::test]
    async fn test_suggest_filters_pool_and_clears_short_input() {
        let controller = controller_with(Arc::new(FakeProvider::ok()), SessionConfig::default());

        controller.suggest("lon");
        assert_eq!(controller.state().suggestions, vec!["London, UK".to_string()]);

        controller.suggest("lo");
        assert!(controller.state().suggestions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_skipped_while_loading() {
        let provider = Arc::new(FakeProvider::ok().slow(Duration::from_millis(200)));
        let controller = controller_with(provider.clone(), SessionConfig::default());

        let busy = controller.clone();
        let in_flight = tokio::spawn(async move { busy.fetch(View::Current, "Tokyo").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(controller.auto_refresh_tick().await, None);
        in_flight.await.unwrap();

        // Once idle again the tick refreshes normally.
        assert!(controller.auto_refresh_tick().await.is_some());
    }

    #[tokio::test]
    async fn test_auto_refresh_skipped_without_query() {
        let config = SessionConfig {
            default_query: String::new(),
            ..SessionConfig::default()
        };
        // An all-blank default query never validates at the config layer, but
        // the tick guard must hold on its own.
        let provider = Arc::new(FakeProvider::ok());
        let controller = controller_with(provider.clone(), config);

        assert_eq!(controller.auto_refresh_tick().await, None);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drift_check_without_current_snapshot_is_noop() {
        let controller = controller_with(Arc::new(FakeProvider::ok()), SessionConfig::default());
        assert_eq!(controller.check_location_drift().await, None);
    }

    mod drift {
        use super::*;
        use crate::location_resolver::DevicePositionSource;
        use crate::models::Coordinates;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        struct FixedPosition(Coordinates);

        #[async_trait]
        impl DevicePositionSource for FixedPosition {
            async fn current_position(&self) -> anyhow::Result<Coordinates> {
                Ok(self.0)
            }
        }

        async fn reverse_geocode_server(city: &str) -> MockServer {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/reverse"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "address": { "city": city }
                })))
                .mount(&server)
                .await;
            server
        }

        fn drift_controller(
            provider: Arc<FakeProvider>,
            device: Coordinates,
            geocode_base: &str,
        ) -> SessionController {
            let resolver = LocationResolver::new(
                reqwest::Client::new(),
                Arc::new(FixedPosition(device)),
                LocationConfig {
                    geolocation_timeout_seconds: 2,
                    reverse_geocode_url: format!("{geocode_base}/reverse"),
                    ip_lookup_url: "http://127.0.0.1:9/json/".to_string(),
                },
            );
            SessionController::new(
                provider,
                resolver,
                ResponseCache::default(),
                SessionConfig::default(),
            )
        }

        #[tokio::test]
        async fn test_drift_beyond_threshold_triggers_implicit_search() {
            let server = reverse_geocode_server("Paris").await;
            let provider = Arc::new(FakeProvider::ok());
            // Device sits in Paris while the displayed snapshot is London.
            let controller = drift_controller(
                provider.clone(),
                Coordinates {
                    latitude: 48.8566,
                    longitude: 2.3522,
                },
                &server.uri(),
            );

            controller.fetch(View::Current, "London").await;
            let outcome = controller.check_location_drift().await;

            assert!(outcome.is_some());
            assert_eq!(controller.state().current_query, "Paris");
            let calls = provider.calls();
            assert_eq!(calls.last().unwrap(), &(View::Current, "Paris".to_string()));
        }

        #[tokio::test]
        async fn test_drift_within_threshold_is_ignored() {
            let server = reverse_geocode_server("Paris").await;
            let provider = Arc::new(FakeProvider::ok());
            // A few hundred meters from the snapshot coordinates.
            let controller = drift_controller(
                provider.clone(),
                Coordinates {
                    latitude: 51.510,
                    longitude: -0.1276,
                },
                &server.uri(),
            );

            controller.fetch(View::Current, "London").await;
            assert_eq!(controller.check_location_drift().await, None);
            assert_eq!(controller.state().current_query, "London");
            assert_eq!(provider.calls().len(), 1);
        }

        #[tokio::test]
        async fn test_drift_to_same_name_does_not_refetch() {
            let server = reverse_geocode_server("London").await;
            let provider = Arc::new(FakeProvider::ok());
            let controller = drift_controller(
                provider.clone(),
                Coordinates {
                    latitude: 48.8566,
                    longitude: 2.3522,
                },
                &server.uri(),
            );

            controller.fetch(View::Current, "London").await;
            assert_eq!(controller.check_location_drift().await, None);
            assert_eq!(provider.calls().len(), 1);
        }
    }
}
