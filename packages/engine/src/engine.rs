//! The viewport fetch coordinator and optimistic mutation manager.

use std::sync::{Arc, Mutex, MutexGuard};

use plot_pulse_cache::PlotCache;
use plot_pulse_client::PlotRepository;
use plot_pulse_currency::RateService;
use plot_pulse_filter::{DisplayContext, FilterParams, apply};
use plot_pulse_geo::MapBounds;
use plot_pulse_plot_models::{NearestPlotRequest, Plot};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::stats::compute_stats;
use crate::{EngineConfig, EngineError, PlotStats, ViewSettings, ViewSnapshot};

/// Where the viewport pipeline currently is.
///
/// `Idle → Debouncing → (skip | Fetching) → Idle`; a new event aborts the
/// pending task and restarts from `Debouncing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Nothing scheduled.
    Idle,
    /// A debounce timer is running.
    Debouncing,
    /// A repository fetch is in flight.
    Fetching,
}

/// What the pipeline decided to do once the debounce timer fired.
enum Decision {
    /// Bounds noise or no target bounds: nothing to do.
    Skip,
    /// Pure zoom-in: the loaded superset stays valid, only the viewport
    /// scope for statistics moves.
    RescopeOnly,
    /// The cache already holds this viewport + filter set.
    CommitCached(Vec<Plot>),
    /// Go to the repository.
    Fetch {
        key: String,
        params: FilterParams,
        settings: ViewSettings,
    },
}

struct Inner {
    cache: PlotCache,
    plots: Vec<Plot>,
    last_bounds: Option<MapBounds>,
    params: FilterParams,
    settings: ViewSettings,
    loading: bool,
    error: Option<String>,
    phase: FetchPhase,
    /// Stamps every scheduled pipeline run; any commit re-checks it after
    /// each await so superseded runs become silent no-ops.
    generation: u64,
    pending: Option<JoinHandle<()>>,
    /// Next client-side temporary id for optimistic creates. Negative so
    /// temporaries can never collide with server ids.
    next_temp_id: i64,
    seq: u64,
}

struct Shared {
    repo: Arc<dyn PlotRepository>,
    rates: Arc<RateService>,
    config: EngineConfig,
    inner: Mutex<Inner>,
    tx: watch::Sender<ViewSnapshot>,
}

/// Handle to the viewport-driven plot data engine.
///
/// Cheap to clone; all clones share the same state. Event methods
/// (`on_bounds_changed`, `on_filters_changed`, ...) must be called from
/// within a tokio runtime since they spawn the debounce task.
#[derive(Clone)]
pub struct PlotDataEngine {
    shared: Arc<Shared>,
}

impl PlotDataEngine {
    /// Creates an engine over the given repository and rate service.
    #[must_use]
    pub fn new(
        repo: Arc<dyn PlotRepository>,
        rates: Arc<RateService>,
        config: EngineConfig,
    ) -> Self {
        let (tx, _) = watch::channel(ViewSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                repo,
                rates,
                config,
                inner: Mutex::new(Inner {
                    cache: PlotCache::new(config.cache_ttl, config.cache_max_size),
                    plots: Vec::new(),
                    last_bounds: None,
                    params: FilterParams::default(),
                    settings: ViewSettings::default(),
                    loading: false,
                    error: None,
                    phase: FetchPhase::Idle,
                    generation: 0,
                    pending: None,
                    next_temp_id: -1,
                    seq: 0,
                }),
                tx,
            }),
        }
    }

    /// Subscribes to published view snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.shared.tx.subscribe()
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ViewSnapshot {
        self.shared.tx.borrow().clone()
    }

    /// Viewport statistics from the latest snapshot.
    #[must_use]
    pub fn stats(&self) -> PlotStats {
        self.shared.tx.borrow().stats
    }

    /// Where the viewport pipeline currently is.
    #[must_use]
    pub fn phase(&self) -> FetchPhase {
        self.lock().phase
    }

    /// Handles a map viewport change: restarts the debounce window and,
    /// once it elapses, applies the reuse policy before fetching.
    pub fn on_bounds_changed(&self, bounds: MapBounds) {
        self.schedule(Some(bounds), false);
    }

    /// Handles a filter change: re-runs the debounce→fetch pipeline
    /// against the last known bounds, bypassing the bounds reuse policy.
    pub fn on_filters_changed(&self, params: FilterParams) {
        {
            let mut inner = self.lock();
            inner.params = params;
        }
        self.schedule(None, true);
    }

    /// Handles a currency/area-unit change.
    ///
    /// Cached snapshots were refined under the old settings, so the cache
    /// is cleared and the pipeline re-runs for the current viewport.
    pub fn on_settings_changed(&self, settings: ViewSettings) {
        {
            let mut inner = self.lock();
            inner.settings = settings;
            inner.cache.clear();
            self.publish(&mut inner);
        }
        self.schedule(None, true);
    }

    /// Clears the cache and re-fetches the current viewport.
    pub fn refresh(&self) {
        {
            let mut inner = self.lock();
            inner.cache.clear();
        }
        self.schedule(None, true);
    }

    /// Acknowledges the current error, if any.
    pub fn clear_error(&self) {
        let mut inner = self.lock();
        if inner.error.take().is_some() {
            self.publish(&mut inner);
        }
    }

    /// Waits for any pending debounce/fetch task to finish. Useful at
    /// shutdown and in tests; safe to call repeatedly.
    pub async fn wait_idle(&self) {
        loop {
            let handle = { self.lock().pending.take() };
            match handle {
                Some(handle) => {
                    // An aborted task resolves with a JoinError; both
                    // outcomes mean the pipeline is no longer running.
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }

    /// Creates a plot optimistically.
    ///
    /// The record is validated first, appended to the visible list under
    /// a temporary negative id, and replaced by the server-confirmed
    /// record on success. Success also clears the whole cache, since
    /// every cached viewport may now be stale.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] before any state change, or
    /// [`EngineError::Repository`] after removing the temporary record.
    pub async fn create_plot(&self, plot: Plot) -> Result<Plot, EngineError> {
        plot.validate()?;

        let request = Plot {
            id: None,
            ..plot.clone()
        };
        let temp_id = {
            let mut inner = self.lock();
            let temp_id = inner.next_temp_id;
            inner.next_temp_id -= 1;
            inner.plots.push(Plot {
                id: Some(temp_id),
                ..plot
            });
            self.publish(&mut inner);
            temp_id
        };

        match self.shared.repo.create(&request).await {
            Ok(created) => {
                let mut inner = self.lock();
                if let Some(slot) = inner.plots.iter_mut().find(|p| p.id == Some(temp_id)) {
                    *slot = created.clone();
                }
                inner.cache.clear();
                self.publish(&mut inner);
                Ok(created)
            }
            Err(e) => {
                let mut inner = self.lock();
                inner.plots.retain(|p| p.id != Some(temp_id));
                self.publish(&mut inner);
                Err(e.into())
            }
        }
    }

    /// Updates a plot optimistically, restoring the exact prior record on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] or [`EngineError::NotFound`]
    /// before any state change, or [`EngineError::Repository`] after the
    /// rollback.
    pub async fn update_plot(&self, id: i64, plot: Plot) -> Result<Plot, EngineError> {
        plot.validate()?;

        let previous = {
            let mut inner = self.lock();
            let Some(slot) = inner.plots.iter_mut().find(|p| p.id == Some(id)) else {
                return Err(EngineError::NotFound { id });
            };
            let previous = slot.clone();
            *slot = Plot {
                id: Some(id),
                ..plot.clone()
            };
            self.publish(&mut inner);
            previous
        };

        match self.shared.repo.update(id, &plot).await {
            Ok(updated) => {
                let mut inner = self.lock();
                if let Some(slot) = inner.plots.iter_mut().find(|p| p.id == Some(id)) {
                    *slot = updated.clone();
                }
                inner.cache.clear();
                self.publish(&mut inner);
                Ok(updated)
            }
            Err(e) => {
                let mut inner = self.lock();
                if let Some(slot) = inner.plots.iter_mut().find(|p| p.id == Some(id)) {
                    *slot = previous;
                }
                self.publish(&mut inner);
                Err(e.into())
            }
        }
    }

    /// Deletes a plot optimistically, re-inserting the record at its
    /// original position on failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] before any state change, or
    /// [`EngineError::Repository`] after the rollback.
    pub async fn delete_plot(&self, id: i64) -> Result<(), EngineError> {
        let (index, removed) = {
            let mut inner = self.lock();
            let Some(index) = inner.plots.iter().position(|p| p.id == Some(id)) else {
                return Err(EngineError::NotFound { id });
            };
            let removed = inner.plots.remove(index);
            self.publish(&mut inner);
            (index, removed)
        };

        match self.shared.repo.delete(id).await {
            Ok(()) => {
                let mut inner = self.lock();
                inner.cache.clear();
                self.publish(&mut inner);
                Ok(())
            }
            Err(e) => {
                let mut inner = self.lock();
                let index = index.min(inner.plots.len());
                inner.plots.insert(index, removed);
                self.publish(&mut inner);
                Err(e.into())
            }
        }
    }

    /// Finds the nearest plot within the request radius; `Ok(None)` when
    /// nothing is in range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Repository`] on repository failure.
    pub async fn find_nearest(
        &self,
        request: &NearestPlotRequest,
    ) -> Result<Option<Plot>, EngineError> {
        Ok(self.shared.repo.nearest_within_radius(request).await?)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().expect("engine state lock poisoned")
    }

    /// Publishes a snapshot of the current state. Must be called with the
    /// state lock held so snapshots observe a consistent state.
    fn publish(&self, inner: &mut Inner) {
        inner.seq += 1;
        let rates = self.shared.rates.current();
        let stats = compute_stats(
            &inner.plots,
            inner.last_bounds.as_ref(),
            inner.settings,
            &rates,
        );
        self.shared.tx.send_replace(ViewSnapshot {
            plots: inner.plots.clone(),
            loading: inner.loading,
            error: inner.error.clone(),
            last_bounds: inner.last_bounds,
            stats,
            seq: inner.seq,
        });
    }

    /// (Re)starts the debounce→fetch pipeline.
    ///
    /// `bounds` is the new target viewport, or `None` to reuse the last
    /// known bounds (filter/settings changes, refresh). `force` bypasses
    /// the bounds reuse policy so those runs always reach the cache or
    /// the repository. Starting a run supersedes any pending one: the
    /// previous task is aborted and its generation invalidated.
    fn schedule(&self, bounds: Option<MapBounds>, force: bool) {
        let (generation, target, previous) = {
            let mut inner = self.lock();
            inner.generation += 1;
            let Some(target) = bounds.or(inner.last_bounds) else {
                // No viewport yet; nothing to fetch against.
                return;
            };
            inner.phase = FetchPhase::Debouncing;
            (inner.generation, target, inner.pending.take())
        };

        if let Some(previous) = previous {
            previous.abort();
        }

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine.run_pipeline(generation, target, force).await;
        });
        self.lock().pending = Some(handle);
    }

    async fn run_pipeline(&self, generation: u64, bounds: MapBounds, force: bool) {
        tokio::time::sleep(self.shared.config.debounce).await;

        let decision = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            match inner.last_bounds {
                Some(last) if !force && last.contains(&bounds) => Decision::RescopeOnly,
                Some(last) if !force && !bounds.differs_from(&last, self.shared.config.bounds_threshold) => {
                    Decision::Skip
                }
                _ => {
                    let key = PlotCache::fingerprint(&bounds, &inner.params);
                    if let Some(data) = inner.cache.get(&key) {
                        Decision::CommitCached(data)
                    } else {
                        inner.phase = FetchPhase::Fetching;
                        inner.loading = true;
                        self.publish(&mut inner);
                        Decision::Fetch {
                            key,
                            params: inner.params.clone(),
                            settings: inner.settings,
                        }
                    }
                }
            }
        };

        match decision {
            Decision::Skip => {
                let mut inner = self.lock();
                if inner.generation == generation {
                    inner.phase = FetchPhase::Idle;
                    // A superseded fetch may have published `loading`;
                    // this run resolving as a no-op must clear it.
                    if inner.loading {
                        inner.loading = false;
                        self.publish(&mut inner);
                    }
                }
            }
            Decision::RescopeOnly => {
                let mut inner = self.lock();
                if inner.generation == generation {
                    inner.last_bounds = Some(bounds);
                    inner.loading = false;
                    inner.phase = FetchPhase::Idle;
                    self.publish(&mut inner);
                }
            }
            Decision::CommitCached(data) => {
                let mut inner = self.lock();
                if inner.generation == generation {
                    Self::commit(&mut inner, data, bounds);
                    self.publish(&mut inner);
                }
            }
            Decision::Fetch {
                key,
                params,
                settings,
            } => {
                let result = self
                    .shared
                    .repo
                    .list_in_bounds(&bounds, &params, 0, self.shared.config.page_size)
                    .await;

                let mut inner = self.lock();
                if inner.generation != generation {
                    // Superseded while in flight; discard silently.
                    return;
                }
                match result {
                    Ok(raw) => {
                        let rates = self.shared.rates.current();
                        let ctx =
                            DisplayContext::new(settings.area_unit, settings.currency, &rates);
                        let refined = apply(&raw, &params, &ctx);
                        inner.cache.put(key, refined.clone(), bounds);
                        Self::commit(&mut inner, refined, bounds);
                        self.publish(&mut inner);
                    }
                    Err(e) => {
                        log::error!("Failed to load plots for viewport: {e}");
                        inner.error = Some(e.to_string());
                        inner.loading = false;
                        inner.phase = FetchPhase::Idle;
                        self.publish(&mut inner);
                    }
                }
            }
        }
    }

    /// Commits a fetched or cached plot list for the given bounds.
    ///
    /// An empty result does not clear a non-empty visible list; this
    /// avoids a flash of empty content while moving between areas.
    fn commit(inner: &mut Inner, data: Vec<Plot>, bounds: MapBounds) {
        if !(data.is_empty() && !inner.plots.is_empty()) {
            inner.plots = data;
        }
        inner.last_bounds = Some(bounds);
        inner.loading = false;
        inner.error = None;
        inner.phase = FetchPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use plot_pulse_client::PlotRepositoryError;
    use plot_pulse_plot_models::PriceUnit;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use tokio::time::Duration;

    fn plot(id: i64, price: f64, lat: f64, lng: f64) -> Plot {
        Plot {
            id: Some(id),
            price,
            price_unit: PriceUnit::PerSqft,
            is_for_sale: true,
            description: Some(format!("Plot {id}")),
            latitude: lat,
            longitude: lng,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    /// In-memory repository that mimics the plots API, with switchable
    /// failure injection and call counters.
    #[derive(Default)]
    struct MockRepo {
        plots: Mutex<Vec<Plot>>,
        list_calls: AtomicUsize,
        create_calls: AtomicUsize,
        next_id: AtomicI64,
        fail_list: AtomicBool,
        hang_list: AtomicBool,
        fail_create: AtomicBool,
        fail_update: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl MockRepo {
        fn with_plots(plots: Vec<Plot>) -> Self {
            Self {
                plots: Mutex::new(plots),
                next_id: AtomicI64::new(1000),
                ..Self::default()
            }
        }

        fn server_error() -> PlotRepositoryError {
            PlotRepositoryError::Api {
                status: 500,
                message: "injected failure".to_string(),
            }
        }
    }

    #[async_trait]
    impl PlotRepository for MockRepo {
        async fn list_in_bounds(
            &self,
            bounds: &MapBounds,
            _params: &FilterParams,
            _page: u32,
            _size: u32,
        ) -> Result<Vec<Plot>, PlotRepositoryError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_list.load(Ordering::SeqCst) {
                // Stall until the caller aborts this fetch.
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            Ok(self
                .plots
                .lock()
                .unwrap()
                .iter()
                .filter(|p| bounds.contains_point(p.latitude, p.longitude))
                .cloned()
                .collect())
        }

        async fn create(&self, plot: &Plot) -> Result<Plot, PlotRepositoryError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            let mut created = plot.clone();
            created.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
            created.created_at = Some(Utc::now());
            self.plots.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: i64, plot: &Plot) -> Result<Plot, PlotRepositoryError> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            let mut updated = plot.clone();
            updated.id = Some(id);
            updated.updated_at = Some(Utc::now());
            let mut plots = self.plots.lock().unwrap();
            if let Some(slot) = plots.iter_mut().find(|p| p.id == Some(id)) {
                *slot = updated.clone();
            }
            Ok(updated)
        }

        async fn delete(&self, id: i64) -> Result<(), PlotRepositoryError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(Self::server_error());
            }
            self.plots.lock().unwrap().retain(|p| p.id != Some(id));
            Ok(())
        }

        async fn nearest_within_radius(
            &self,
            _request: &NearestPlotRequest,
        ) -> Result<Option<Plot>, PlotRepositoryError> {
            Ok(None)
        }
    }

    fn engine_with(repo: Arc<MockRepo>) -> PlotDataEngine {
        PlotDataEngine::new(
            repo,
            Arc::new(RateService::new("http://unused.invalid")),
            EngineConfig::default(),
        )
    }

    fn bounds_a() -> MapBounds {
        MapBounds::new(10.0, 0.0, 10.0, 0.0)
    }

    async fn load(engine: &PlotDataEngine, bounds: MapBounds) {
        engine.on_bounds_changed(bounds);
        engine.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_fetch_commits_viewport() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());

        load(&engine, bounds_a()).await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.plots.len(), 1);
        assert_eq!(snapshot.last_bounds, Some(bounds_a()));
        assert!(!snapshot.loading);
        assert_eq!(engine.phase(), FetchPhase::Idle);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_in_reuses_loaded_superset() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());

        load(&engine, bounds_a()).await;
        // Contained viewport: pure zoom-in, no network.
        load(&engine, MapBounds::new(9.0, 1.0, 9.0, 1.0)).await;

        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.plots.len(), 1);
        // Last known bounds still move so statistics rescope.
        assert_eq!(snapshot.last_bounds, Some(MapBounds::new(9.0, 1.0, 9.0, 1.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn pan_threshold_separates_noise_from_movement() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());

        load(&engine, bounds_a()).await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);

        // Every edge moves by 0.001°: below the 0.005° threshold.
        load(
            &engine,
            MapBounds::new(10.001, 0.001, 10.001, 0.001),
        )
        .await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);

        // A 0.01° move on the north edge is a real pan.
        load(&engine, MapBounds::new(10.01, 0.0, 10.0, -0.01)).await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_events_supersede_older_ones() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());

        engine.on_bounds_changed(MapBounds::new(50.0, 40.0, 50.0, 40.0));
        engine.on_bounds_changed(bounds_a());
        engine.wait_idle().await;

        // Only the latest viewport survived the debounce window.
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.snapshot().last_bounds, Some(bounds_a()));
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_an_inflight_fetch_clears_loading() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        let mut rx = engine.subscribe();

        load(&engine, bounds_a()).await;

        // The next fetch stalls, leaving a loading snapshot behind.
        repo.hang_list.store(true, Ordering::SeqCst);
        engine.on_bounds_changed(MapBounds::new(60.0, 50.0, 60.0, 50.0));
        rx.wait_for(|s| s.loading).await.unwrap();

        // Zooming back inside the committed viewport supersedes the
        // stalled fetch; the run resolves as reuse, not a fetch, and must
        // not leave the superseded fetch's loading flag published.
        engine.on_bounds_changed(MapBounds::new(9.0, 1.0, 9.0, 1.0));
        engine.wait_idle().await;

        let snapshot = engine.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(engine.phase(), FetchPhase::Idle);
        assert_eq!(snapshot.last_bounds, Some(MapBounds::new(9.0, 1.0, 9.0, 1.0)));
        assert_eq!(snapshot.plots.len(), 1);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_an_inflight_fetch_with_noise_clears_loading() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        let mut rx = engine.subscribe();

        load(&engine, bounds_a()).await;

        repo.hang_list.store(true, Ordering::SeqCst);
        engine.on_bounds_changed(MapBounds::new(60.0, 50.0, 60.0, 50.0));
        rx.wait_for(|s| s.loading).await.unwrap();

        // Sub-threshold jitter around the committed viewport resolves as
        // noise but still has to clear the superseded fetch's loading flag.
        engine.on_bounds_changed(MapBounds::new(10.001, 0.001, 10.001, 0.001));
        engine.wait_idle().await;

        let snapshot = engine.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.last_bounds, Some(bounds_a()));
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pan_back_hits_cache() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        let away = MapBounds::new(60.0, 50.0, 60.0, 50.0);

        load(&engine, bounds_a()).await;
        load(&engine, away).await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);

        // Returning to the first viewport is served from cache.
        load(&engine, bounds_a()).await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.snapshot().plots.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_expiry_forces_refetch() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        let away = MapBounds::new(60.0, 50.0, 60.0, 50.0);

        load(&engine, bounds_a()).await;
        load(&engine, away).await;

        tokio::time::advance(EngineConfig::default().cache_ttl + Duration::from_secs(1)).await;
        load(&engine, bounds_a()).await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_keeps_previous_plots() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());

        load(&engine, bounds_a()).await;
        assert_eq!(engine.snapshot().plots.len(), 1);

        repo.fail_list.store(true, Ordering::SeqCst);
        load(&engine, MapBounds::new(60.0, 50.0, 60.0, 50.0)).await;

        let snapshot = engine.snapshot();
        assert!(snapshot.error.is_some());
        assert_eq!(snapshot.plots.len(), 1);
        // The failed viewport was never committed.
        assert_eq!(snapshot.last_bounds, Some(bounds_a()));

        engine.clear_error();
        assert!(engine.snapshot().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn filters_changed_refetches_last_viewport() {
        let repo = Arc::new(MockRepo::with_plots(vec![
            plot(1, 100.0, 5.0, 5.0),
            plot(2, 900.0, 6.0, 6.0),
        ]));
        let engine = engine_with(repo.clone());

        load(&engine, bounds_a()).await;
        assert_eq!(engine.snapshot().plots.len(), 2);

        engine.on_filters_changed(FilterParams {
            max_price: Some(500.0),
            ..FilterParams::default()
        });
        engine.wait_idle().await;

        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.plots.len(), 1);
        assert_eq!(snapshot.plots[0].id, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_invalid_price_before_optimistic_insert() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        load(&engine, bounds_a()).await;

        let result = engine.create_plot(plot(0, -5.0, 5.0, 5.0)).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(engine.snapshot().plots.len(), 1);
        assert_eq!(repo.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_success_replaces_temp_and_clears_cache() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        let away = MapBounds::new(60.0, 50.0, 60.0, 50.0);

        load(&engine, bounds_a()).await;
        let created = engine.create_plot(plot(0, 250.0, 4.0, 4.0)).await.unwrap();
        assert!(created.id.unwrap() >= 1000);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.plots.len(), 2);
        assert!(snapshot.plots.iter().all(|p| p.id.unwrap() > 0));

        // The cache was invalidated: returning to a previously cached
        // viewport goes back to the repository.
        load(&engine, away).await;
        load(&engine, bounds_a()).await;
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn create_failure_removes_temp_record() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        load(&engine, bounds_a()).await;

        repo.fail_create.store(true, Ordering::SeqCst);
        let result = engine.create_plot(plot(0, 250.0, 4.0, 4.0)).await;
        assert!(matches!(result, Err(EngineError::Repository(_))));
        assert_eq!(engine.snapshot().plots.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_failure_rolls_back_to_exact_snapshot() {
        let repo = Arc::new(MockRepo::with_plots(vec![
            plot(1, 100.0, 5.0, 5.0),
            plot(2, 200.0, 6.0, 6.0),
        ]));
        let engine = engine_with(repo.clone());
        load(&engine, bounds_a()).await;
        let before = engine.snapshot().plots;

        repo.fail_update.store(true, Ordering::SeqCst);
        let result = engine.update_plot(2, plot(2, 999.0, 6.0, 6.0)).await;

        assert!(matches!(result, Err(EngineError::Repository(_))));
        assert_eq!(engine.snapshot().plots, before);
    }

    #[tokio::test(start_paused = true)]
    async fn update_unknown_id_is_not_found() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo);
        load(&engine, bounds_a()).await;

        let result = engine.update_plot(42, plot(42, 10.0, 5.0, 5.0)).await;
        assert!(matches!(result, Err(EngineError::NotFound { id: 42 })));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_failure_restores_record_at_original_position() {
        let repo = Arc::new(MockRepo::with_plots(vec![
            plot(1, 100.0, 5.0, 5.0),
            plot(2, 200.0, 6.0, 6.0),
            plot(3, 300.0, 7.0, 7.0),
        ]));
        let engine = engine_with(repo.clone());
        load(&engine, bounds_a()).await;
        let before = engine.snapshot().plots;

        repo.fail_delete.store(true, Ordering::SeqCst);
        let result = engine.delete_plot(2).await;

        assert!(matches!(result, Err(EngineError::Repository(_))));
        assert_eq!(engine.snapshot().plots, before);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_success_removes_record() {
        let repo = Arc::new(MockRepo::with_plots(vec![
            plot(1, 100.0, 5.0, 5.0),
            plot(2, 200.0, 6.0, 6.0),
        ]));
        let engine = engine_with(repo.clone());
        load(&engine, bounds_a()).await;

        engine.delete_plot(1).await.unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.plots.len(), 1);
        assert_eq!(snapshot.plots[0].id, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_fetch_does_not_clear_non_empty_list() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 100.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());

        load(&engine, bounds_a()).await;
        assert_eq!(engine.snapshot().plots.len(), 1);

        // An area with no plots at all.
        load(&engine, MapBounds::new(60.0, 50.0, 60.0, 50.0)).await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.plots.len(), 1);
        assert_eq!(snapshot.last_bounds, Some(MapBounds::new(60.0, 50.0, 60.0, 50.0)));
        // Statistics still rescope to the new (empty) viewport.
        assert_eq!(snapshot.stats.total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_recomputes_stats_in_new_currency() {
        let repo = Arc::new(MockRepo::with_plots(vec![plot(1, 1000.0, 5.0, 5.0)]));
        let engine = engine_with(repo.clone());
        load(&engine, bounds_a()).await;
        assert!((engine.stats().average_price - 1000.0).abs() < 1e-9);

        engine.on_settings_changed(ViewSettings {
            currency: plot_pulse_currency::Currency::Usd,
            area_unit: PriceUnit::PerSqft,
        });
        engine.wait_idle().await;

        // 1000 INR at the static 0.012 rate.
        assert!((engine.stats().average_price - 12.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn nearest_none_is_a_defined_empty_result() {
        let repo = Arc::new(MockRepo::with_plots(vec![]));
        let engine = engine_with(repo);
        let result = engine
            .find_nearest(&NearestPlotRequest {
                latitude: 5.0,
                longitude: 5.0,
                radius: 1000.0,
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
