//! In-memory plot store backing the REST API.
//!
//! Records live in a concurrent map keyed by id; ids and timestamps are
//! assigned server-side on insert. Bounds queries evaluate the same
//! filter semantics the client refines with, against raw stored values.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use plot_pulse_filter::{FilterParams, SaleStatus};
use plot_pulse_geo::{MapBounds, haversine_distance_m};
use plot_pulse_plot_models::Plot;

/// Concurrent in-memory plot store.
pub struct PlotStore {
    plots: DashMap<i64, Plot>,
    next_id: AtomicI64,
}

impl Default for PlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plots: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Inserts a new plot, assigning its id and creation timestamp.
    pub fn insert(&self, plot: Plot) -> Plot {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = Plot {
            id: Some(id),
            created_at: Some(Utc::now()),
            updated_at: None,
            ..plot
        };
        self.plots.insert(id, stored.clone());
        stored
    }

    /// Replaces the plot with the given id, bumping its update timestamp.
    /// Returns `None` when the id is unknown.
    pub fn update(&self, id: i64, plot: Plot) -> Option<Plot> {
        let mut entry = self.plots.get_mut(&id)?;
        let stored = Plot {
            id: Some(id),
            created_at: entry.created_at,
            updated_at: Some(Utc::now()),
            ..plot
        };
        *entry = stored.clone();
        Some(stored)
    }

    /// Removes the plot with the given id. Returns `false` when the id is
    /// unknown.
    pub fn remove(&self, id: i64) -> bool {
        self.plots.remove(&id).is_some()
    }

    /// Fetches a plot by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Plot> {
        self.plots.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of stored plots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plots.len()
    }

    /// Returns `true` if the store holds no plots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Lists all plots, ordered by id for stable pagination.
    #[must_use]
    pub fn list(&self, page: u32, size: u32) -> Vec<Plot> {
        let mut all: Vec<Plot> = self
            .plots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|p| p.id);

        all.into_iter()
            .skip(page as usize * size as usize)
            .take(size as usize)
            .collect()
    }

    /// Lists the plots inside the bounds that match the filter params,
    /// ordered by id for stable pagination.
    #[must_use]
    pub fn query(
        &self,
        bounds: &MapBounds,
        params: &FilterParams,
        page: u32,
        size: u32,
    ) -> Vec<Plot> {
        let mut matched: Vec<Plot> = self
            .plots
            .iter()
            .filter(|entry| {
                bounds.contains_point(entry.latitude, entry.longitude)
                    && matches(entry.value(), params)
            })
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|p| p.id);

        matched
            .into_iter()
            .skip(page as usize * size as usize)
            .take(size as usize)
            .collect()
    }

    /// Finds the closest plot within `radius_m` meters of the point.
    #[must_use]
    pub fn nearest(&self, latitude: f64, longitude: f64, radius_m: f64) -> Option<Plot> {
        self.plots
            .iter()
            .filter_map(|entry| {
                let distance =
                    haversine_distance_m(latitude, longitude, entry.latitude, entry.longitude);
                (distance <= radius_m).then(|| (distance, entry.value().clone()))
            })
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, plot)| plot)
    }
}

/// Server-side filter evaluation against raw stored values.
///
/// Semantics mirror the client's refinement: inclusive price bounds, a
/// half-open `[from, to)` date window that excludes records without a
/// creation timestamp, a haversine radius, and a case-insensitive
/// description substring.
fn matches(plot: &Plot, params: &FilterParams) -> bool {
    if let Some(min) = params.min_price
        && plot.price < min
    {
        return false;
    }
    if let Some(max) = params.max_price
        && plot.price > max
    {
        return false;
    }

    if let Some(status) = params.status {
        let wanted = status == SaleStatus::ForSale;
        if plot.is_for_sale != wanted {
            return false;
        }
    }

    if params.date_from.is_some() || params.date_to.is_some() {
        let Some(created) = plot.created_at else {
            return false;
        };
        if let Some(from) = params.date_from
            && created < from
        {
            return false;
        }
        if let Some(to) = params.date_to
            && created >= to
        {
            return false;
        }
    }

    if let (Some(lat), Some(lng), Some(radius)) =
        (params.center_lat, params.center_lng, params.radius_m)
        && haversine_distance_m(lat, lng, plot.latitude, plot.longitude) > radius
    {
        return false;
    }

    if let Some(search) = &params.search {
        let needle = search.to_lowercase();
        let Some(description) = &plot.description else {
            return false;
        };
        if !description.to_lowercase().contains(&needle) {
            return false;
        }
    }

    true
}
