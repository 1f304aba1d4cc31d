#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Viewport-driven plot data engine.
//!
//! [`PlotDataEngine`] owns the in-memory plot list visible on the map and
//! everything that keeps it current: the debounced viewport fetch
//! pipeline with zoom-in reuse and pan thresholds, the bounded TTL cache
//! of viewport snapshots, client-side filter refinement, and optimistic
//! create/update/delete with rollback.
//!
//! Consumers subscribe to immutable [`ViewSnapshot`]s through a watch
//! channel and re-render on each published transition. Only the latest
//! viewport matters: a new bounds or filter event supersedes any pending
//! debounce timer or in-flight fetch, and a superseded fetch's result is
//! discarded silently, never surfaced as an error.

mod engine;
mod stats;

use plot_pulse_client::PlotRepositoryError;
use plot_pulse_currency::Currency;
use plot_pulse_plot_models::{PlotValidationError, PriceUnit};
use thiserror::Error;
use tokio::time::Duration;

pub use engine::{FetchPhase, PlotDataEngine};
pub use stats::{PlotStats, ViewSnapshot};

/// Tunable engine parameters.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Quiet period after the last viewport/filter event before acting.
    pub debounce: Duration,
    /// Minimum per-edge bounds movement (degrees) that counts as a pan.
    pub bounds_threshold: f64,
    /// Cache entry time-to-live.
    pub cache_ttl: Duration,
    /// Maximum number of cache entries.
    pub cache_max_size: usize,
    /// Page size for bounds queries.
    pub page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            bounds_threshold: 0.005,
            cache_ttl: plot_pulse_cache::DEFAULT_TTL,
            cache_max_size: plot_pulse_cache::DEFAULT_MAX_SIZE,
            page_size: plot_pulse_client::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Viewer display settings the engine normalizes prices through.
///
/// Settings are external state that may change at any time; derived
/// aggregates are recomputed wholesale on every change, never patched
/// incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    /// Display currency.
    pub currency: Currency,
    /// Area unit prices are compared and displayed in.
    pub area_unit: PriceUnit,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            currency: Currency::Inr,
            area_unit: PriceUnit::PerSqft,
        }
    }
}

/// Errors surfaced by engine operations.
///
/// None of these are fatal: validation and repository failures are
/// reported to the caller for display, and mutation failures always roll
/// local state back first.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record was rejected before any optimistic state change.
    #[error("validation failed: {0}")]
    Validation(#[from] PlotValidationError),

    /// No plot with this id is in the visible list.
    #[error("plot {id} not found")]
    NotFound {
        /// The missing plot id.
        id: i64,
    },

    /// The repository rejected or failed the operation.
    #[error(transparent)]
    Repository(#[from] PlotRepositoryError),
}
