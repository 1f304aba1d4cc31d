#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Marker cluster resolution and price aggregation.
//!
//! Map SDKs hand back cluster members as bare markers (an optional id
//! plus coordinates), not as full records. [`resolve_markers`] maps those
//! markers back onto the loaded plot list, and [`summarize`] aggregates
//! the resolved plots into the average-price badge a cluster icon shows.
//!
//! Prices are aggregated in a common area unit and display currency, so
//! a cluster mixing per-acre and per-sqft listings still produces one
//! comparable average.

use plot_pulse_currency::{Currency, RateTable};
use plot_pulse_plot_models::{Plot, PriceUnit};
use serde::{Deserialize, Serialize};

/// Exact-match tolerance for marker coordinates, in degrees.
const COORD_TOLERANCE_EXACT: f64 = 1e-6;

/// Fallback tolerance for markers whose coordinates were rounded by the
/// map layer.
const COORD_TOLERANCE_LOOSE: f64 = 1e-5;

/// A cluster member as reported by the map layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMarker {
    /// The plot id, when the map layer preserved it.
    pub id: Option<i64>,
    /// Marker latitude.
    pub latitude: f64,
    /// Marker longitude.
    pub longitude: f64,
}

/// Aggregated view of a resolved cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Markers that resolved to a loaded plot.
    pub count: usize,
    /// Of those, plots with a positive price that entered the average.
    pub priced: usize,
    /// Mean price in the target unit and currency; 0 when `priced` is 0.
    pub average_price: f64,
    /// Badge text for the cluster icon.
    pub label: String,
}

/// Resolves cluster markers back onto the loaded plot list.
///
/// Resolution prefers the marker id when present; markers without an id
/// (or whose id is not loaded) fall back to coordinate matching, first
/// within [`COORD_TOLERANCE_EXACT`], then within
/// [`COORD_TOLERANCE_LOOSE`] for coordinates the map layer rounded.
/// Markers that resolve to nothing are dropped.
#[must_use]
pub fn resolve_markers<'a>(markers: &[ClusterMarker], plots: &'a [Plot]) -> Vec<&'a Plot> {
    let mut resolved = Vec::with_capacity(markers.len());
    for marker in markers {
        if let Some(plot) = resolve_marker(marker, plots) {
            resolved.push(plot);
        } else {
            log::debug!(
                "cluster marker at ({}, {}) did not resolve to a loaded plot",
                marker.latitude,
                marker.longitude,
            );
        }
    }
    resolved
}

fn resolve_marker<'a>(marker: &ClusterMarker, plots: &'a [Plot]) -> Option<&'a Plot> {
    if let Some(id) = marker.id
        && let Some(plot) = plots.iter().find(|p| p.id == Some(id))
    {
        return Some(plot);
    }
    coordinate_match(marker, plots, COORD_TOLERANCE_EXACT)
        .or_else(|| coordinate_match(marker, plots, COORD_TOLERANCE_LOOSE))
}

fn coordinate_match<'a>(
    marker: &ClusterMarker,
    plots: &'a [Plot],
    tolerance: f64,
) -> Option<&'a Plot> {
    plots.iter().find(|p| {
        (p.latitude - marker.latitude).abs() < tolerance
            && (p.longitude - marker.longitude).abs() < tolerance
    })
}

/// Aggregates a cluster into the summary its map icon displays.
///
/// Each resolved plot's price is converted to the target area unit and
/// currency before averaging; non-positive prices are excluded. When no
/// member has a usable price the label falls back to the member count.
#[must_use]
pub fn summarize(
    markers: &[ClusterMarker],
    plots: &[Plot],
    unit: PriceUnit,
    currency: Currency,
    rates: &RateTable,
) -> ClusterSummary {
    let resolved = resolve_markers(markers, plots);
    aggregate(&resolved, unit, currency, rates)
}

/// Aggregates already-resolved plots. Split out so callers that track
/// cluster membership themselves can skip marker resolution.
#[must_use]
pub fn aggregate(
    plots: &[&Plot],
    unit: PriceUnit,
    currency: Currency,
    rates: &RateTable,
) -> ClusterSummary {
    let mut sum = 0.0;
    let mut priced = 0usize;
    for plot in plots {
        if plot.price > 0.0 {
            let in_unit = plot.price_in_unit(unit);
            sum += rates.convert(in_unit, Currency::Inr, currency);
            priced += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let average_price = if priced > 0 { sum / priced as f64 } else { 0.0 };

    let label = if priced > 0 {
        // Per-area units carry their `/sqft`-style suffix; a total price
        // is just the amount.
        let suffix = match unit {
            PriceUnit::Total => "",
            _ => unit.short_label(),
        };
        format!(
            "{}{}{suffix}",
            currency.symbol(),
            short_price(average_price),
        )
    } else {
        format!("{} plots", plots.len())
    };

    ClusterSummary {
        count: plots.len(),
        priced,
        average_price,
        label,
    }
}

/// Compact price text for cluster badges.
#[allow(clippy::cast_possible_truncation)]
fn short_price(amount: f64) -> String {
    if amount >= 1_000_000.0 {
        format!("{:.1}M", amount / 1_000_000.0)
    } else if amount >= 1000.0 {
        format!("{:.1}K", amount / 1000.0)
    } else {
        format!("{}", amount.round() as i64)
    }
}
