//! Derived viewport statistics and the published snapshot type.

use plot_pulse_currency::{Currency, RateTable};
use plot_pulse_geo::MapBounds;
use plot_pulse_plot_models::Plot;

use crate::ViewSettings;

/// Summary statistics for the plots inside the current viewport.
///
/// Scoped to the last known bounds rather than the full fetched set,
/// since a fetch may return slightly more than the exact viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlotStats {
    /// Plots inside the viewport.
    pub total: usize,
    /// Of those, currently for sale.
    pub for_sale: usize,
    /// Of those, not for sale.
    pub not_for_sale: usize,
    /// Mean price normalized to the active area unit and display
    /// currency; 0 when no plot has a positive price.
    pub average_price: f64,
}

/// An immutable view of the engine state, published on every transition.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    /// The visible plot list.
    pub plots: Vec<Plot>,
    /// Whether a viewport fetch is in flight.
    pub loading: bool,
    /// Last fetch or mutation error, if unacknowledged.
    pub error: Option<String>,
    /// The last committed viewport bounds.
    pub last_bounds: Option<MapBounds>,
    /// Viewport-scoped statistics.
    pub stats: PlotStats,
    /// Monotonic publish counter.
    pub seq: u64,
}

/// Recomputes viewport statistics from scratch.
///
/// Prices are normalized to the settings' area unit and currency before
/// averaging; non-positive prices are left out of the mean.
#[must_use]
pub(crate) fn compute_stats(
    plots: &[Plot],
    bounds: Option<&MapBounds>,
    settings: ViewSettings,
    rates: &RateTable,
) -> PlotStats {
    let in_view = plots
        .iter()
        .filter(|p| bounds.is_none_or(|b| b.contains_point(p.latitude, p.longitude)));

    let mut stats = PlotStats::default();
    let mut price_sum = 0.0;
    let mut price_count = 0usize;

    for plot in in_view {
        stats.total += 1;
        if plot.is_for_sale {
            stats.for_sale += 1;
        } else {
            stats.not_for_sale += 1;
        }
        if plot.price > 0.0 {
            let in_unit = plot.price_in_unit(settings.area_unit);
            price_sum += rates.convert(in_unit, Currency::Inr, settings.currency);
            price_count += 1;
        }
    }

    if price_count > 0 {
        #[allow(clippy::cast_precision_loss)]
        {
            stats.average_price = price_sum / price_count as f64;
        }
    }
    stats
}
