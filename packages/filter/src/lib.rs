#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Filter state, query-parameter projection, and the pure filter engine.
//!
//! [`PlotFilters`] is the user-facing filter set (relative date windows,
//! radius in kilometers). [`FilterParams`] is its projection into absolute
//! server query parameters (ISO date bounds, radius in meters) with
//! explicit presence semantics: an absent `Option` means "no constraint",
//! never "zero". The same params drive both the server-side query and the
//! client-side refinement in [`apply`], which is where currency- and
//! area-unit-dependent price comparison happens.

use chrono::{DateTime, Duration, Utc};
use plot_pulse_currency::{Currency, RateTable};
use plot_pulse_geo::haversine_distance_m;
use plot_pulse_plot_models::{Plot, PriceUnit};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Sale-status constraint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaleStatus {
    /// Keep only plots currently for sale.
    ForSale,
    /// Keep only plots not for sale.
    NotForSale,
}

/// Relative date window for the "date added" filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DateAddedFilter {
    /// No date constraint.
    #[default]
    All,
    /// Listed today (midnight to midnight).
    Today,
    /// Listed within the last 7 days.
    Week,
    /// Listed within the last 30 days.
    Month,
    /// Listed within the last 182 days.
    HalfYear,
    /// Listed within the last 365 days.
    Year,
    /// Custom absolute range supplied alongside the filter set.
    Custom,
}

/// Price range constraint in the viewer's display currency and area unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    /// Inclusive lower bound; `None` = unconstrained.
    pub min: Option<f64>,
    /// Inclusive upper bound; `None` = unconstrained.
    pub max: Option<f64>,
}

/// Radius-from-center constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFilter {
    /// Whether the constraint is active.
    pub enabled: bool,
    /// Search radius in kilometers.
    pub radius_km: f64,
    /// Center point as `(latitude, longitude)`; the constraint is inert
    /// until a center is known.
    pub center: Option<(f64, f64)>,
}

impl Default for LocationFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            radius_km: 5.0,
            center: None,
        }
    }
}

/// Custom absolute date range for [`DateAddedFilter::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDateRange {
    /// Inclusive start.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive end.
    pub to: Option<DateTime<Utc>>,
}

/// The user-facing filter set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotFilters {
    /// Price range in the display currency and area unit.
    pub price_range: PriceRange,
    /// Sale-status constraint; `None` = all.
    pub status: Option<SaleStatus>,
    /// Relative date window.
    pub date_added: DateAddedFilter,
    /// Absolute range used when `date_added` is `Custom`.
    pub custom_date_range: CustomDateRange,
    /// Radius-from-center constraint.
    pub location: LocationFilter,
    /// Free-text search over descriptions.
    pub search_query: String,
}

impl PlotFilters {
    /// Returns `true` if any constraint is active.
    #[must_use]
    pub fn has_active_filters(&self) -> bool {
        self.active_filter_count() > 0
    }

    /// Number of active constraint groups (for filter-badge display).
    #[must_use]
    pub fn active_filter_count(&self) -> usize {
        let mut count = 0;
        if self.price_range.min.is_some() || self.price_range.max.is_some() {
            count += 1;
        }
        if self.status.is_some() {
            count += 1;
        }
        if self.date_added != DateAddedFilter::All {
            count += 1;
        }
        if self.location.enabled {
            count += 1;
        }
        if !self.search_query.trim().is_empty() {
            count += 1;
        }
        count
    }

    /// Projects the filter set into absolute query parameters.
    ///
    /// Relative date windows are resolved against `now`, the radius is
    /// converted km→m, and blank search text is dropped. A location
    /// constraint without a center projects to nothing.
    #[must_use]
    pub fn to_params(&self, now: DateTime<Utc>) -> FilterParams {
        let mut params = FilterParams {
            min_price: self.price_range.min,
            max_price: self.price_range.max,
            status: self.status,
            ..FilterParams::default()
        };

        let (from, to) = self.date_window(now);
        params.date_from = from;
        params.date_to = to;

        if self.location.enabled
            && let Some((lat, lng)) = self.location.center
        {
            params.center_lat = Some(lat);
            params.center_lng = Some(lng);
            params.radius_m = Some(self.location.radius_km * 1000.0);
        }

        let query = self.search_query.trim();
        if !query.is_empty() {
            params.search = Some(query.to_string());
        }

        params
    }

    fn date_window(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc());

        match self.date_added {
            DateAddedFilter::All => (None, None),
            DateAddedFilter::Today => (midnight, midnight.map(|m| m + Duration::days(1))),
            DateAddedFilter::Week => (Some(now - Duration::days(7)), Some(now)),
            DateAddedFilter::Month => (Some(now - Duration::days(30)), Some(now)),
            DateAddedFilter::HalfYear => (Some(now - Duration::days(182)), Some(now)),
            DateAddedFilter::Year => (Some(now - Duration::days(365)), Some(now)),
            DateAddedFilter::Custom => (self.custom_date_range.from, self.custom_date_range.to),
        }
    }
}

/// Absolute filter query parameters with explicit presence semantics.
///
/// Every field is optional; `None` always means "no constraint on this
/// axis". Prices are in the viewer's display currency and area unit, the
/// radius is in meters, and date bounds are absolute UTC instants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    /// Inclusive minimum price.
    pub min_price: Option<f64>,
    /// Inclusive maximum price.
    pub max_price: Option<f64>,
    /// Sale-status constraint.
    pub status: Option<SaleStatus>,
    /// Inclusive start of the creation-date window.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive end of the creation-date window.
    pub date_to: Option<DateTime<Utc>>,
    /// Radius-constraint center latitude.
    pub center_lat: Option<f64>,
    /// Radius-constraint center longitude.
    pub center_lng: Option<f64>,
    /// Radius in meters.
    pub radius_m: Option<f64>,
    /// Case-insensitive description substring.
    pub search: Option<String>,
}

impl FilterParams {
    /// Returns `true` if no constraint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min_price.is_none()
            && self.max_price.is_none()
            && self.status.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.center_lat.is_none()
            && self.center_lng.is_none()
            && self.radius_m.is_none()
            && self.search.is_none()
    }

    /// Deterministic serialization used as the filter half of cache keys.
    ///
    /// Field order is fixed and absent fields render as `-`, so two
    /// identical filter sets always produce identical fingerprints.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fn opt_f64(value: Option<f64>) -> String {
            value.map_or_else(|| "-".to_string(), |v| format!("{v}"))
        }
        fn opt_date(value: Option<DateTime<Utc>>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.timestamp_millis().to_string())
        }

        format!(
            "min={};max={};status={};from={};to={};lat={};lng={};rad={};q={}",
            opt_f64(self.min_price),
            opt_f64(self.max_price),
            self.status
                .map_or_else(|| "-".to_string(), |s| s.to_string()),
            opt_date(self.date_from),
            opt_date(self.date_to),
            opt_f64(self.center_lat),
            opt_f64(self.center_lng),
            opt_f64(self.radius_m),
            self.search.as_deref().unwrap_or("-"),
        )
    }

    /// Renders the params as URL query pairs for the plots API.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(min) = self.min_price {
            pairs.push(("minPrice", min.to_string()));
        }
        if let Some(max) = self.max_price {
            pairs.push(("maxPrice", max.to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(from) = self.date_from {
            pairs.push(("dateFrom", from.to_rfc3339()));
        }
        if let Some(to) = self.date_to {
            pairs.push(("dateTo", to.to_rfc3339()));
        }
        if let Some(lat) = self.center_lat {
            pairs.push(("centerLat", lat.to_string()));
        }
        if let Some(lng) = self.center_lng {
            pairs.push(("centerLng", lng.to_string()));
        }
        if let Some(radius) = self.radius_m {
            pairs.push(("radius", radius.to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }
}

/// Display settings the price comparison normalizes through.
#[derive(Debug, Clone, Copy)]
pub struct DisplayContext<'a> {
    /// Target area unit prices are compared in.
    pub unit: PriceUnit,
    /// Display currency prices are compared in.
    pub currency: Currency,
    /// Exchange-rate snapshot for the currency conversion.
    pub rates: &'a RateTable,
}

impl<'a> DisplayContext<'a> {
    /// Creates a context for the given settings and rate snapshot.
    #[must_use]
    pub const fn new(unit: PriceUnit, currency: Currency, rates: &'a RateTable) -> Self {
        Self {
            unit,
            currency,
            rates,
        }
    }

    /// A plot's price normalized to this context's unit and currency.
    #[must_use]
    pub fn normalized_price(&self, plot: &Plot) -> f64 {
        let in_unit = plot.price_in_unit(self.unit);
        self.rates.convert(in_unit, Currency::Inr, self.currency)
    }
}

/// Applies the filter params to a plot list, returning the matches.
///
/// Pure and idempotent: all active predicates are ANDed, and re-applying
/// the same params to its own output is a no-op. Price bounds compare
/// against the plot price normalized through `ctx`. A plot without a
/// `created_at` is excluded while a date constraint is active. Plots
/// without a description never match a non-empty search.
#[must_use]
pub fn apply(plots: &[Plot], params: &FilterParams, ctx: &DisplayContext<'_>) -> Vec<Plot> {
    plots
        .iter()
        .filter(|plot| matches(plot, params, ctx))
        .cloned()
        .collect()
}

/// Returns `true` if a single plot satisfies every active predicate.
#[must_use]
pub fn matches(plot: &Plot, params: &FilterParams, ctx: &DisplayContext<'_>) -> bool {
    if params.min_price.is_some() || params.max_price.is_some() {
        let price = ctx.normalized_price(plot);
        if params.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if params.max_price.is_some_and(|max| price > max) {
            return false;
        }
    }

    if let Some(status) = params.status {
        let wanted = status == SaleStatus::ForSale;
        if plot.is_for_sale != wanted {
            return false;
        }
    }

    if params.date_from.is_some() || params.date_to.is_some() {
        // No creation timestamp means the plot cannot satisfy an active
        // date window.
        let Some(created_at) = plot.created_at else {
            return false;
        };
        if params.date_from.is_some_and(|from| created_at < from) {
            return false;
        }
        if params.date_to.is_some_and(|to| created_at >= to) {
            return false;
        }
    }

    if let (Some(lat), Some(lng), Some(radius)) =
        (params.center_lat, params.center_lng, params.radius_m)
    {
        let distance = haversine_distance_m(plot.latitude, plot.longitude, lat, lng);
        if distance > radius {
            return false;
        }
    }

    if let Some(query) = &params.search {
        let Some(description) = &plot.description else {
            return false;
        };
        if !description.to_lowercase().contains(&query.to_lowercase()) {
            return false;
        }
    }

    true
}
