#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! API request and response types for the plots server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the core plot types to allow independent evolution of the API
//! contract.

use chrono::{DateTime, Utc};
use plot_pulse_filter::{FilterParams, SaleStatus};
use plot_pulse_geo::MapBounds;
use serde::{Deserialize, Serialize};

/// Default page size for bounds queries when the client omits `size`.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Upper bound on `size` to keep a single response reasonable.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body returned for non-success responses.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Human-readable error message.
    pub message: String,
}

impl ApiError {
    /// Builds an error body from any displayable error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query parameters for the bounds listing endpoint.
///
/// Viewport edges are required; everything else refines the result. The
/// filter fields mirror the client-side filter params so a server round
/// trip and a local refinement agree on semantics.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundsQueryParams {
    /// Southern latitude edge.
    pub min_lat: f64,
    /// Northern latitude edge.
    pub max_lat: f64,
    /// Western longitude edge.
    pub min_lng: f64,
    /// Eastern longitude edge.
    pub max_lng: f64,
    /// Zero-based page index.
    pub page: Option<u32>,
    /// Page size, capped at [`MAX_PAGE_SIZE`].
    pub size: Option<u32>,
    /// Inclusive minimum price.
    pub min_price: Option<f64>,
    /// Inclusive maximum price.
    pub max_price: Option<f64>,
    /// Sale-status constraint.
    pub status: Option<SaleStatus>,
    /// Inclusive start of the creation-date window (ISO 8601).
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive end of the creation-date window (ISO 8601).
    pub date_to: Option<DateTime<Utc>>,
    /// Latitude of the location-filter center.
    pub center_lat: Option<f64>,
    /// Longitude of the location-filter center.
    pub center_lng: Option<f64>,
    /// Location-filter radius in meters.
    pub radius: Option<f64>,
    /// Case-insensitive description substring.
    pub search: Option<String>,
}

impl BoundsQueryParams {
    /// The requested viewport.
    #[must_use]
    pub const fn bounds(&self) -> MapBounds {
        MapBounds::new(self.max_lat, self.min_lat, self.max_lng, self.min_lng)
    }

    /// The filter params carried alongside the viewport.
    #[must_use]
    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            min_price: self.min_price,
            max_price: self.max_price,
            status: self.status,
            date_from: self.date_from,
            date_to: self.date_to,
            center_lat: self.center_lat,
            center_lng: self.center_lng,
            radius_m: self.radius,
            search: self.search.clone(),
        }
    }

    /// Zero-based page index, defaulting to the first page.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    /// Effective page size, clamped to [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }
}

/// Query parameters for plain paged listings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    /// Zero-based page index.
    pub page: Option<u32>,
    /// Page size, capped at [`MAX_PAGE_SIZE`].
    pub size: Option<u32>,
}

impl PageParams {
    /// Zero-based page index, defaulting to the first page.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    /// Effective page size, clamped to [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }
}

/// Query parameters for the nearest-plot endpoint.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestQueryParams {
    /// Search center latitude.
    pub lat: f64,
    /// Search center longitude.
    pub lon: f64,
    /// Search radius in meters.
    pub radius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_query_maps_edges_and_defaults() {
        let params = BoundsQueryParams {
            min_lat: 0.0,
            max_lat: 10.0,
            min_lng: 70.0,
            max_lng: 80.0,
            page: None,
            size: Some(5000),
            min_price: Some(50.0),
            max_price: None,
            status: Some(SaleStatus::ForSale),
            date_from: None,
            date_to: None,
            center_lat: Some(9.9),
            center_lng: None,
            radius: None,
            search: None,
        };

        let bounds = params.bounds();
        assert!((bounds.north - 10.0).abs() < f64::EPSILON);
        assert!((bounds.west - 70.0).abs() < f64::EPSILON);
        assert_eq!(params.page(), 0);
        assert_eq!(params.size(), MAX_PAGE_SIZE);

        let filters = params.filter_params();
        assert_eq!(filters.status, Some(SaleStatus::ForSale));
        assert_eq!(filters.center_lat, Some(9.9));
        assert_eq!(filters.center_lng, None);
    }
}
