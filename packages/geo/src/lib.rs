#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Viewport rectangle math and great-circle distance.
//!
//! `MapBounds` is the rectangular lat/lng region currently visible on the
//! map. Bounds that cross the ±180° antimeridian are not supported; the
//! map frontends this system serves never produce them.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, as used by the Haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic viewport rectangle in WGS84 coordinates.
///
/// Invariant: `north >= south`. East/west antimeridian wraparound is a
/// documented non-feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapBounds {
    /// Northern latitude boundary.
    pub north: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Western longitude boundary.
    pub west: f64,
}

impl MapBounds {
    /// Creates a new bounds rectangle from the given edges.
    #[must_use]
    pub const fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Returns `true` if the point lies inside or on the rectangle.
    #[must_use]
    pub fn contains_point(&self, latitude: f64, longitude: f64) -> bool {
        latitude <= self.north
            && latitude >= self.south
            && longitude <= self.east
            && longitude >= self.west
    }

    /// Returns `true` if `other` lies entirely within this rectangle.
    ///
    /// A viewport contained in the last-fetched viewport (pure zoom-in)
    /// means the already-loaded superset of plots is still valid.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.north <= self.north
            && other.south >= self.south
            && other.east <= self.east
            && other.west >= self.west
    }

    /// Largest absolute per-edge difference against another rectangle.
    #[must_use]
    pub fn max_edge_delta(&self, other: &Self) -> f64 {
        let north = (self.north - other.north).abs();
        let south = (self.south - other.south).abs();
        let east = (self.east - other.east).abs();
        let west = (self.west - other.west).abs();
        north.max(south).max(east).max(west)
    }

    /// Returns `true` if any edge moved by more than `threshold` degrees.
    #[must_use]
    pub fn differs_from(&self, other: &Self, threshold: f64) -> bool {
        self.max_edge_delta(other) > threshold
    }

    /// Center point of the rectangle as `(latitude, longitude)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::midpoint(self.north, self.south),
            f64::midpoint(self.east, self.west),
        )
    }
}

/// Great-circle distance between two points in meters (Haversine).
#[must_use]
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
