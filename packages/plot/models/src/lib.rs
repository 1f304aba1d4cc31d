#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Plot listing types and price-unit conversions.
//!
//! This crate defines the canonical land-plot record shared across the
//! entire plot-pulse system, along with the price-unit conversion table
//! that every cross-plot price comparison must normalize through. A price
//! is meaningless without its unit; comparing or averaging raw `price`
//! fields across plots with different units is always a bug.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Maximum length of a plot description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// The area unit a plot price is denominated in.
///
/// All per-area conversions go through a square-foot base. `Total` prices
/// carry no area denominator and convert with factor 1, matching the
/// behavior of the original listing service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PriceUnit {
    /// Price per square foot.
    PerSqft,
    /// Price per square meter.
    PerSqm,
    /// Price per cent (1/100 acre, common in South Asian land markets).
    PerCent,
    /// Price per acre.
    PerAcre,
    /// Price per hectare.
    PerHectare,
    /// Total price for the whole parcel.
    Total,
}

impl PriceUnit {
    /// Conversion factor from this unit's area to square feet.
    #[must_use]
    pub const fn sqft_factor(self) -> f64 {
        match self {
            Self::PerSqft | Self::Total => 1.0,
            Self::PerSqm => 10.764,
            Self::PerCent => 435.6,
            Self::PerAcre => 43_560.0,
            Self::PerHectare => 107_639.0,
        }
    }

    /// Short label for marker and cluster display (e.g. `/sqft`).
    #[must_use]
    pub const fn short_label(self) -> &'static str {
        match self {
            Self::PerSqft => "/sqft",
            Self::PerSqm => "/sqm",
            Self::PerCent => "/cent",
            Self::PerAcre => "/acre",
            Self::PerHectare => "/hectare",
            Self::Total => "total",
        }
    }

    /// Human-readable label for forms and settings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PerSqft => "Per Square Foot",
            Self::PerSqm => "Per Square Meter",
            Self::PerCent => "Per Cent",
            Self::PerAcre => "Per Acre",
            Self::PerHectare => "Per Hectare",
            Self::Total => "Total",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::PerSqft,
            Self::PerSqm,
            Self::PerCent,
            Self::PerAcre,
            Self::PerHectare,
            Self::Total,
        ]
    }
}

/// Converts a price from one area unit to another.
///
/// The price is first divided by the source unit's square-foot factor to
/// obtain a price per square foot, then multiplied by the target unit's
/// factor.
#[must_use]
pub fn convert_price(price: f64, from: PriceUnit, to: PriceUnit) -> f64 {
    price / from.sqft_factor() * to.sqft_factor()
}

/// A land-parcel listing.
///
/// `id` is assigned server-side and absent for unconfirmed creations;
/// optimistic creations carry a negative temporary id until the server
/// confirms. Timestamps are server-assigned and absent until persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plot {
    /// Server-assigned unique id; negative values are client temporaries.
    pub id: Option<i64>,
    /// Asking price, denominated in `price_unit`.
    pub price: f64,
    /// The unit `price` is expressed in.
    pub price_unit: PriceUnit,
    /// Whether the parcel is currently for sale.
    pub is_for_sale: bool,
    /// Optional free-text description, at most [`MAX_DESCRIPTION_LEN`] chars.
    pub description: Option<String>,
    /// Latitude in decimal degrees (WGS84), in `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in decimal degrees (WGS84), in `[-180, 180]`.
    pub longitude: f64,
    /// When the listing was created (server-assigned).
    pub created_at: Option<DateTime<Utc>>,
    /// When the listing was last updated (server-assigned).
    pub updated_at: Option<DateTime<Utc>>,
}

impl Plot {
    /// Validates the record against the listing constraints.
    ///
    /// Runs before any optimistic mutation: an invalid plot must be
    /// rejected before local state changes.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), PlotValidationError> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(PlotValidationError::InvalidPrice { price: self.price });
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(PlotValidationError::InvalidLatitude {
                latitude: self.latitude,
            });
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(PlotValidationError::InvalidLongitude {
                longitude: self.longitude,
            });
        }
        if let Some(description) = &self.description
            && description.chars().count() > MAX_DESCRIPTION_LEN
        {
            return Err(PlotValidationError::DescriptionTooLong {
                len: description.chars().count(),
            });
        }
        Ok(())
    }

    /// Price normalized to the given area unit.
    #[must_use]
    pub fn price_in_unit(&self, unit: PriceUnit) -> f64 {
        convert_price(self.price, self.price_unit, unit)
    }
}

/// A listing constraint violation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlotValidationError {
    /// Price must be a positive finite number.
    #[error("invalid price {price}: must be positive and finite")]
    InvalidPrice {
        /// The rejected price.
        price: f64,
    },

    /// Latitude out of the WGS84 range.
    #[error("invalid latitude {latitude}: expected [-90, 90]")]
    InvalidLatitude {
        /// The rejected latitude.
        latitude: f64,
    },

    /// Longitude out of the WGS84 range.
    #[error("invalid longitude {longitude}: expected [-180, 180]")]
    InvalidLongitude {
        /// The rejected longitude.
        longitude: f64,
    },

    /// Description exceeds [`MAX_DESCRIPTION_LEN`] characters.
    #[error("description too long: {len} chars, max {MAX_DESCRIPTION_LEN}")]
    DescriptionTooLong {
        /// Actual description length in characters.
        len: usize,
    },
}

/// Parameters for a nearest-plot lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestPlotRequest {
    /// Query point latitude.
    pub latitude: f64,
    /// Query point longitude.
    pub longitude: f64,
    /// Search radius in meters.
    pub radius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plot(price: f64, unit: PriceUnit) -> Plot {
        Plot {
            id: Some(1),
            price,
            price_unit: unit,
            is_for_sale: true,
            description: None,
            latitude: 9.93,
            longitude: 76.26,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn conversion_round_trip_within_tolerance() {
        let original = 1234.56;
        for &from in PriceUnit::all() {
            for &to in PriceUnit::all() {
                let there = convert_price(original, from, to);
                let back = convert_price(there, to, from);
                let relative = ((back - original) / original).abs();
                assert!(
                    relative < 1e-6,
                    "{from:?} -> {to:?} -> {from:?} drifted by {relative}"
                );
            }
        }
    }

    #[test]
    fn acre_to_cent_factor() {
        // 1 acre = 100 cents, so a per-acre price spread over cents is 1/100.
        let per_cent = convert_price(100_000.0, PriceUnit::PerAcre, PriceUnit::PerCent);
        assert!((per_cent - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_non_positive_price() {
        assert_eq!(
            plot(-5.0, PriceUnit::PerSqft).validate(),
            Err(PlotValidationError::InvalidPrice { price: -5.0 })
        );
        assert_eq!(
            plot(0.0, PriceUnit::PerSqft).validate(),
            Err(PlotValidationError::InvalidPrice { price: 0.0 })
        );
        assert!(plot(f64::NAN, PriceUnit::PerSqft).validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_coordinates() {
        let mut p = plot(10.0, PriceUnit::PerSqft);
        p.latitude = 90.5;
        assert!(matches!(
            p.validate(),
            Err(PlotValidationError::InvalidLatitude { .. })
        ));

        let mut p = plot(10.0, PriceUnit::PerSqft);
        p.longitude = -180.5;
        assert!(matches!(
            p.validate(),
            Err(PlotValidationError::InvalidLongitude { .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_description() {
        let mut p = plot(10.0, PriceUnit::PerSqft);
        p.description = Some("x".repeat(MAX_DESCRIPTION_LEN + 1));
        assert!(matches!(
            p.validate(),
            Err(PlotValidationError::DescriptionTooLong { .. })
        ));

        p.description = Some("x".repeat(MAX_DESCRIPTION_LEN));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn price_unit_serializes_snake_case() {
        let json = serde_json::to_string(&PriceUnit::PerSqft).unwrap();
        assert_eq!(json, "\"per_sqft\"");
        assert_eq!(PriceUnit::PerHectare.to_string(), "per_hectare");
        assert_eq!("per_cent".parse::<PriceUnit>().unwrap(), PriceUnit::PerCent);
    }
}
