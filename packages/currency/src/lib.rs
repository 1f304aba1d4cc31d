#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Currency codes, exchange-rate snapshots, and the rate refresh service.
//!
//! All stored prices are denominated in the base currency (INR). Display
//! conversion multiplies by a per-currency rate from an immutable
//! [`RateTable`] snapshot. Snapshots are produced by [`RateService`],
//! which refreshes from an external exchange-rate API out-of-band and
//! falls back to a static table when the API is unreachable. Consumers
//! only ever read the latest snapshot synchronously; they never mutate
//! shared rate state.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// How long a fetched rate snapshot is considered fresh, in hours.
pub const RATE_FRESHNESS_HOURS: i64 = 24;

/// Default exchange-rate API endpoint (free tier, daily updates).
pub const DEFAULT_RATE_API_BASE: &str = "https://api.exchangerate-api.com/v4/latest";

/// Supported display currencies. [`Currency::Inr`] is the base currency
/// all stored prices are denominated in.
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
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    /// Indian Rupee (base currency).
    Inr,
    /// US Dollar.
    Usd,
    /// Euro.
    Eur,
    /// British Pound.
    Gbp,
}

impl Currency {
    /// Display symbol for this currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Inr => "₹",
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
        }
    }

    /// Human-readable currency name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inr => "Indian Rupee",
            Self::Usd => "US Dollar",
            Self::Eur => "Euro",
            Self::Gbp => "British Pound",
        }
    }

    /// Static fallback rate relative to the INR base, used when no live
    /// rate has been fetched yet.
    #[must_use]
    pub const fn static_rate(self) -> f64 {
        match self {
            Self::Inr => 1.0,
            Self::Usd => 0.012,
            Self::Eur => 0.011,
            Self::Gbp => 0.0095,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Inr, Self::Usd, Self::Eur, Self::Gbp]
    }
}

/// An immutable snapshot of exchange rates relative to the INR base.
///
/// Snapshots are cheap to clone behind an `Arc` and are replaced, never
/// mutated, on refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<Currency, f64>,
    /// When the snapshot was fetched; `None` for the static fallback.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Default for RateTable {
    fn default() -> Self {
        Self::static_fallback()
    }
}

impl RateTable {
    /// The built-in static fallback table.
    #[must_use]
    pub fn static_fallback() -> Self {
        let rates = Currency::all()
            .iter()
            .map(|&c| (c, c.static_rate()))
            .collect();
        Self {
            rates,
            fetched_at: None,
        }
    }

    /// Builds a snapshot from fetched rates, filling any missing currency
    /// from the static fallback. The base currency rate is pinned to 1.
    #[must_use]
    pub fn from_fetched(fetched: &BTreeMap<Currency, f64>, fetched_at: DateTime<Utc>) -> Self {
        let rates = Currency::all()
            .iter()
            .map(|&c| {
                let rate = if c == Currency::Inr {
                    1.0
                } else {
                    fetched.get(&c).copied().unwrap_or_else(|| c.static_rate())
                };
                (c, rate)
            })
            .collect();
        Self {
            rates,
            fetched_at: Some(fetched_at),
        }
    }

    /// Multiplier converting an INR amount into `currency`.
    #[must_use]
    pub fn rate(&self, currency: Currency) -> f64 {
        self.rates
            .get(&currency)
            .copied()
            .unwrap_or_else(|| currency.static_rate())
    }

    /// Converts an amount between currencies through the INR base.
    #[must_use]
    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> f64 {
        if from == to {
            return amount;
        }
        let base = if from == Currency::Inr {
            amount
        } else {
            amount / self.rate(from)
        };
        base * self.rate(to)
    }

    /// Whether this snapshot was fetched within [`RATE_FRESHNESS_HOURS`]
    /// of `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.fetched_at
            .is_some_and(|fetched| now - fetched < Duration::hours(RATE_FRESHNESS_HOURS))
    }
}

/// Errors that can occur while refreshing exchange rates.
#[derive(Debug, Error)]
pub enum CurrencyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API response did not contain a usable rates object.
    #[error("invalid rate response: {message}")]
    InvalidResponse {
        /// Description of what was missing or malformed.
        message: String,
    },
}

/// Response shape of the exchange-rate API.
#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    base: String,
    date: Option<String>,
    rates: BTreeMap<String, f64>,
}

/// Owns the current [`RateTable`] snapshot and refreshes it from the
/// exchange-rate API.
///
/// `current()` is a synchronous read of the latest snapshot; `refresh()`
/// replaces it with a newly fetched one. A failed refresh leaves the
/// previous snapshot in place.
pub struct RateService {
    client: reqwest::Client,
    api_base: String,
    current: RwLock<Arc<RateTable>>,
}

impl Default for RateService {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_API_BASE)
    }
}

impl RateService {
    /// Creates a service seeded with the static fallback table.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            current: RwLock::new(Arc::new(RateTable::static_fallback())),
        }
    }

    /// Returns the latest rate snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn current(&self) -> Arc<RateTable> {
        self.current
            .read()
            .expect("rate table lock poisoned")
            .clone()
    }

    /// Fetches fresh rates for the INR base and installs a new snapshot.
    ///
    /// Currencies missing from the response keep their static fallback
    /// rate. Returns the installed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CurrencyError`] if the request fails or the response has
    /// no rates; the previously installed snapshot is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub async fn refresh(&self) -> Result<Arc<RateTable>, CurrencyError> {
        let url = format!("{}/{}", self.api_base, Currency::Inr);
        log::debug!("Refreshing exchange rates from {url}");

        let response: ExchangeRateResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.rates.is_empty() {
            return Err(CurrencyError::InvalidResponse {
                message: format!("empty rates object (base={})", response.base),
            });
        }

        let fetched: BTreeMap<Currency, f64> = response
            .rates
            .iter()
            .filter_map(|(code, &rate)| code.parse::<Currency>().ok().map(|c| (c, rate)))
            .collect();

        let table = Arc::new(RateTable::from_fetched(&fetched, Utc::now()));
        *self.current.write().expect("rate table lock poisoned") = table.clone();

        log::info!(
            "Updated exchange rates (base={}, date={:?}): {} currencies",
            response.base,
            response.date,
            fetched.len(),
        );
        Ok(table)
    }
}

/// Formats an already-converted amount in the style the listing UI uses
/// for marker badges: INR uses crore/lakh tiers, other currencies use
/// million/thousand tiers. The currency symbol is always prefixed.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_amount(amount: f64, currency: Currency) -> String {
    let formatted = if currency == Currency::Inr {
        if amount >= 10_000_000.0 {
            format!("{:.2}Cr", amount / 10_000_000.0)
        } else if amount >= 100_000.0 {
            format!("{:.2}L", amount / 100_000.0)
        } else if amount >= 1000.0 {
            format!("{:.1}K", amount / 1000.0)
        } else {
            format!("{}", amount.round() as i64)
        }
    } else if amount >= 1_000_000.0 {
        format!("{:.2}M", amount / 1_000_000.0)
    } else if amount >= 1000.0 {
        format!("{:.1}K", amount / 1000.0)
    } else {
        format!("{amount:.2}")
    };

    format!("{}{formatted}", currency.symbol())
}
