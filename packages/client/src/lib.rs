#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Plot repository trait and the HTTP client for the plots API.
//!
//! [`PlotRepository`] is the seam between the viewport engine and the
//! backing store. The production implementation is
//! [`HttpPlotRepository`], which talks to the plots REST API with
//! automatic retry for idempotent reads. Mutations are never retried, to
//! avoid duplicate creates and conflicting updates.

use std::time::Duration;

use async_trait::async_trait;
use plot_pulse_filter::FilterParams;
use plot_pulse_geo::MapBounds;
use plot_pulse_plot_models::{NearestPlotRequest, Plot};
use serde::Deserialize;
use thiserror::Error;

/// Maximum retry attempts for idempotent GET requests.
const MAX_RETRIES: u32 = 3;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default page size for bounds queries.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Errors surfaced by repository operations.
#[derive(Debug, Error)]
pub enum PlotRepositoryError {
    /// Transport-level failure (connection, timeout, TLS, decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-success status with a message body.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body, or the status text.
        message: String,
    },
}

impl PlotRepositoryError {
    /// HTTP status of an API-level error, if this is one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(_) => None,
        }
    }
}

/// Backing store for plot listings.
///
/// Implemented by the HTTP client in production and by in-memory mocks in
/// engine tests.
#[async_trait]
pub trait PlotRepository: Send + Sync {
    /// Lists plots inside the bounds, refined by the filter params the
    /// server can evaluate (raw price bounds, status, dates, radius,
    /// search).
    async fn list_in_bounds(
        &self,
        bounds: &MapBounds,
        params: &FilterParams,
        page: u32,
        size: u32,
    ) -> Result<Vec<Plot>, PlotRepositoryError>;

    /// Persists a new plot; the returned record carries the server id and
    /// timestamps.
    async fn create(&self, plot: &Plot) -> Result<Plot, PlotRepositoryError>;

    /// Replaces the plot with the given id.
    async fn update(&self, id: i64, plot: &Plot) -> Result<Plot, PlotRepositoryError>;

    /// Deletes the plot with the given id.
    async fn delete(&self, id: i64) -> Result<(), PlotRepositoryError>;

    /// Finds the closest plot within the request radius. No plot in range
    /// is a defined empty result, not an error.
    async fn nearest_within_radius(
        &self,
        request: &NearestPlotRequest,
    ) -> Result<Option<Plot>, PlotRepositoryError>;
}

/// Error body shape returned by the plots API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// HTTP implementation of [`PlotRepository`] against the plots REST API.
pub struct HttpPlotRepository {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlotRepository {
    /// Creates a client for the API at `base_url`
    /// (e.g. `http://localhost:8091/api/v1`).
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Reads the API base URL from `PLOTPULSE_API_URL`, defaulting to the
    /// local development server.
    #[must_use]
    pub fn from_env() -> Self {
        let base = std::env::var("PLOTPULSE_API_URL")
            .unwrap_or_else(|_| "http://localhost:8091/api/v1".to_string());
        Self::new(base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends a GET request with retry and exponential backoff.
    ///
    /// Retries transport errors, 429, and 5xx. Other 4xx responses are
    /// permanent and returned immediately.
    async fn get_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder + Send + Sync,
    ) -> Result<reqwest::Response, PlotRepositoryError> {
        let mut last_error: Option<PlotRepositoryError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1u64 << attempt); // 2s, 4s, 8s
                log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Err(e) => {
                    let transient =
                        e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode();
                    if transient && attempt < MAX_RETRIES {
                        log::warn!("  transient error: {e}");
                        last_error = Some(PlotRepositoryError::Http(e));
                        continue;
                    }
                    return Err(PlotRepositoryError::Http(e));
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if retryable && attempt < MAX_RETRIES {
                        log::warn!("  HTTP {status}, retrying");
                        last_error = Some(api_error_from(response).await);
                        continue;
                    }
                    if !status.is_success() {
                        return Err(api_error_from(response).await);
                    }
                    return Ok(response);
                }
            }
        }

        Err(last_error.unwrap_or(PlotRepositoryError::Api {
            status: 0,
            message: "request failed after all retries".to_string(),
        }))
    }

    /// Sends a mutation request exactly once and checks the status.
    async fn send_once(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PlotRepositoryError> {
        let response = request
            .header("X-Request-ID", uuid::Uuid::new_v4().to_string())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error_from(response).await)
        }
    }
}

/// Builds an API error from a non-success response, preferring the
/// message field of the error body.
async fn api_error_from(response: reqwest::Response) -> PlotRepositoryError {
    let status = response.status();
    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            }),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    PlotRepositoryError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Query pairs for a bounds listing: viewport edges, paging, and the
/// server-evaluable filter params.
#[must_use]
pub fn bounds_query(
    bounds: &MapBounds,
    params: &FilterParams,
    page: u32,
    size: u32,
) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("minLat", bounds.south.to_string()),
        ("maxLat", bounds.north.to_string()),
        ("minLng", bounds.west.to_string()),
        ("maxLng", bounds.east.to_string()),
        ("page", page.to_string()),
        ("size", size.to_string()),
    ];
    pairs.extend(params.query_pairs());
    pairs
}

#[async_trait]
impl PlotRepository for HttpPlotRepository {
    async fn list_in_bounds(
        &self,
        bounds: &MapBounds,
        params: &FilterParams,
        page: u32,
        size: u32,
    ) -> Result<Vec<Plot>, PlotRepositoryError> {
        let url = self.url("/plots/bounds");
        let query = bounds_query(bounds, params, page, size);

        let response = self
            .get_with_retry(|| self.client.get(&url).query(&query))
            .await?;
        let plots: Vec<Plot> = response.json().await?;
        log::debug!("fetched {} plots in bounds", plots.len());
        Ok(plots)
    }

    async fn create(&self, plot: &Plot) -> Result<Plot, PlotRepositoryError> {
        let response = self
            .send_once(self.client.post(self.url("/plots")).json(plot))
            .await?;
        Ok(response.json().await?)
    }

    async fn update(&self, id: i64, plot: &Plot) -> Result<Plot, PlotRepositoryError> {
        let response = self
            .send_once(self.client.put(self.url(&format!("/plots/{id}"))).json(plot))
            .await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, id: i64) -> Result<(), PlotRepositoryError> {
        self.send_once(self.client.delete(self.url(&format!("/plots/{id}"))))
            .await?;
        Ok(())
    }

    async fn nearest_within_radius(
        &self,
        request: &NearestPlotRequest,
    ) -> Result<Option<Plot>, PlotRepositoryError> {
        let url = self.url("/plots/nearest");
        let query = [
            ("lat", request.latitude.to_string()),
            ("lon", request.longitude.to_string()),
            ("radius", request.radius.to_string()),
        ];

        let result = self
            .get_with_retry(|| self.client.get(&url).query(&query))
            .await;
        match result {
            Ok(response) => Ok(Some(response.json().await?)),
            // 404 means nothing within the radius, a defined empty result.
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
