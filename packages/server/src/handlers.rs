//! HTTP handler functions for the plots API.

use actix_web::{HttpResponse, web};
use plot_pulse_plot_models::Plot;
use plot_pulse_server_models::{
    ApiError, ApiHealth, BoundsQueryParams, NearestQueryParams, PageParams,
};

use crate::AppState;

/// `GET /api/v1/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/v1/plots`
///
/// Plain paged listing, id-ordered.
pub async fn list_plots(state: web::Data<AppState>, params: web::Query<PageParams>) -> HttpResponse {
    HttpResponse::Ok().json(state.store.list(params.page(), params.size()))
}

/// `GET /api/v1/plots/bounds`
///
/// Lists plots inside the viewport, refined by price, status, date,
/// radius, and search filters, with stable id-ordered pagination.
pub async fn plots_in_bounds(
    state: web::Data<AppState>,
    params: web::Query<BoundsQueryParams>,
) -> HttpResponse {
    let bounds = params.bounds();
    let filters = params.filter_params();
    let plots = state
        .store
        .query(&bounds, &filters, params.page(), params.size());
    log::debug!(
        "bounds query returned {} plots (page {}, size {})",
        plots.len(),
        params.page(),
        params.size(),
    );
    HttpResponse::Ok().json(plots)
}

/// `POST /api/v1/plots`
///
/// Validates and persists a new plot; the response carries the assigned
/// id and creation timestamp.
pub async fn create_plot(state: web::Data<AppState>, plot: web::Json<Plot>) -> HttpResponse {
    let plot = plot.into_inner();
    if let Err(e) = plot.validate() {
        return HttpResponse::BadRequest().json(ApiError::new(e.to_string()));
    }
    let stored = state.store.insert(plot);
    HttpResponse::Created().json(stored)
}

/// `PUT /api/v1/plots/{id}`
pub async fn update_plot(
    state: web::Data<AppState>,
    id: web::Path<i64>,
    plot: web::Json<Plot>,
) -> HttpResponse {
    let id = id.into_inner();
    let plot = plot.into_inner();
    if let Err(e) = plot.validate() {
        return HttpResponse::BadRequest().json(ApiError::new(e.to_string()));
    }
    match state.store.update(id, plot) {
        Some(stored) => HttpResponse::Ok().json(stored),
        None => HttpResponse::NotFound().json(ApiError::new(format!("plot {id} not found"))),
    }
}

/// `DELETE /api/v1/plots/{id}`
pub async fn delete_plot(state: web::Data<AppState>, id: web::Path<i64>) -> HttpResponse {
    let id = id.into_inner();
    if state.store.remove(id) {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(ApiError::new(format!("plot {id} not found")))
    }
}

/// `GET /api/v1/plots/nearest`
///
/// Finds the closest plot within the radius. No plot in range is a 404,
/// which clients treat as a defined empty result.
pub async fn nearest_plot(
    state: web::Data<AppState>,
    params: web::Query<NearestQueryParams>,
) -> HttpResponse {
    match state.store.nearest(params.lat, params.lon, params.radius) {
        Some(plot) => HttpResponse::Ok().json(plot),
        None => {
            HttpResponse::NotFound().json(ApiError::new("no plot within radius".to_string()))
        }
    }
}
