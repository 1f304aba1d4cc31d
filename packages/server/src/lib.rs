#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Actix-Web API server for the plots application.
//!
//! Serves the REST API the viewport engine's HTTP client talks to:
//! bounds-scoped listing with server-side filtering, plot CRUD, and
//! nearest-plot lookup. Records are held in a concurrent in-memory store.

mod handlers;
mod store;

use std::sync::Arc;

use actix_web::web;

pub use store::PlotStore;

/// Shared application state.
pub struct AppState {
    /// Plot storage.
    pub store: Arc<PlotStore>,
}

/// Mounts the versioned API scope on an Actix app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health))
            .route("/plots/bounds", web::get().to(handlers::plots_in_bounds))
            .route("/plots/nearest", web::get().to(handlers::nearest_plot))
            .route("/plots", web::get().to(handlers::list_plots))
            .route("/plots", web::post().to(handlers::create_plot))
            .route("/plots/{id}", web::put().to(handlers::update_plot))
            .route("/plots/{id}", web::delete().to(handlers::delete_plot)),
    );
}
