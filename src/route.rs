//! Route definitions for the URL shortener API
//!
//! This module configures all HTTP routes and maps them to their respective handlers.
//! It creates the Axum router with the application state.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handler::{
    clear_expired, create_short_urls, delete_short_url, get_stats, list_clicks, list_urls,
    redirect_url, update_url,
};
use crate::location::Locator;
use crate::registry::UrlRegistry;
use crate::resolver::Resolver;

/// Application state shared across all request handlers
///
/// Both fields are cheap handles onto the single registry built at startup.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<UrlRegistry>,
    pub resolver: Resolver,
}

impl AppState {
    pub fn new(registry: Arc<UrlRegistry>, locator: Arc<dyn Locator>) -> Self {
        let resolver = Resolver::new(Arc::clone(&registry), locator);
        Self { registry, resolver }
    }

    pub fn with_resolver(registry: Arc<UrlRegistry>, resolver: Resolver) -> Self {
        Self { registry, resolver }
    }
}

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /{code}` - Resolves a short code and redirects (public endpoint)
/// - `GET /api/urls` - Lists URLs with pagination
/// - `POST /api/urls` - Creates a batch of short URLs
/// - `POST /api/urls/sweep` - Removes expired URLs
/// - `GET /api/stats` - Aggregate statistics
/// - `GET /api/clicks` - Most recent clicks
/// - `PATCH /api/{id}` - Updates a URL's destination
/// - `DELETE /api/{id}` - Deletes a URL
///
/// # Example Usage
///
/// ```no_run
/// # use std::sync::Arc;
/// # use snaplink::clock::SystemClock;
/// # use snaplink::database::RedbStorage;
/// # use snaplink::location::UnknownLocator;
/// # use snaplink::registry::UrlRegistry;
/// # use snaplink::route::{create_app, AppState};
/// let storage = RedbStorage::open("data.db").unwrap();
/// let registry = UrlRegistry::open(Arc::new(storage), Arc::new(SystemClock), "http://localhost:8080");
/// let app = create_app(AppState::new(Arc::new(registry), Arc::new(UnknownLocator)));
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/urls", get(list_urls).post(create_short_urls))
        .route("/urls/sweep", post(clear_expired))
        .route("/stats", get(get_stats))
        .route("/clicks", get(list_clicks))
        .route("/{id}", patch(update_url).delete(delete_short_url));

    Router::new()
        // Public short-link endpoint
        .route("/{code}", get(redirect_url))
        // Mount API routes under /api
        .nest("/api", api_routes)
        // Inject the application state into all handlers
        .with_state(state)
}
