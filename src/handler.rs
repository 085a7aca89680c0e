//! HTTP request handlers for the URL shortener API
//!
//! This module adapts the registry and the resolver to HTTP:
//! - Creating batches of short URLs with custom or generated codes
//! - Resolving short codes and redirecting to their destinations
//! - Listing, updating and deleting records
//! - Sweeping expired records and reporting statistics

use std::net::IpAddr;

use axum::{
    extract::{Path, Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::error::ShortenError;
use crate::model::{
    ClickParams, CreateRequest, CreateResponse, ListParams, StatusFilter, UrlPatch,
    SOURCE_REDIRECT,
};
use crate::resolver::{ResolveState, Visit};
use crate::route::AppState;
use crate::validation::is_valid_url;

const DEFAULT_CLICK_LIMIT: usize = 50;
const MAX_CLICK_LIMIT: usize = 500;

/// Creates a batch of short URLs
///
/// This handler:
/// 1. Validates every entry and reports all problems at once
/// 2. Uses each custom code if provided, otherwise generates a unique 6-character code
/// 3. Stores the new records and returns them
///
/// # Request Body
///
/// ```json
/// {
///   "urls": [
///     { "originalUrl": "https://example.com/very/long/url", "validityPeriod": 60 },
///     { "originalUrl": "https://example.com/other", "customShortCode": "promo" }
///   ]
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - All URLs created
/// - **400 Bad Request** - Validation failed, `errors` lists every bad field
/// - **409 Conflict** - A custom code is already in use; nothing was created
pub async fn create_short_urls(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequest>,
) -> impl IntoResponse {
    match state.registry.shorten(&payload.urls) {
        Ok(urls) => (
            StatusCode::CREATED,
            Json(CreateResponse {
                success: true,
                urls,
                errors: Vec::new(),
            }),
        )
            .into_response(),
        Err(e) => {
            let status = match e {
                ShortenError::Validation(_) => StatusCode::BAD_REQUEST,
                ShortenError::Collision(_) => StatusCode::CONFLICT,
            };
            (
                status,
                Json(CreateResponse {
                    success: false,
                    urls: Vec::new(),
                    errors: e.into_errors(),
                }),
            )
                .into_response()
        }
    }
}

/// Resolves a short code and redirects to the original destination
///
/// When a visitor opens `http://localhost:8080/abc123`, this handler:
/// 1. Looks up "abc123", ignoring expired records
/// 2. Re-checks the stored destination against the safety rules
/// 3. Records the click with location and user agent
/// 4. Sends a 307 Temporary Redirect response
///
/// # Response
///
/// - **307 Temporary Redirect** - Redirects to the original URL
/// - **404 Not Found** - Unknown or expired short code
/// - **403 Forbidden** - The destination was found but refused
/// - **400 Bad Request** - The stored destination cannot be parsed
///
/// # Note
///
/// If the client disconnects, the handler future is dropped together with
/// its resolution attempt, which cancels any pending work.
pub async fn redirect_url(
    Path(code): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let visit = Visit {
        source: SOURCE_REDIRECT.to_string(),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip: client_ip(&headers),
    };

    let attempt = state.resolver.begin(Some(code));
    match attempt.resolve(&visit).await {
        ResolveState::Redirecting { target, .. } => Redirect::temporary(&target).into_response(),
        other => resolve_failure(&other),
    }
}

fn resolve_failure(state: &ResolveState) -> Response {
    let (status, code, reason) = match state {
        ResolveState::NotFound(reason) => (StatusCode::NOT_FOUND, "not_found", json!(reason)),
        ResolveState::Blocked(reason) => (StatusCode::FORBIDDEN, "blocked", json!(reason)),
        ResolveState::Error(_) => (StatusCode::BAD_REQUEST, "invalid_url", json!(null)),
        ResolveState::Resolving | ResolveState::Redirecting { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "aborted", json!(null))
        }
    };

    (
        status,
        Json(json!({
            "error": state.message().unwrap_or("Failed to process redirect"),
            "code": code,
            "reason": reason
        })),
    )
        .into_response()
}

/// First address from `X-Forwarded-For`, else `X-Real-IP`
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .or_else(|| header("x-real-ip"))
        .and_then(|value| value.trim().parse().ok())
}

/// Lists URLs with pagination, newest first
///
/// # Query Parameters
///
/// - `status` (optional) - `all`, `active` or `expired` (default: all)
/// - `page` (optional) - Page number, starts from 1 (default: 1)
/// - `limit` (optional) - Items per page, max 100 (default: 10)
///
/// # Example Request
///
/// `GET /api/urls?status=active&page=2&limit=20`
///
/// # Response
///
/// ```json
/// {
///   "page": 2,
///   "limit": 20,
///   "total": 35,
///   "total_fetched": 15,
///   "data": [...]
/// }
/// ```
pub async fn list_urls(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    // Ensure page is at least 1
    let page = params.page.unwrap_or(1).max(1);

    // Limit to maximum of 100 items per page
    let limit = params.limit.unwrap_or(10).min(100);

    // Huge page numbers yield an empty page
    let offset = page.saturating_sub(1).saturating_mul(limit);

    let snapshot = state.registry.snapshot();
    let mut matching: Vec<_> = snapshot
        .urls()
        .iter()
        .filter(|url| match params.status.unwrap_or_default() {
            StatusFilter::All => true,
            StatusFilter::Active => !url.is_expired,
            StatusFilter::Expired => url.is_expired,
        })
        .collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = matching.len();
    let results: Vec<_> = matching.into_iter().skip(offset).take(limit).collect();

    Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "total_fetched": results.len(),
        "data": results
    }))
    .into_response()
}

/// Updates the destination of an existing record
///
/// The new destination goes through the same validation as at creation.
///
/// # Response
///
/// - **200 OK** - Updated record
/// - **400 Bad Request** - Invalid destination
/// - **404 Not Found** - No record with this id
pub async fn update_url(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<UrlPatch>,
) -> impl IntoResponse {
    if let Some(original_url) = &patch.original_url {
        if !is_valid_url(original_url) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Please enter a valid URL",
                    "code": "invalid_url"
                })),
            )
                .into_response();
        }
    }

    match state.registry.update_by_id(&id, patch) {
        Some(record) => (StatusCode::OK, Json(json!(record))).into_response(),
        None => not_found(),
    }
}

/// Deletes a short URL by record id
///
/// # Response
///
/// - **200 OK** - URL successfully deleted
/// - **404 Not Found** - URL does not exist
pub async fn delete_short_url(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if !state.registry.remove_by_id(&id) {
        return not_found();
    }

    (
        StatusCode::OK,
        Json(json!({
            "message": "Short link deleted successfully",
            "deleted_id": id
        })),
    )
        .into_response()
}

/// Removes every expired record
pub async fn clear_expired(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.registry.sweep_expired();
    Json(json!({ "removed": removed }))
}

/// Totals, active/expired split and the most clicked links
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.stats())
}

/// Most recent clicks across all links
///
/// - `limit` (optional) - Number of clicks, max 500 (default: 50)
pub async fn list_clicks(
    State(state): State<AppState>,
    Query(params): Query<ClickParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_CLICK_LIMIT)
        .min(MAX_CLICK_LIMIT);
    Json(state.registry.recent_clicks(limit))
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "URL not found",
            "code": "not_found"
        })),
    )
        .into_response()
}
