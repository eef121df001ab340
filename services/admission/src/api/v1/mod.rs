//! API v1 routes.

mod events;
mod registrations;

use std::str::FromStr;

use axum::Router;

use crate::api::error::ApiError;
use crate::api::RequestContext;
use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Registrations are nested under events: /v1/events/{event_id}/registrations
        .nest("/events/{event_id}/registrations", registrations::routes())
        .merge(events::routes())
}

/// Parses a typed id from a path or body value, rejecting with 400.
fn parse_id<T: FromStr>(raw: &str, what: &str, ctx: &RequestContext) -> Result<T, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::bad_request(format!("invalid_{what}"), format!("Invalid {what} format"))
            .with_request_id(ctx.request_id.clone())
    })
}
