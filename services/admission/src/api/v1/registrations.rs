//! Registration endpoints: member RSVPs, status reads and admin overrides.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rsvp_id::{EventId, UserId};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::admission::{OverrideRequest, RegistrationOutcome};
use crate::api::error::ApiError;
use crate::api::RequestContext;
use crate::model::{Intent, PromotionSource, Registration, RegistrationStatus, WaitlistOrder};
use crate::state::AppState;

/// Create registration routes.
///
/// Nested under events: /v1/events/{event_id}/registrations
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(register))
        .route("/{user_id}", get(get_registration))
        .route("/{user_id}/override", put(override_registration))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// A member's RSVP.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub intent: Intent,
}

/// An administrator's status override.
#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    pub admin_id: String,
    pub status: RegistrationStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A registration as returned by status reads.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_order: Option<WaitlistOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_source: Option<PromotionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Registration> for RegistrationResponse {
    fn from(r: Registration) -> Self {
        Self {
            id: r.id.to_string(),
            event_id: r.event_id.to_string(),
            user_id: r.user_id.to_string(),
            status: r.status(),
            waitlist_order: r.waitlist_order(),
            promoted_at: r.promoted_at,
            promotion_source: r.promotion_source,
            status_reason: r.status_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Record a member's intent.
///
/// POST /v1/events/{event_id}/registrations
async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegistrationOutcome>, ApiError> {
    let event_id: EventId = parse_id(&event_id, "event_id", &ctx)?;
    let user_id: UserId = parse_id(&req.user_id, "user_id", &ctx)?;

    let outcome = state
        .admission()
        .register_for_event(user_id, event_id, req.intent)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(outcome))
}

/// Read one user's registration.
///
/// GET /v1/events/{event_id}/registrations/{user_id}
async fn get_registration(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((event_id, user_id)): Path<(String, String)>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let event_id: EventId = parse_id(&event_id, "event_id", &ctx)?;
    let user_id: UserId = parse_id(&user_id, "user_id", &ctx)?;

    let registration = state
        .admission()
        .registration(event_id, user_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?
        .ok_or_else(|| {
            ApiError::not_found(
                "registration_not_found",
                format!("User {user_id} has no registration for event {event_id}"),
            )
            .with_request_id(ctx.request_id.clone())
        })?;

    Ok(Json(registration.into()))
}

/// Set a user's status on an administrator's authority.
///
/// PUT /v1/events/{event_id}/registrations/{user_id}/override
async fn override_registration(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((event_id, user_id)): Path<(String, String)>,
    Json(body): Json<OverrideBody>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id: EventId = parse_id(&event_id, "event_id", &ctx)?;
    let target_user_id: UserId = parse_id(&user_id, "user_id", &ctx)?;
    let admin_id: UserId = parse_id(&body.admin_id, "admin_id", &ctx)?;

    state
        .admission()
        .admin_override_registration(OverrideRequest {
            admin_id,
            target_user_id,
            event_id,
            new_status: body.status,
            reason: body.reason,
            request_id: ctx.typed_request_id,
        })
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(StatusCode::NO_CONTENT)
}
