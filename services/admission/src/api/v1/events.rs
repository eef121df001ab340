//! Event-wide admin endpoints: event attributes, waitlist resequencing and
//! on-demand reconciliation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rsvp_id::{EventId, UserId};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::admission::ResequenceRequest;
use crate::model::{Capacity, EventAttributes, Fee, RegistrationWindow};
use crate::api::error::ApiError;
use crate::api::RequestContext;
use crate::state::AppState;

/// Create event-wide admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/{event_id}", put(upsert_event))
        .route("/events/{event_id}/waitlist", put(resequence))
        .route("/events/{event_id}/reconcile", post(reconcile))
}

/// Admission attributes of an event. Absent capacity means unlimited;
/// absent or zero fee means free.
#[derive(Debug, Deserialize)]
pub struct EventBody {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default = "default_true")]
    pub registration_enabled: bool,
    #[serde(default)]
    pub registration_opens_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registration_closes_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub waitlist_enabled: bool,
    #[serde(default)]
    pub fee_cents: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// New waitlist order, first to promote first.
#[derive(Debug, Deserialize)]
pub struct ResequenceBody {
    pub admin_id: String,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ReconcileResponse {
    pub promoted: Vec<String>,
}

/// Create or update an event, then fill any freed seats.
///
/// PUT /v1/events/{event_id}
async fn upsert_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
    Json(body): Json<EventBody>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let id: EventId = parse_id(&event_id, "event_id", &ctx)?;
    if let (Some(opens_at), Some(closes_at)) =
        (body.registration_opens_at, body.registration_closes_at)
    {
        if closes_at < opens_at {
            return Err(ApiError::bad_request(
                "invalid_registration_window",
                "registration_closes_at is before registration_opens_at",
            )
            .with_request_id(ctx.request_id.clone()));
        }
    }

    let event = EventAttributes {
        id,
        title: body.title,
        slug: body.slug,
        starts_at: body.starts_at,
        capacity: Capacity::from_limit(body.capacity),
        registration_enabled: body.registration_enabled,
        window: RegistrationWindow {
            opens_at: body.registration_opens_at,
            closes_at: body.registration_closes_at,
        },
        waitlist_enabled: body.waitlist_enabled,
        fee: Fee::from_cents(body.fee_cents),
    };

    let promoted = state
        .admission()
        .upsert_event(event)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(ReconcileResponse {
        promoted: promoted.iter().map(ToString::to_string).collect(),
    }))
}

/// PUT /v1/events/{event_id}/waitlist
async fn resequence(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
    Json(body): Json<ResequenceBody>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id: EventId = parse_id(&event_id, "event_id", &ctx)?;
    let admin_id: UserId = parse_id(&body.admin_id, "admin_id", &ctx)?;
    let user_ids = body
        .user_ids
        .iter()
        .map(|raw| parse_id::<UserId>(raw, "user_id", &ctx))
        .collect::<Result<Vec<_>, _>>()?;

    state
        .admission()
        .resequence_waitlist(ResequenceRequest {
            admin_id,
            event_id,
            user_ids,
            request_id: ctx.typed_request_id,
        })
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/events/{event_id}/reconcile
async fn reconcile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(event_id): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let event_id: EventId = parse_id(&event_id, "event_id", &ctx)?;

    let promoted = state
        .admission()
        .reconcile_now(event_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(ReconcileResponse {
        promoted: promoted.iter().map(ToString::to_string).collect(),
    }))
}
