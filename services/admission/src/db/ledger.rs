//! Postgres ledger backend.
//!
//! A unit of work is one Postgres transaction. `begin` sets a local
//! `lock_timeout` and takes `SELECT ... FOR UPDATE` on the event row; every
//! mutator goes through `begin`, so the row lock serializes all admission
//! work for the event under READ COMMITTED. Other events are unaffected.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsvp_events::AuditRecord;
use rsvp_id::{EventId, RegistrationId, UserId};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Transaction};
use tracing::{debug, warn};

use super::error::{is_timeout, sqlstate, UNIQUE_VIOLATION};
use super::DbError;
use crate::model::{
    Capacity, EventAttributes, Fee, Placement, PromotionSource, Registration,
    RegistrationStatus, RegistrationWindow, WaitlistOrder,
};
use crate::store::{LedgerStore, LedgerTx, StoreError};

const EVENT_COLUMNS: &str = "event_id, title, slug, starts_at, capacity, registration_enabled, \
     registration_opens_at, registration_closes_at, waitlist_enabled, fee_cents";

const REGISTRATION_COLUMNS: &str = "registration_id, event_id, user_id, status, waitlist_order, \
     promoted_at, promotion_source, status_reason, created_at, updated_at";

/// Idle time, in lock timeouts, after which a lock holder counts as stalled.
const STALLED_HOLDER_FACTOR: u128 = 4;

/// Postgres-backed [`LedgerStore`].
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Starts a transaction with the lock bounds applied.
    ///
    /// `lock_timeout` bounds waiters. A holder that sits idle inside its
    /// transaction for `STALLED_HOLDER_FACTOR` lock timeouts has stalled:
    /// Postgres terminates its session, which releases the row lock.
    async fn open(&self, event_id: EventId) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_query_err(event_id, e))?;

        let lock_ms = self.lock_timeout.as_millis().max(1);
        let idle_ms = lock_ms.saturating_mul(STALLED_HOLDER_FACTOR);

        // SET cannot take bind parameters; both values are integers we own.
        for statement in [
            format!("SET LOCAL lock_timeout = '{lock_ms}ms'"),
            format!("SET LOCAL idle_in_transaction_session_timeout = '{idle_ms}ms'"),
        ] {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_query_err(event_id, e))?;
        }

        Ok(tx)
    }

    /// Committed audit records for an event, oldest first.
    pub async fn audit_log(&self, event_id: EventId) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT audit_log_id, occurred_at, actor_type, actor_user_id, action_type,
                   entity_type, entity_id, event_id, target_user_id, summary,
                   before_state, after_state, metadata, request_id
            FROM audit_logs
            WHERE event_id = $1
            ORDER BY occurred_at, audit_log_id
            "#,
        )
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(DbError::Query(e)))?;

        rows.into_iter().map(AuditRow::into_record).collect()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self, event_id: EventId) -> Result<Box<dyn LedgerTx>, StoreError> {
        let mut tx = self.open(event_id).await?;

        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE event_id = $1 FOR UPDATE"
        ))
        .bind(event_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_query_err(event_id, e))?;

        let Some(row) = row else {
            return Err(StoreError::EventNotFound(event_id));
        };
        let event = row.into_attributes()?;

        debug!(event_id = %event_id, "Acquired event row lock");

        Ok(Box::new(PgLedgerTx { tx, event }))
    }

    async fn upsert_event(&self, event: &EventAttributes) -> Result<(), StoreError> {
        // The update takes the same row lock as `begin`, so it waits behind
        // in-flight units of work and is bounded the same way.
        let mut tx = self.open(event.id).await?;
        sqlx::query(
            r#"
            INSERT INTO events (
                event_id, title, slug, starts_at, capacity, registration_enabled,
                registration_opens_at, registration_closes_at, waitlist_enabled, fee_cents
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (event_id) DO UPDATE SET
                title = EXCLUDED.title,
                slug = EXCLUDED.slug,
                starts_at = EXCLUDED.starts_at,
                capacity = EXCLUDED.capacity,
                registration_enabled = EXCLUDED.registration_enabled,
                registration_opens_at = EXCLUDED.registration_opens_at,
                registration_closes_at = EXCLUDED.registration_closes_at,
                waitlist_enabled = EXCLUDED.waitlist_enabled,
                fee_cents = EXCLUDED.fee_cents,
                updated_at = now()
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.title)
        .bind(&event.slug)
        .bind(event.starts_at)
        .bind(event.capacity.limit().map(to_i32).transpose()?)
        .bind(event.registration_enabled)
        .bind(event.window.opens_at)
        .bind(event.window.closes_at)
        .bind(event.waitlist_enabled)
        .bind(event.fee.cents().map(to_i32).transpose()?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_query_err(event.id, e))?;

        tx.commit().await.map_err(|e| map_query_err(event.id, e))
    }

    async fn get_registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Registration>, StoreError> {
        let exists: Option<String> =
            sqlx::query_scalar("SELECT event_id FROM events WHERE event_id = $1")
                .bind(event_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_query_err(event_id, e))?;
        if exists.is_none() {
            return Err(StoreError::EventNotFound(event_id));
        }

        let row = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE event_id = $1 AND user_id = $2"
        ))
        .bind(event_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_query_err(event_id, e))?;

        row.map(RegistrationRow::into_registration).transpose()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(DbError::Query(e)))?;
        Ok(())
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
    event: EventAttributes,
}

impl PgLedgerTx {
    fn err(&self, e: sqlx::Error) -> StoreError {
        map_query_err(self.event.id, e)
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    fn event(&self) -> &EventAttributes {
        &self.event
    }

    async fn find_registration(
        &mut self,
        user_id: UserId,
    ) -> Result<Option<Registration>, StoreError> {
        let row = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE event_id = $1 AND user_id = $2"
        ))
        .bind(self.event.id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| self.err(e))?;

        row.map(RegistrationRow::into_registration).transpose()
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO registrations (
                registration_id, event_id, user_id, status, waitlist_order,
                promoted_at, promotion_source, status_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(registration.id.to_string())
        .bind(registration.event_id.to_string())
        .bind(registration.user_id.to_string())
        .bind(registration.status().as_str())
        .bind(registration.waitlist_order().map(|o| o.value()))
        .bind(registration.promoted_at)
        .bind(registration.promotion_source.map(|s| s.as_str()))
        .bind(registration.status_reason.as_deref())
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if sqlstate(&e).as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::DuplicateRegistration {
                    event_id: self.event.id,
                    user_id: registration.user_id,
                })
            }
            Err(e) => Err(self.err(e)),
        }
    }

    async fn update_registration(
        &mut self,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET status = $3,
                waitlist_order = $4,
                promoted_at = $5,
                promotion_source = $6,
                status_reason = $7,
                updated_at = $8
            WHERE event_id = $1 AND user_id = $2
            "#,
        )
        .bind(self.event.id.to_string())
        .bind(registration.user_id.to_string())
        .bind(registration.status().as_str())
        .bind(registration.waitlist_order().map(|o| o.value()))
        .bind(registration.promoted_at)
        .bind(registration.promotion_source.map(|s| s.as_str()))
        .bind(registration.status_reason.as_deref())
        .bind(registration.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| self.err(e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RegistrationNotFound {
                event_id: self.event.id,
                user_id: registration.user_id,
            });
        }
        Ok(())
    }

    async fn count_by_status(&mut self, status: RegistrationStatus) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = $2",
        )
        .bind(self.event.id.to_string())
        .bind(status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| self.err(e))?;

        u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("count {count} out of range")))
    }

    async fn max_waitlist_order(&mut self) -> Result<Option<WaitlistOrder>, StoreError> {
        let high_water: Option<i64> = sqlx::query_scalar(
            "SELECT high_water FROM waitlist_sequences WHERE event_id = $1",
        )
        .bind(self.event.id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| self.err(e))?;

        Ok(high_water.map(WaitlistOrder::new))
    }

    async fn next_waitlist_order(&mut self) -> Result<WaitlistOrder, StoreError> {
        let issued: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO waitlist_sequences (event_id, high_water)
            VALUES ($1, 1)
            ON CONFLICT (event_id) DO UPDATE
                SET high_water = waitlist_sequences.high_water + 1
            RETURNING high_water
            "#,
        )
        .bind(self.event.id.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| self.err(e))?;

        Ok(WaitlistOrder::new(issued))
    }

    async fn list_waitlisted(&mut self) -> Result<Vec<Registration>, StoreError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE event_id = $1 AND status = 'waitlisted' \
             ORDER BY waitlist_order ASC, created_at ASC"
        ))
        .bind(self.event.id.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| self.err(e))?;

        rows.into_iter()
            .map(RegistrationRow::into_registration)
            .collect()
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                audit_log_id, occurred_at, actor_type, actor_user_id, action_type,
                entity_type, entity_id, event_id, target_user_id, summary,
                before_state, after_state, metadata, request_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.occurred_at)
        .bind(record.actor_type.to_string())
        .bind(record.actor_user_id.to_string())
        .bind(&record.action_type)
        .bind(record.entity_type.to_string())
        .bind(&record.entity_id)
        .bind(record.event_id.to_string())
        .bind(record.target_user_id.map(|id| id.to_string()))
        .bind(&record.summary)
        .bind(&record.before)
        .bind(&record.after)
        .bind(&record.metadata)
        .bind(record.request_id.map(|id| id.to_string()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            warn!(error = %e, event_id = %record.event_id, "Audit insert failed");
            StoreError::Audit(e.to_string())
        })?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let event_id = self.event.id;
        self.tx
            .commit()
            .await
            .map_err(|e| map_query_err(event_id, e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let event_id = self.event.id;
        self.tx
            .rollback()
            .await
            .map_err(|e| map_query_err(event_id, e))
    }
}

fn map_query_err(event_id: EventId, e: sqlx::Error) -> StoreError {
    if is_timeout(&e) {
        StoreError::LockTimeout(event_id)
    } else {
        StoreError::Database(DbError::Query(e))
    }
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{value} does not fit a column")))
}

fn to_u32(column: &str, value: Option<i32>) -> Result<Option<u32>, StoreError> {
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative {column}: {v}")))
        })
        .transpose()
}

fn parse_id<T>(column: &str, raw: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("{column} {raw:?}: {e}")))
}

// =============================================================================
// Row types
// =============================================================================

struct EventRow {
    event_id: String,
    title: String,
    slug: String,
    starts_at: Option<DateTime<Utc>>,
    capacity: Option<i32>,
    registration_enabled: bool,
    registration_opens_at: Option<DateTime<Utc>>,
    registration_closes_at: Option<DateTime<Utc>>,
    waitlist_enabled: bool,
    fee_cents: Option<i32>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            event_id: row.try_get("event_id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            starts_at: row.try_get("starts_at")?,
            capacity: row.try_get("capacity")?,
            registration_enabled: row.try_get("registration_enabled")?,
            registration_opens_at: row.try_get("registration_opens_at")?,
            registration_closes_at: row.try_get("registration_closes_at")?,
            waitlist_enabled: row.try_get("waitlist_enabled")?,
            fee_cents: row.try_get("fee_cents")?,
        })
    }
}

impl EventRow {
    fn into_attributes(self) -> Result<EventAttributes, StoreError> {
        Ok(EventAttributes {
            id: parse_id("event_id", &self.event_id)?,
            title: self.title,
            slug: self.slug,
            starts_at: self.starts_at,
            capacity: Capacity::from_limit(to_u32("capacity", self.capacity)?),
            registration_enabled: self.registration_enabled,
            window: RegistrationWindow {
                opens_at: self.registration_opens_at,
                closes_at: self.registration_closes_at,
            },
            waitlist_enabled: self.waitlist_enabled,
            fee: Fee::from_cents(to_u32("fee_cents", self.fee_cents)?),
        })
    }
}

struct RegistrationRow {
    registration_id: String,
    event_id: String,
    user_id: String,
    status: String,
    waitlist_order: Option<i64>,
    promoted_at: Option<DateTime<Utc>>,
    promotion_source: Option<String>,
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RegistrationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            registration_id: row.try_get("registration_id")?,
            event_id: row.try_get("event_id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            waitlist_order: row.try_get("waitlist_order")?,
            promoted_at: row.try_get("promoted_at")?,
            promotion_source: row.try_get("promotion_source")?,
            status_reason: row.try_get("status_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl RegistrationRow {
    fn into_registration(self) -> Result<Registration, StoreError> {
        let status = RegistrationStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {:?}", self.status)))?;
        let placement = Placement::from_parts(status, self.waitlist_order.map(WaitlistOrder::new))
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "registration {} has status {} with waitlist order {:?}",
                    self.registration_id, status, self.waitlist_order
                ))
            })?;
        let promotion_source = self
            .promotion_source
            .as_deref()
            .map(|raw| {
                PromotionSource::parse(raw)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown promotion source {raw:?}")))
            })
            .transpose()?;

        Ok(Registration {
            id: parse_id::<RegistrationId>("registration_id", &self.registration_id)?,
            event_id: parse_id("event_id", &self.event_id)?,
            user_id: parse_id("user_id", &self.user_id)?,
            placement,
            promoted_at: self.promoted_at,
            promotion_source,
            status_reason: self.status_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct AuditRow {
    audit_log_id: String,
    occurred_at: DateTime<Utc>,
    actor_type: String,
    actor_user_id: String,
    action_type: String,
    entity_type: String,
    entity_id: String,
    event_id: String,
    target_user_id: Option<String>,
    summary: String,
    before_state: serde_json::Value,
    after_state: serde_json::Value,
    metadata: serde_json::Value,
    request_id: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AuditRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            audit_log_id: row.try_get("audit_log_id")?,
            occurred_at: row.try_get("occurred_at")?,
            actor_type: row.try_get("actor_type")?,
            actor_user_id: row.try_get("actor_user_id")?,
            action_type: row.try_get("action_type")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            event_id: row.try_get("event_id")?,
            target_user_id: row.try_get("target_user_id")?,
            summary: row.try_get("summary")?,
            before_state: row.try_get("before_state")?,
            after_state: row.try_get("after_state")?,
            metadata: row.try_get("metadata")?,
            request_id: row.try_get("request_id")?,
        })
    }
}

impl AuditRow {
    fn into_record(self) -> Result<AuditRecord, StoreError> {
        let actor_type = serde_json::from_value(serde_json::Value::String(self.actor_type))
            .map_err(|e| StoreError::Corrupt(format!("actor_type: {e}")))?;
        let entity_type = serde_json::from_value(serde_json::Value::String(self.entity_type))
            .map_err(|e| StoreError::Corrupt(format!("entity_type: {e}")))?;

        Ok(AuditRecord {
            id: parse_id("audit_log_id", &self.audit_log_id)?,
            occurred_at: self.occurred_at,
            actor_type,
            actor_user_id: parse_id("actor_user_id", &self.actor_user_id)?,
            action_type: self.action_type,
            entity_type,
            entity_id: self.entity_id,
            event_id: parse_id("event_id", &self.event_id)?,
            target_user_id: self
                .target_user_id
                .as_deref()
                .map(|raw| parse_id("target_user_id", raw))
                .transpose()?,
            summary: self.summary,
            before: self.before_state,
            after: self.after_state,
            metadata: self.metadata,
            request_id: self
                .request_id
                .as_deref()
                .map(|raw| parse_id("request_id", raw))
                .transpose()?,
        })
    }
}
