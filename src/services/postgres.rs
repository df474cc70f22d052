//! PostgreSQL implementation of the persistence contract.
//!
//! Expected schema (owned outside this crate):
//!
//! ```text
//! donors        (id BIGSERIAL, full_name TEXT, email TEXT, blood_type TEXT NULL,
//!                organ TEXT, age INT, latitude DOUBLE PRECISION, longitude DOUBLE PRECISION)
//! recipients    (id BIGSERIAL, full_name TEXT, email TEXT, blood_type TEXT NULL,
//!                needed_organ TEXT, urgency_level INT NULL, age INT,
//!                latitude DOUBLE PRECISION, longitude DOUBLE PRECISION)
//! requests      (id BIGSERIAL, donor_id BIGINT, recipient_id BIGINT,
//!                status TEXT, created_at TIMESTAMPTZ)
//! matches       (id BIGSERIAL, donor_id BIGINT, recipient_id BIGINT, donor_name TEXT,
//!                recipient_name TEXT, organ TEXT, match_date TIMESTAMPTZ)
//! notifications (id BIGSERIAL, user_id BIGINT, message TEXT, type TEXT,
//!                created_at TIMESTAMPTZ)
//! ```

use crate::models::{
    AcceptedRequest, Donor, Match, NewMatch, NewNotification, Notification, NotificationKind,
    PendingRequest, Recipient, RecordId, Request, RequestStatus,
};
use crate::services::gateway::{Gateway, StoreError, UnitOfWork};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;

const DONOR_COLUMNS: &str =
    "id, full_name, email, blood_type, organ, age, latitude, longitude";
const RECIPIENT_COLUMNS: &str =
    "id, full_name, email, blood_type, needed_organ, urgency_level, age, latitude, longitude";
const REQUEST_COLUMNS: &str = "id, donor_id, recipient_id, status, created_at";

fn donor_from_row(row: &PgRow) -> Result<Donor, StoreError> {
    Ok(Donor {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        blood_type: row.try_get("blood_type")?,
        organ: row.try_get("organ")?,
        age: row.try_get("age")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
    })
}

fn recipient_from_row(row: &PgRow) -> Result<Recipient, StoreError> {
    Ok(Recipient {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        blood_type: row.try_get("blood_type")?,
        needed_organ: row.try_get("needed_organ")?,
        urgency_level: row.try_get("urgency_level")?,
        age: row.try_get("age")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
    })
}

fn parse_status(raw: &str) -> Result<RequestStatus, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

fn request_from_row(row: &PgRow) -> Result<Request, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Request {
        id: row.try_get("id")?,
        donor_id: row.try_get("donor_id")?,
        recipient_id: row.try_get("recipient_id")?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let kind: String = row.try_get("type")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        message: row.try_get("message")?,
        kind: kind.parse::<NotificationKind>().map_err(StoreError::Corrupt)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Transaction-scoped unit of work
struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_pair(&mut self, donor_id: RecordId, recipient_id: RecordId) -> Result<(), StoreError> {
        // Released automatically at commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("request:{}:{}", donor_id, recipient_id))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn donor(&mut self, id: RecordId) -> Result<Option<Donor>, StoreError> {
        let query = format!("SELECT {} FROM donors WHERE id = $1", DONOR_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .as_ref()
            .map(donor_from_row)
            .transpose()
    }

    async fn recipient(&mut self, id: RecordId) -> Result<Option<Recipient>, StoreError> {
        let query = format!("SELECT {} FROM recipients WHERE id = $1", RECIPIENT_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .as_ref()
            .map(recipient_from_row)
            .transpose()
    }

    async fn latest_request_for_pair(
        &mut self,
        donor_id: RecordId,
        recipient_id: RecordId,
    ) -> Result<Option<Request>, StoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM requests
            WHERE donor_id = $1 AND recipient_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            REQUEST_COLUMNS
        );

        sqlx::query(&query)
            .bind(donor_id)
            .bind(recipient_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .as_ref()
            .map(request_from_row)
            .transpose()
    }

    async fn insert_request(&mut self, donor_id: RecordId, recipient_id: RecordId) -> Result<Request, StoreError> {
        let query = format!(
            r#"
            INSERT INTO requests (donor_id, recipient_id, status, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(donor_id)
            .bind(recipient_id)
            .bind(RequestStatus::Pending.as_str())
            .fetch_one(&mut *self.tx)
            .await?;

        request_from_row(&row)
    }

    async fn request_for_update(&mut self, id: RecordId) -> Result<Option<Request>, StoreError> {
        let query = format!("SELECT {} FROM requests WHERE id = $1 FOR UPDATE", REQUEST_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .as_ref()
            .map(request_from_row)
            .transpose()
    }

    async fn set_request_status(&mut self, id: RecordId, status: RequestStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE requests SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Missing(format!("request {}", id)));
        }
        Ok(())
    }

    async fn insert_match(&mut self, new_match: &NewMatch) -> Result<Match, StoreError> {
        let query = r#"
            INSERT INTO matches (donor_id, recipient_id, donor_name, recipient_name, organ, match_date)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, donor_id, recipient_id, donor_name, recipient_name, organ, match_date
        "#;

        let row = sqlx::query(query)
            .bind(new_match.donor_id)
            .bind(new_match.recipient_id)
            .bind(&new_match.donor_name)
            .bind(&new_match.recipient_name)
            .bind(&new_match.organ)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(Match {
            id: row.try_get("id")?,
            donor_id: row.try_get("donor_id")?,
            recipient_id: row.try_get("recipient_id")?,
            donor_name: row.try_get("donor_name")?,
            recipient_name: row.try_get("recipient_name")?,
            organ: row.try_get("organ")?,
            matched_at: row.try_get("match_date")?,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnit { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgUnit { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

/// PostgreSQL record store
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
        )
        .await
    }
}

#[async_trait]
impl Gateway for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn donor(&self, id: RecordId) -> Result<Option<Donor>, StoreError> {
        let query = format!("SELECT {} FROM donors WHERE id = $1", DONOR_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(donor_from_row)
            .transpose()
    }

    async fn recipient(&self, id: RecordId) -> Result<Option<Recipient>, StoreError> {
        let query = format!("SELECT {} FROM recipients WHERE id = $1", RECIPIENT_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(recipient_from_row)
            .transpose()
    }

    async fn donors_offering(&self, organ: &str) -> Result<Vec<Donor>, StoreError> {
        let query = format!("SELECT {} FROM donors WHERE organ = $1 ORDER BY id", DONOR_COLUMNS);
        let rows = sqlx::query(&query).bind(organ).fetch_all(&self.pool).await?;
        rows.iter().map(donor_from_row).collect()
    }

    async fn recipients_needing(&self, organ: &str) -> Result<Vec<Recipient>, StoreError> {
        let query = format!(
            "SELECT {} FROM recipients WHERE needed_organ = $1 ORDER BY id",
            RECIPIENT_COLUMNS
        );
        let rows = sqlx::query(&query).bind(organ).fetch_all(&self.pool).await?;
        rows.iter().map(recipient_from_row).collect()
    }

    async fn latest_request_statuses(
        &self,
        recipient_id: RecordId,
    ) -> Result<HashMap<RecordId, RequestStatus>, StoreError> {
        let query = r#"
            SELECT DISTINCT ON (donor_id) donor_id, status
            FROM requests
            WHERE recipient_id = $1
            ORDER BY donor_id, created_at DESC, id DESC
        "#;

        let rows = sqlx::query(query).bind(recipient_id).fetch_all(&self.pool).await?;

        let mut statuses = HashMap::with_capacity(rows.len());
        for row in &rows {
            let status: String = row.try_get("status")?;
            statuses.insert(row.try_get("donor_id")?, parse_status(&status)?);
        }

        tracing::debug!("Recipient {} has requests with {} donors", recipient_id, statuses.len());
        Ok(statuses)
    }

    async fn pending_requests_for_donor(&self, donor_id: RecordId) -> Result<Vec<PendingRequest>, StoreError> {
        let query = r#"
            SELECT r.id, r.status, r.recipient_id, rec.full_name AS recipient_name
            FROM requests r
            JOIN recipients rec ON r.recipient_id = rec.id
            WHERE r.donor_id = $1 AND r.status = 'pending'
            ORDER BY r.id
        "#;

        let rows = sqlx::query(query).bind(donor_id).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok::<_, StoreError>(PendingRequest {
                    id: row.try_get("id")?,
                    status: parse_status(&status)?,
                    recipient_id: row.try_get("recipient_id")?,
                    recipient_name: row.try_get("recipient_name")?,
                })
            })
            .collect()
    }

    async fn accepted_requests_for_recipient(
        &self,
        recipient_id: RecordId,
    ) -> Result<Vec<AcceptedRequest>, StoreError> {
        let query = r#"
            SELECT r.id AS request_id, d.id AS donor_id, d.full_name AS donor_name, d.organ
            FROM requests r
            JOIN donors d ON r.donor_id = d.id
            WHERE r.recipient_id = $1 AND r.status = 'accepted'
            ORDER BY r.id
        "#;

        let rows = sqlx::query(query).bind(recipient_id).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok::<_, StoreError>(AcceptedRequest {
                    request_id: row.try_get("request_id")?,
                    donor_id: row.try_get("donor_id")?,
                    donor_name: row.try_get("donor_name")?,
                    organ: row.try_get("organ")?,
                })
            })
            .collect()
    }

    async fn insert_notifications(&self, batch: &[NewNotification]) -> Result<Vec<Notification>, StoreError> {
        let query = r#"
            INSERT INTO notifications (user_id, message, type, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, user_id, message, type, created_at
        "#;

        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(batch.len());
        for new in batch {
            let row = sqlx::query(query)
                .bind(new.user_id)
                .bind(&new.message)
                .bind(new.kind.as_str())
                .fetch_one(&mut *tx)
                .await?;
            written.push(notification_from_row(&row)?);
        }
        tx.commit().await?;

        Ok(written)
    }

    async fn notifications_for(&self, user_id: RecordId) -> Result<Vec<Notification>, StoreError> {
        let query = r#"
            SELECT id, user_id, message, type, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY id
        "#;

        let rows = sqlx::query(query).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}
