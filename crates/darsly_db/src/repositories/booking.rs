//! SQL repository for bookings.
//!
//! The booking row stores the reserved slot ids as a JSON array: that list is
//! the historical record of what was reserved, and it survives the slots
//! being released on rejection or cancellation. The live reservation pointer
//! is `slots.booking_id`, owned by the slot repository.

use crate::client::{fmt_ts, parse_opt_ts, parse_ts, DbClient, DbTransaction};
use crate::error::DbError;
use chrono::{DateTime, Utc};
use darsly_common::models::{Booking, BookingPaymentStatus, BookingStatus};
use sqlx::Row;
use tracing::{debug, error, info};

/// SQL repository for bookings.
#[derive(Debug, Clone)]
pub struct SqlBookingRepository {
    db_client: DbClient,
}

impl SqlBookingRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    /// Initialize the bookings table if it does not exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing bookings schema");

        let query = r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                teacher_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                slot_ids TEXT NOT NULL,
                subject_label TEXT NOT NULL,
                unit_price INTEGER NOT NULL,
                total_price INTEGER NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                payment_status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                approved_at TEXT,
                rejected_at TEXT,
                cancelled_at TEXT,
                completed_at TEXT
            )
        "#;

        self.db_client.execute(query).await?;

        info!("Bookings schema initialized successfully");
        Ok(())
    }

    /// Insert a booking inside the caller's transaction.
    ///
    /// Runs in the same transaction as the slot reservation so a failure on
    /// either side rolls back both.
    pub async fn insert_tx(
        &self,
        tx: &mut DbTransaction<'_>,
        booking: &Booking,
    ) -> Result<(), DbError> {
        let slot_ids = serde_json::to_string(&booking.slot_ids)
            .map_err(|e| DbError::QueryError(format!("failed to encode slot ids: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, teacher_id, student_id, slot_ids, subject_label,
                unit_price, total_price, currency, status, payment_status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.teacher_id)
        .bind(&booking.student_id)
        .bind(slot_ids)
        .bind(&booking.subject_label)
        .bind(booking.unit_price)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(fmt_ts(booking.created_at))
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to insert booking {}: {}", booking.id, e);
            DbError::QueryError(e.to_string())
        })?;

        Ok(())
    }

    /// Find a booking by its id.
    pub async fn find_by_id(&self, booking_id: &str) -> Result<Option<Booking>, DbError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_BOOKING))
            .bind(booking_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        row.map(map_booking_row).transpose()
    }

    /// List a student's bookings, newest first.
    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<Booking>, DbError> {
        let rows = sqlx::query(&format!(
            "{} WHERE student_id = $1 ORDER BY created_at DESC",
            SELECT_BOOKING
        ))
        .bind(student_id)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        rows.into_iter().map(map_booking_row).collect()
    }

    /// List a teacher's bookings, newest first.
    pub async fn list_for_teacher(&self, teacher_id: &str) -> Result<Vec<Booking>, DbError> {
        let rows = sqlx::query(&format!(
            "{} WHERE teacher_id = $1 ORDER BY created_at DESC",
            SELECT_BOOKING
        ))
        .bind(teacher_id)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        rows.into_iter().map(map_booking_row).collect()
    }

    /// Conditionally advance the lifecycle status.
    ///
    /// The transition only happens while the current status is one of `from`;
    /// the timestamp column matching `to` is stamped in the same statement.
    /// Returns `true` if a row changed; `false` means a concurrent caller
    /// got there first and the caller must re-read to decide what happened.
    pub async fn update_status(
        &self,
        booking_id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let (query, stamp) = Self::status_update_query(from, to);
        let mut q = sqlx::query(&query).bind(to.as_str());
        if stamp {
            q = q.bind(fmt_ts(now));
        }
        let result = q
            .bind(booking_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Build the conditional transition statement; the bool says whether a
    /// timestamp bind is expected.
    fn status_update_query(from: &[BookingStatus], to: BookingStatus) -> (String, bool) {
        let stamp_column = match to {
            BookingStatus::Confirmed => Some("approved_at"),
            BookingStatus::Rejected => Some("rejected_at"),
            BookingStatus::Cancelled => Some("cancelled_at"),
            BookingStatus::Completed => Some("completed_at"),
            BookingStatus::Pending => None,
        };

        // `from` holds static enum names, not user input.
        let from_list = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        match stamp_column {
            Some(column) => (
                format!(
                    "UPDATE bookings SET status = $1, {} = $2 WHERE id = $3 AND status IN ({})",
                    column, from_list
                ),
                true,
            ),
            None => (
                format!(
                    "UPDATE bookings SET status = $1 WHERE id = $2 AND status IN ({})",
                    from_list
                ),
                false,
            ),
        }
    }

    /// Conditional status advance inside the caller's transaction.
    ///
    /// Same semantics as [`update_status`](Self::update_status); used when a
    /// slot release must commit atomically with the transition.
    pub async fn update_status_tx(
        &self,
        tx: &mut DbTransaction<'_>,
        booking_id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let (query, stamp) = Self::status_update_query(from, to);
        let mut q = sqlx::query(&query).bind(to.as_str());
        if stamp {
            q = q.bind(fmt_ts(now));
        }
        let result = q
            .bind(booking_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a settled payment on the booking. Idempotent.
    ///
    /// Marks the payment side paid and, when the booking is still pending,
    /// auto-advances it to confirmed. Returns `true` only the first time the
    /// payment status actually flips, so side effects can fire at most once.
    pub async fn mark_paid(&self, booking_id: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
        let mut tx = self.db_client.begin().await?;

        let flipped = sqlx::query(
            "UPDATE bookings SET payment_status = 'paid' WHERE id = $1 AND payment_status <> 'paid'",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?
        .rows_affected();

        sqlx::query(
            "UPDATE bookings SET status = 'confirmed', approved_at = $1 WHERE id = $2 AND status = 'pending'",
        )
        .bind(fmt_ts(now))
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;

        Ok(flipped > 0)
    }

    /// Overwrite the denormalized payment status (used for failed attempts).
    pub async fn set_payment_status(
        &self,
        booking_id: &str,
        status: BookingPaymentStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE bookings SET payment_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(booking_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

const SELECT_BOOKING: &str = r#"
    SELECT id, teacher_id, student_id, slot_ids, subject_label,
           unit_price, total_price, currency, status, payment_status,
           created_at, approved_at, rejected_at, cancelled_at, completed_at
    FROM bookings
"#;

fn map_booking_row(row: sqlx::any::AnyRow) -> Result<Booking, DbError> {
    let status_raw: String = row
        .try_get("status")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let status = BookingStatus::parse(&status_raw)
        .ok_or_else(|| DbError::Inconsistent(format!("unknown booking status '{}'", status_raw)))?;

    let payment_raw: String = row
        .try_get("payment_status")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let payment_status = BookingPaymentStatus::parse(&payment_raw).ok_or_else(|| {
        DbError::Inconsistent(format!("unknown booking payment status '{}'", payment_raw))
    })?;

    let slot_ids_raw: String = row
        .try_get("slot_ids")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let slot_ids: Vec<String> = serde_json::from_str(&slot_ids_raw)
        .map_err(|e| DbError::Inconsistent(format!("bad slot_ids '{}': {}", slot_ids_raw, e)))?;

    let created_raw: String = row
        .try_get("created_at")
        .map_err(|e| DbError::QueryError(e.to_string()))?;

    Ok(Booking {
        id: row
            .try_get("id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        teacher_id: row
            .try_get("teacher_id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        student_id: row
            .try_get("student_id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        slot_ids,
        subject_label: row
            .try_get("subject_label")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        unit_price: row
            .try_get("unit_price")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        total_price: row
            .try_get("total_price")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        currency: row
            .try_get("currency")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        status,
        payment_status,
        created_at: parse_ts(&created_raw)?,
        approved_at: parse_opt_ts(row.try_get::<Option<String>, _>("approved_at").ok().flatten())?,
        rejected_at: parse_opt_ts(row.try_get::<Option<String>, _>("rejected_at").ok().flatten())?,
        cancelled_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("cancelled_at").ok().flatten(),
        )?,
        completed_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("completed_at").ok().flatten(),
        )?,
    })
}
