//! SQL repository for payments.
//!
//! Every state transition is a conditional update guarded by the set of
//! states it is legal to leave. A late webhook and a concurrent manual
//! capture therefore cannot overwrite each other: whichever lands second
//! matches zero rows and the caller re-reads to see what actually happened.

use crate::client::{fmt_ts, parse_opt_ts, parse_ts, DbClient};
use crate::error::DbError;
use chrono::{DateTime, Utc};
use darsly_common::models::{Payment, PaymentStatus};
use sqlx::Row;
use tracing::{debug, error, info};

/// SQL repository for payments.
#[derive(Debug, Clone)]
pub struct SqlPaymentRepository {
    db_client: DbClient,
}

impl SqlPaymentRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    /// Initialize the payments table if it does not exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing payments schema");

        let query = r#"
            CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                booking_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                teacher_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                gateway_order_id TEXT,
                reference TEXT NOT NULL UNIQUE,
                gateway_payload TEXT,
                created_at TEXT NOT NULL,
                paid_at TEXT,
                failed_at TEXT,
                refunded_at TEXT,
                failure_reason TEXT
            )
        "#;

        self.db_client.execute(query).await?;

        info!("Payments schema initialized successfully");
        Ok(())
    }

    /// Insert a freshly prepared payment.
    pub async fn insert(&self, payment: &Payment) -> Result<(), DbError> {
        let payload = payment
            .gateway_payload
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| DbError::QueryError(format!("failed to encode gateway payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, booking_id, student_id, teacher_id, amount, currency,
                status, gateway_order_id, reference, gateway_payload, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.booking_id)
        .bind(&payment.student_id)
        .bind(&payment.teacher_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_order_id)
        .bind(&payment.reference)
        .bind(payload)
        .bind(fmt_ts(payment.created_at))
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to insert payment {}: {}", payment.id, e);
            DbError::QueryError(e.to_string())
        })?;

        Ok(())
    }

    /// Find a payment by its id.
    pub async fn find_by_id(&self, payment_id: &str) -> Result<Option<Payment>, DbError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_PAYMENT))
            .bind(payment_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        row.map(map_payment_row).transpose()
    }

    /// Find a payment by its merchant reference (webhooks key on this).
    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, DbError> {
        let row = sqlx::query(&format!("{} WHERE reference = $1", SELECT_PAYMENT))
            .bind(reference)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        row.map(map_payment_row).transpose()
    }

    /// Find a payment by its provider-side order id.
    pub async fn find_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, DbError> {
        let row = sqlx::query(&format!("{} WHERE gateway_order_id = $1", SELECT_PAYMENT))
            .bind(gateway_order_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        row.map(map_payment_row).transpose()
    }

    /// Find the payment that currently blocks a new attempt for the booking.
    ///
    /// A booking may gain a new payment only when every earlier attempt is
    /// failed or cancelled.
    pub async fn find_active_for_booking(
        &self,
        booking_id: &str,
    ) -> Result<Option<Payment>, DbError> {
        let row = sqlx::query(&format!(
            "{} WHERE booking_id = $1 AND status IN ('pending', 'processing', 'completed') \
             ORDER BY created_at DESC",
            SELECT_PAYMENT
        ))
        .bind(booking_id)
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        row.map(map_payment_row).transpose()
    }

    /// List all payments for a booking, newest first.
    pub async fn list_for_booking(&self, booking_id: &str) -> Result<Vec<Payment>, DbError> {
        let rows = sqlx::query(&format!(
            "{} WHERE booking_id = $1 ORDER BY created_at DESC",
            SELECT_PAYMENT
        ))
        .bind(booking_id)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        rows.into_iter().map(map_payment_row).collect()
    }

    /// Cancel pending payments that never reached the gateway and are older
    /// than the cutoff. Returns how many were expired.
    pub async fn expire_abandoned(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'cancelled'
            WHERE status = 'pending' AND gateway_order_id IS NULL AND created_at < $1
            "#,
        )
        .bind(fmt_ts(cutoff))
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        if result.rows_affected() > 0 {
            info!("Expired {} abandoned payment(s)", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    /// Attach the provider order id after checkout creation.
    ///
    /// Idempotent for checkout retries: a retry carrying the same order id
    /// succeeds, a different order id for an already-linked payment does not.
    pub async fn set_gateway_order(
        &self,
        payment_id: &str,
        gateway_order_id: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET gateway_order_id = $1
            WHERE id = $2 AND (gateway_order_id IS NULL OR gateway_order_id = $1)
            "#,
        )
        .bind(gateway_order_id)
        .bind(payment_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// pending -> processing (authorised, awaiting manual capture).
    pub async fn mark_processing(&self, payment_id: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("UPDATE payments SET status = 'processing' WHERE id = $1 AND status = 'pending'")
                .bind(payment_id)
                .execute(self.db_client.pool())
                .await
                .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// pending|processing -> completed.
    pub async fn mark_completed(
        &self,
        payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'completed', paid_at = $1
            WHERE id = $2 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(fmt_ts(paid_at))
        .bind(payment_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// pending|processing -> failed, recording the gateway's reason.
    pub async fn mark_failed(
        &self,
        payment_id: &str,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', failed_at = $1, failure_reason = $2
            WHERE id = $3 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(fmt_ts(failed_at))
        .bind(reason)
        .bind(payment_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// pending|processing|completed -> cancelled.
    ///
    /// Completed is a legal source only for the in-window student
    /// cancellation path; the logic layer enforces the window.
    pub async fn mark_cancelled(&self, payment_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'cancelled'
            WHERE id = $1 AND status IN ('pending', 'processing', 'completed')
            "#,
        )
        .bind(payment_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// completed -> refunded.
    pub async fn mark_refunded(
        &self,
        payment_id: &str,
        refunded_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'refunded', refunded_at = $1
            WHERE id = $2 AND status = 'completed'
            "#,
        )
        .bind(fmt_ts(refunded_at))
        .bind(payment_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a raw gateway response to the payment's forensic payload.
    ///
    /// Not a hot path; read-modify-write is fine because only reconciliation
    /// entry points append and they are serialized by the status guards.
    pub async fn append_gateway_payload(
        &self,
        payment_id: &str,
        entry: serde_json::Value,
    ) -> Result<(), DbError> {
        let existing: Option<String> =
            sqlx::query("SELECT gateway_payload FROM payments WHERE id = $1")
                .bind(payment_id)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(|e| DbError::QueryError(e.to_string()))?
                .and_then(|row| row.try_get::<Option<String>, _>("gateway_payload").ok().flatten());

        let mut entries = existing
            .and_then(|raw| serde_json::from_str::<Vec<serde_json::Value>>(&raw).ok())
            .unwrap_or_default();
        entries.push(entry);

        let encoded = serde_json::to_string(&entries)
            .map_err(|e| DbError::QueryError(format!("failed to encode gateway payload: {}", e)))?;

        sqlx::query("UPDATE payments SET gateway_payload = $1 WHERE id = $2")
            .bind(encoded)
            .bind(payment_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(())
    }
}

const SELECT_PAYMENT: &str = r#"
    SELECT id, booking_id, student_id, teacher_id, amount, currency,
           status, gateway_order_id, reference, gateway_payload,
           created_at, paid_at, failed_at, refunded_at, failure_reason
    FROM payments
"#;

fn map_payment_row(row: sqlx::any::AnyRow) -> Result<Payment, DbError> {
    let status_raw: String = row
        .try_get("status")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let status = PaymentStatus::parse(&status_raw)
        .ok_or_else(|| DbError::Inconsistent(format!("unknown payment status '{}'", status_raw)))?;

    let payload = row
        .try_get::<Option<String>, _>("gateway_payload")
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str(&raw).ok());

    let created_raw: String = row
        .try_get("created_at")
        .map_err(|e| DbError::QueryError(e.to_string()))?;

    Ok(Payment {
        id: row
            .try_get("id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        booking_id: row
            .try_get("booking_id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        student_id: row
            .try_get("student_id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        teacher_id: row
            .try_get("teacher_id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        amount: row
            .try_get("amount")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        currency: row
            .try_get("currency")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        status,
        gateway_order_id: row
            .try_get::<Option<String>, _>("gateway_order_id")
            .ok()
            .flatten(),
        reference: row
            .try_get("reference")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        gateway_payload: payload,
        created_at: parse_ts(&created_raw)?,
        paid_at: parse_opt_ts(row.try_get::<Option<String>, _>("paid_at").ok().flatten())?,
        failed_at: parse_opt_ts(row.try_get::<Option<String>, _>("failed_at").ok().flatten())?,
        refunded_at: parse_opt_ts(row.try_get::<Option<String>, _>("refunded_at").ok().flatten())?,
        failure_reason: row
            .try_get::<Option<String>, _>("failure_reason")
            .ok()
            .flatten(),
    })
}
