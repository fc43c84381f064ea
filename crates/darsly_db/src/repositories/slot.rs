//! SQL repository for teacher availability slots.
//!
//! Slot rows are the primary contention point of the whole system: two
//! students racing for the same interval must never both win. Reservation is
//! therefore a conditional update (`... WHERE status = 'available'`) checked
//! through `rows_affected` and executed inside the caller's transaction,
//! never a read followed by a write.

use crate::client::{DbClient, DbTransaction};
use crate::error::DbError;
use chrono::{NaiveDate, NaiveTime};
use darsly_common::models::{Slot, SlotStatus};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, error, info};

/// Why a reservation attempt was rejected.
#[derive(Debug, Error)]
pub enum ReserveError {
    /// The slot is missing, already booked, or was taken by a concurrent
    /// reservation.
    #[error("slot {slot_id} is not available")]
    Unavailable { slot_id: String },

    /// The slot exists but belongs to a different teacher.
    #[error("slot {slot_id} does not belong to teacher {teacher_id}")]
    TeacherMismatch { slot_id: String, teacher_id: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// SQL repository for slots.
#[derive(Debug, Clone)]
pub struct SqlSlotRepository {
    db_client: DbClient,
}

impl SqlSlotRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    /// Initialize the slots table if it does not exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing slots schema");

        let query = r#"
            CREATE TABLE IF NOT EXISTS slots (
                id TEXT PRIMARY KEY,
                teacher_id TEXT NOT NULL,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                subject_id TEXT,
                status TEXT NOT NULL DEFAULT 'available',
                booking_id TEXT
            )
        "#;

        self.db_client.execute(query).await?;

        info!("Slots schema initialized successfully");
        Ok(())
    }

    /// Insert a new slot (created by teacher scheduling).
    pub async fn insert(&self, slot: &Slot) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO slots (id, teacher_id, date, start_time, end_time, subject_id, status, booking_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#;

        sqlx::query(query)
            .bind(&slot.id)
            .bind(&slot.teacher_id)
            .bind(slot.date.format("%Y-%m-%d").to_string())
            .bind(slot.start_time.format("%H:%M:%S").to_string())
            .bind(slot.end_time.format("%H:%M:%S").to_string())
            .bind(&slot.subject_id)
            .bind(slot.status.as_str())
            .bind(&slot.booking_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to insert slot {}: {}", slot.id, e);
                DbError::QueryError(e.to_string())
            })?;

        Ok(())
    }

    /// Find a slot by its id.
    pub async fn find_by_id(&self, slot_id: &str) -> Result<Option<Slot>, DbError> {
        let query = r#"
            SELECT id, teacher_id, date, start_time, end_time, subject_id, status, booking_id
            FROM slots
            WHERE id = $1
        "#;

        let row = sqlx::query(query)
            .bind(slot_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        row.map(map_slot_row).transpose()
    }

    /// List a teacher's slots, soonest first.
    pub async fn find_by_teacher(&self, teacher_id: &str) -> Result<Vec<Slot>, DbError> {
        let query = r#"
            SELECT id, teacher_id, date, start_time, end_time, subject_id, status, booking_id
            FROM slots
            WHERE teacher_id = $1
            ORDER BY date, start_time
        "#;

        let rows = sqlx::query(query)
            .bind(teacher_id)
            .fetch_all(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        rows.into_iter().map(map_slot_row).collect()
    }

    /// Atomically reserve every slot in `slot_ids` for `booking_id`, inside
    /// the caller's transaction.
    ///
    /// Each slot is flipped with a conditional update; a zero `rows_affected`
    /// aborts with the precise reason. The caller must roll the transaction
    /// back on error; no slots are left half-reserved.
    pub async fn reserve_tx(
        &self,
        tx: &mut DbTransaction<'_>,
        slot_ids: &[String],
        teacher_id: &str,
        booking_id: &str,
    ) -> Result<(), ReserveError> {
        // Stable order so concurrent reservations cannot deadlock on row locks.
        let mut ordered: Vec<&String> = slot_ids.iter().collect();
        ordered.sort();
        ordered.dedup();

        for slot_id in ordered {
            let updated = sqlx::query(
                r#"
                UPDATE slots
                SET status = 'booked', booking_id = $1
                WHERE id = $2 AND teacher_id = $3 AND status = 'available'
                "#,
            )
            .bind(booking_id)
            .bind(slot_id)
            .bind(teacher_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?
            .rows_affected();

            if updated == 0 {
                return Err(self.classify_reserve_failure(tx, slot_id, teacher_id).await);
            }
        }

        debug!(
            "Reserved {} slot(s) for booking {}",
            slot_ids.len(),
            booking_id
        );
        Ok(())
    }

    /// Tell the caller why the conditional update matched nothing.
    async fn classify_reserve_failure(
        &self,
        tx: &mut DbTransaction<'_>,
        slot_id: &str,
        teacher_id: &str,
    ) -> ReserveError {
        let row = sqlx::query("SELECT teacher_id FROM slots WHERE id = $1")
            .bind(slot_id)
            .fetch_optional(&mut **tx)
            .await;

        match row {
            Ok(Some(row)) => {
                let owner: String = row.try_get("teacher_id").unwrap_or_default();
                if owner != teacher_id {
                    ReserveError::TeacherMismatch {
                        slot_id: slot_id.to_string(),
                        teacher_id: teacher_id.to_string(),
                    }
                } else {
                    ReserveError::Unavailable {
                        slot_id: slot_id.to_string(),
                    }
                }
            }
            Ok(None) => ReserveError::Unavailable {
                slot_id: slot_id.to_string(),
            },
            Err(e) => ReserveError::Db(DbError::QueryError(e.to_string())),
        }
    }

    /// Release slots held by `booking_id` back to available.
    ///
    /// Only rows still pointing at the booking are touched, so releasing an
    /// already-released (or re-reserved) slot is a no-op.
    pub async fn release(&self, slot_ids: &[String], booking_id: &str) -> Result<u64, DbError> {
        let mut released = 0;
        for slot_id in slot_ids {
            released += sqlx::query(
                r#"
                UPDATE slots
                SET status = 'available', booking_id = NULL
                WHERE id = $1 AND booking_id = $2
                "#,
            )
            .bind(slot_id)
            .bind(booking_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?
            .rows_affected();
        }

        debug!("Released {} slot(s) from booking {}", released, booking_id);
        Ok(released)
    }

    /// Release slots inside the caller's transaction.
    ///
    /// Same semantics as [`release`](Self::release), for callers that need
    /// the release to commit together with a booking status change.
    pub async fn release_tx(
        &self,
        tx: &mut DbTransaction<'_>,
        slot_ids: &[String],
        booking_id: &str,
    ) -> Result<u64, DbError> {
        let mut released = 0;
        for slot_id in slot_ids {
            released += sqlx::query(
                r#"
                UPDATE slots
                SET status = 'available', booking_id = NULL
                WHERE id = $1 AND booking_id = $2
                "#,
            )
            .bind(slot_id)
            .bind(booking_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?
            .rows_affected();
        }
        Ok(released)
    }

    /// Delete a slot, but only while it is still available.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete_if_available(&self, slot_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM slots WHERE id = $1 AND status = 'available'")
            .bind(slot_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_slot_row(row: sqlx::any::AnyRow) -> Result<Slot, DbError> {
    let status_raw: String = row
        .try_get("status")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let status = SlotStatus::parse(&status_raw)
        .ok_or_else(|| DbError::Inconsistent(format!("unknown slot status '{}'", status_raw)))?;

    let date_raw: String = row
        .try_get("date")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .map_err(|e| DbError::Inconsistent(format!("bad slot date '{}': {}", date_raw, e)))?;

    let start_raw: String = row
        .try_get("start_time")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let start_time = NaiveTime::parse_from_str(&start_raw, "%H:%M:%S")
        .map_err(|e| DbError::Inconsistent(format!("bad slot time '{}': {}", start_raw, e)))?;

    let end_raw: String = row
        .try_get("end_time")
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let end_time = NaiveTime::parse_from_str(&end_raw, "%H:%M:%S")
        .map_err(|e| DbError::Inconsistent(format!("bad slot time '{}': {}", end_raw, e)))?;

    Ok(Slot {
        id: row
            .try_get("id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        teacher_id: row
            .try_get("teacher_id")
            .map_err(|e| DbError::QueryError(e.to_string()))?,
        date,
        start_time,
        end_time,
        subject_id: row.try_get::<Option<String>, _>("subject_id").ok().flatten(),
        status,
        booking_id: row.try_get::<Option<String>, _>("booking_id").ok().flatten(),
    })
}
