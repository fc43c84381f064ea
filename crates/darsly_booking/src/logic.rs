// --- File: crates/darsly_booking/src/logic.rs ---
//! Booking lifecycle: atomic slot reservation, teacher approval/rejection,
//! cancellation, payment finalization and session completion.
//!
//! Every mutating operation runs in one transaction: either the booking row
//! and its slot reservations change together, or nothing changes at all.
//! Transitions are conditional updates, so a race between two callers
//! resolves to exactly one winner and one precise error.

use crate::error::BookingError;
use chrono::Utc;
use chrono_tz::Asia::Dubai;
use darsly_common::models::{
    Booking, BookingPaymentStatus, BookingStatus, Slot,
};
use darsly_common::services::RateProvider;
use darsly_db::{
    DbClient, ReserveError, SqlBookingRepository, SqlSlotRepository,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Request to create a booking.
#[derive(Deserialize, Debug, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateBookingRequest {
    pub student_id: String,
    pub teacher_id: String,
    /// Slots to reserve, all owned by `teacher_id`.
    pub slot_ids: Vec<String>,
    /// Subject the sessions are for, if the student picked one.
    pub subject_id: Option<String>,
    /// Human-readable label shown on the booking and the checkout page.
    pub subject_label: Option<String>,
}

/// Request to publish a new availability slot (teacher scheduling surface).
#[derive(Deserialize, Debug, Clone)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AddSlotRequest {
    pub teacher_id: String,
    /// Date in YYYY-MM-DD format
    pub date: chrono::NaiveDate,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub subject_id: Option<String>,
}

/// Booking lifecycle service.
///
/// Owns booking rows and the slot-release side effect; payments interact
/// with it only through [`finalize_on_payment`](Self::finalize_on_payment),
/// [`mark_payment_failed`](Self::mark_payment_failed) and
/// [`cancel`](Self::cancel).
pub struct BookingLifecycle {
    db: DbClient,
    slots: SqlSlotRepository,
    bookings: SqlBookingRepository,
    rates: Arc<dyn RateProvider>,
}

impl BookingLifecycle {
    pub fn new(db: DbClient, rates: Arc<dyn RateProvider>) -> Self {
        let slots = SqlSlotRepository::new(db.clone());
        let bookings = SqlBookingRepository::new(db.clone());
        Self {
            db,
            slots,
            bookings,
            rates,
        }
    }

    /// Create the tables this service owns.
    pub async fn init_schema(&self) -> Result<(), BookingError> {
        self.slots.init_schema().await?;
        self.bookings.init_schema().await?;
        Ok(())
    }

    /// Publish a teacher availability slot.
    pub async fn add_slot(&self, request: AddSlotRequest) -> Result<Slot, BookingError> {
        let slot = Slot {
            id: Uuid::new_v4().to_string(),
            teacher_id: request.teacher_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            subject_id: request.subject_id,
            status: darsly_common::models::SlotStatus::Available,
            booking_id: None,
        };
        self.slots.insert(&slot).await?;
        Ok(slot)
    }

    /// List a teacher's slots.
    pub async fn list_slots(&self, teacher_id: &str) -> Result<Vec<Slot>, BookingError> {
        Ok(self.slots.find_by_teacher(teacher_id).await?)
    }

    /// Remove a slot that has not been booked.
    pub async fn remove_slot(&self, slot_id: &str) -> Result<(), BookingError> {
        if self.slots.delete_if_available(slot_id).await? {
            Ok(())
        } else {
            Err(BookingError::SlotUnavailable {
                slot_id: slot_id.to_string(),
            })
        }
    }

    /// Reserve the requested slots and create a pending booking, atomically.
    ///
    /// Validation happens on a plain read first; the conditional updates
    /// inside the transaction remain the only authority on availability, so
    /// a slot taken between the read and the write still fails cleanly with
    /// `SlotUnavailable` and rolls everything back.
    pub async fn create(&self, request: CreateBookingRequest) -> Result<Booking, BookingError> {
        if request.slot_ids.is_empty() {
            return Err(BookingError::NoSlotsSelected);
        }

        let mut loaded = Vec::with_capacity(request.slot_ids.len());
        for slot_id in &request.slot_ids {
            let slot = self.slots.find_by_id(slot_id).await?.ok_or_else(|| {
                BookingError::SlotUnavailable {
                    slot_id: slot_id.clone(),
                }
            })?;
            loaded.push(slot);
        }

        if loaded.iter().any(|s| s.teacher_id != request.teacher_id) {
            return Err(BookingError::MixedTeachers);
        }

        // A subject-restricted slot only accepts its own subject.
        if let Some(requested) = request.subject_id.as_deref() {
            for slot in &loaded {
                if let Some(restricted) = slot.subject_id.as_deref() {
                    if restricted != requested {
                        return Err(BookingError::SubjectMismatch {
                            slot_id: slot.id.clone(),
                        });
                    }
                }
            }
        }

        // Slots are published in the marketplace's operating timezone.
        let now_local = Utc::now().with_timezone(&Dubai).naive_local();
        for slot in &loaded {
            if slot.date.and_time(slot.start_time) <= now_local {
                return Err(BookingError::SlotInPast {
                    slot_id: slot.id.clone(),
                });
            }
        }

        let rate = self
            .rates
            .unit_price(&request.teacher_id, request.subject_id.as_deref())
            .await
            .map_err(|e| BookingError::RateLookup(e.to_string()))?;

        let subject_label = request
            .subject_label
            .or_else(|| rate.product_name.clone())
            .unwrap_or_else(|| "Private session".to_string());

        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            teacher_id: request.teacher_id.clone(),
            student_id: request.student_id.clone(),
            slot_ids: request.slot_ids.clone(),
            subject_label,
            unit_price: rate.unit_amount,
            total_price: rate.unit_amount * request.slot_ids.len() as i64,
            currency: rate.currency,
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            cancelled_at: None,
            completed_at: None,
        };

        let mut tx = self.db.begin().await.map_err(BookingError::Database)?;
        self.bookings.insert_tx(&mut tx, &booking).await?;

        if let Err(e) = self
            .slots
            .reserve_tx(&mut tx, &booking.slot_ids, &booking.teacher_id, &booking.id)
            .await
        {
            // No slots are left half-reserved and no booking row survives.
            let _ = tx.rollback().await;
            return Err(match e {
                ReserveError::Unavailable { slot_id } => BookingError::SlotUnavailable { slot_id },
                ReserveError::TeacherMismatch { .. } => BookingError::MixedTeachers,
                ReserveError::Db(db) => BookingError::Database(db),
            });
        }

        tx.commit()
            .await
            .map_err(|e| BookingError::Database(darsly_db::DbError::TransactionError(e.to_string())))?;

        info!(
            "Created booking {} for student {} with {} slot(s), total {} {}",
            booking.id,
            booking.student_id,
            booking.slot_ids.len(),
            booking.total_price,
            booking.currency
        );
        Ok(booking)
    }

    /// Teacher accepts a pending booking. Slots stay reserved.
    pub async fn approve(
        &self,
        booking_id: &str,
        acting_teacher_id: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        if booking.teacher_id != acting_teacher_id {
            return Err(BookingError::Unauthorized);
        }

        let advanced = self
            .bookings
            .update_status(
                booking_id,
                &[BookingStatus::Pending],
                BookingStatus::Confirmed,
                Utc::now(),
            )
            .await?;
        if !advanced {
            let current = self.load(booking_id).await?;
            return Err(BookingError::AlreadyFinalized(current.status));
        }

        self.load(booking_id).await
    }

    /// Teacher declines a pending booking; its slots are released.
    pub async fn reject(
        &self,
        booking_id: &str,
        acting_teacher_id: &str,
        reason: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        if booking.teacher_id != acting_teacher_id {
            return Err(BookingError::Unauthorized);
        }

        let mut tx = self.db.begin().await.map_err(BookingError::Database)?;
        let advanced = self
            .bookings
            .update_status_tx(
                &mut tx,
                booking_id,
                &[BookingStatus::Pending],
                BookingStatus::Rejected,
                Utc::now(),
            )
            .await?;
        if !advanced {
            let _ = tx.rollback().await;
            let current = self.load(booking_id).await?;
            return Err(BookingError::AlreadyFinalized(current.status));
        }
        self.slots
            .release_tx(&mut tx, &booking.slot_ids, booking_id)
            .await?;
        tx.commit()
            .await
            .map_err(|e| BookingError::Database(darsly_db::DbError::TransactionError(e.to_string())))?;

        info!(
            "Booking {} rejected by teacher {}{}",
            booking_id,
            acting_teacher_id,
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        );
        self.load(booking_id).await
    }

    /// Student or teacher cancels a booking that is not yet completed; its
    /// slots are released.
    pub async fn cancel(
        &self,
        booking_id: &str,
        acting_user_id: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        if booking.student_id != acting_user_id && booking.teacher_id != acting_user_id {
            return Err(BookingError::Unauthorized);
        }

        let mut tx = self.db.begin().await.map_err(BookingError::Database)?;
        let advanced = self
            .bookings
            .update_status_tx(
                &mut tx,
                booking_id,
                &[BookingStatus::Pending, BookingStatus::Confirmed],
                BookingStatus::Cancelled,
                Utc::now(),
            )
            .await?;
        if !advanced {
            let _ = tx.rollback().await;
            let current = self.load(booking_id).await?;
            return Err(match current.status {
                BookingStatus::Completed => BookingError::AlreadyCompleted,
                status => BookingError::AlreadyFinalized(status),
            });
        }
        self.slots
            .release_tx(&mut tx, &booking.slot_ids, booking_id)
            .await?;
        tx.commit()
            .await
            .map_err(|e| BookingError::Database(darsly_db::DbError::TransactionError(e.to_string())))?;

        info!("Booking {} cancelled by {}", booking_id, acting_user_id);
        self.load(booking_id).await
    }

    /// Record a settled payment. Called only by the payment reconciler.
    ///
    /// Idempotent: returns `true` only the first time the booking flips to
    /// paid, so callers fire settlement side effects at most once. A pending
    /// booking auto-advances to confirmed.
    pub async fn finalize_on_payment(&self, booking_id: &str) -> Result<bool, BookingError> {
        // Existence check keeps an orphaned payment from minting paid state.
        let _ = self.load(booking_id).await?;
        let newly_paid = self.bookings.mark_paid(booking_id, Utc::now()).await?;
        if newly_paid {
            info!("Booking {} marked paid", booking_id);
        }
        Ok(newly_paid)
    }

    /// Record a failed payment attempt on the booking.
    ///
    /// Deliberately does NOT release the slots: a retrying client may still
    /// settle with a fresh payment, and freeing the slot here would race
    /// that retry. Only an explicit cancel releases.
    pub async fn mark_payment_failed(&self, booking_id: &str) -> Result<(), BookingError> {
        let updated = self
            .bookings
            .set_payment_status(booking_id, BookingPaymentStatus::Failed)
            .await?;
        if !updated {
            warn!("Payment-failed mark on unknown booking {}", booking_id);
            return Err(BookingError::NotFound(booking_id.to_string()));
        }
        Ok(())
    }

    /// Teacher marks the session delivered. Only valid from confirmed.
    pub async fn complete(
        &self,
        booking_id: &str,
        acting_teacher_id: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        if booking.teacher_id != acting_teacher_id {
            return Err(BookingError::Unauthorized);
        }

        let advanced = self
            .bookings
            .update_status(
                booking_id,
                &[BookingStatus::Confirmed],
                BookingStatus::Completed,
                Utc::now(),
            )
            .await?;
        if !advanced {
            let current = self.load(booking_id).await?;
            return Err(match current.status {
                BookingStatus::Completed => BookingError::AlreadyFinalized(current.status),
                status => BookingError::NotConfirmed(status),
            });
        }

        self.load(booking_id).await
    }

    /// Fetch a booking.
    pub async fn get(&self, booking_id: &str) -> Result<Booking, BookingError> {
        self.load(booking_id).await
    }

    /// List a student's bookings.
    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_for_student(student_id).await?)
    }

    /// List a teacher's bookings.
    pub async fn list_for_teacher(&self, teacher_id: &str) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_for_teacher(teacher_id).await?)
    }

    async fn load(&self, booking_id: &str) -> Result<Booking, BookingError> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))
    }
}
