//! Availability checker
//!
//! Decides whether a listing is free for a candidate window. Windows are
//! closed date intervals, matching the inclusive windows produced by the
//! pricing engine, so two reservations that share a single day overlap.

use super::traits::ReservationRepository;
use crate::types::{BookingError, Reservation, ReservationId};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Closed-interval intersection of `[a_start, a_end]` and `[b_start, b_end]`
pub fn windows_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// Whether `reservation` blocks `[start, end]` at `now`
pub fn blocks(
    reservation: &Reservation,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
) -> bool {
    reservation.is_active(now)
        && windows_overlap(start, end, reservation.start_date, reservation.end_date)
}

/// Availability queries against the reservation store
#[derive(Clone)]
pub struct AvailabilityChecker {
    reservations: Arc<dyn ReservationRepository>,
}

impl AvailabilityChecker {
    pub fn new(reservations: Arc<dyn ReservationRepository>) -> Self {
        Self { reservations }
    }

    /// Fail if an active reservation on `listing` overlaps `[start, end]`
    ///
    /// # Arguments
    ///
    /// * `listing` - Listing to check
    /// * `start` / `end` - Candidate window, inclusive
    /// * `now` - Current time, for Pending deadline expiry
    /// * `exclude` - Reservation to ignore (the one being re-checked)
    ///
    /// # Errors
    ///
    /// Returns `BookingError::Conflict` if the window is taken, or the storage
    /// error if the query failed.
    pub fn ensure_available(
        &self,
        listing: &str,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
        exclude: Option<ReservationId>,
    ) -> Result<(), BookingError> {
        if self
            .reservations
            .find_overlapping(listing, start, end, now, exclude)?
        {
            debug!(listing, %start, %end, "window already reserved");
            return Err(BookingError::conflict(
                "rental house is not available in the given date range",
            ));
        }
        Ok(())
    }

    /// Every calendar day covered by an active reservation, ascending
    pub fn reserved_dates(
        &self,
        listing: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>, BookingError> {
        let mut days = BTreeSet::new();

        for reservation in self.reservations.reservations_for_listing(listing)? {
            if !reservation.is_active(now) {
                continue;
            }
            days.extend(
                reservation
                    .start_date
                    .iter_days()
                    .take_while(|day| *day <= reservation.end_date),
            );
        }

        Ok(days.into_iter().collect())
    }
}
