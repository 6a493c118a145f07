//! Pricing engine
//!
//! Pure functions that turn a listing's rent terms and a requested date range
//! into a priced, normalized reservation window, the billing window of the
//! first payment and its payment deadline. Nothing here performs I/O; the
//! current time is passed in.
//!
//! # Rules
//!
//! - **Daily**: the window is exactly `[start, end]`; day count must be within
//!   `[max(1, min_day), max_daily_days]`. Price = unit price × days.
//! - **Monthly**: the window is widened to whole calendar months. Price = unit
//!   price × months. The first payment bills the first month.
//! - **Yearly**: the end month must be the month before the start month; the
//!   window is the calendar year of the start date. Price = unit price × the
//!   number of calendar years the requested range touches.
//!
//! Commission under `RenterPays` grosses the charge up so that after the
//! processor takes its fee the net equals the list price:
//!
//! ```text
//! X = (P + FIXED_FEE) / (1 - FEE_PERCENT / 100)
//! ```

use crate::types::{BookingError, CommissionPolicy, EngineConfig, Listing, RentPeriod};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Priced reservation window
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Normalized first day of the reservation
    pub start_date: NaiveDate,
    /// Normalized last day of the reservation, inclusive
    pub end_date: NaiveDate,
    /// First day billed by the first payment
    pub billing_start: NaiveDate,
    /// Last day billed by the first payment, inclusive
    pub billing_end: NaiveDate,
    /// Days, months or years covered, depending on the rent period
    pub units: i64,
    pub total_price: Decimal,
    /// List price of the first payment
    pub first_payment_gross: Decimal,
    /// What the renter is charged for the first payment
    pub first_payment_amount: Decimal,
    /// First payment deadline
    pub expire: DateTime<Utc>,
}

/// Billing window and deadline of one installment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallmentWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub expire: DateTime<Utc>,
}

/// Normalized window before money is attached
struct Window {
    start: NaiveDate,
    end: NaiveDate,
    billing_start: NaiveDate,
    billing_end: NaiveDate,
    units: i64,
}

/// Price a booking request
///
/// # Arguments
///
/// * `listing` - Rent terms of the listing
/// * `start` - Requested first day
/// * `end` - Requested last day
/// * `now` - Current time
/// * `config` - Fees, timezone and limits
///
/// # Errors
///
/// Returns `BookingError::Validation` for any date or range that the rent
/// period does not allow, or when it is too late to book the start date.
pub fn quote(
    listing: &Listing,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<Quote, BookingError> {
    let tz = config.timezone()?;

    if listing.unit_price <= Decimal::ZERO {
        return Err(BookingError::validation("listing price must be positive"));
    }

    let window = match listing.rent_period {
        RentPeriod::Daily => daily_window(listing, start, end, config)?,
        RentPeriod::Monthly => monthly_window(start, end, now, tz)?,
        RentPeriod::Yearly => yearly_window(start, end, now, tz)?,
    };

    let total_price = listing
        .unit_price
        .checked_mul(Decimal::from(window.units))
        .map(round_money)
        .ok_or_else(|| BookingError::validation("total price is out of range"))?;

    let first_payment_gross = match listing.rent_period {
        RentPeriod::Daily => total_price,
        RentPeriod::Monthly | RentPeriod::Yearly => round_money(listing.unit_price),
    };
    let first_payment_amount = charge_amount(first_payment_gross, listing.commission, config)?;
    let expire = payment_deadline(listing.rent_period, window.start, now, tz, config)?;

    Ok(Quote {
        start_date: window.start,
        end_date: window.end,
        billing_start: window.billing_start,
        billing_end: window.billing_end,
        units: window.units,
        total_price,
        first_payment_gross,
        first_payment_amount,
        expire,
    })
}

fn daily_window(
    listing: &Listing,
    start: NaiveDate,
    end: NaiveDate,
    config: &EngineConfig,
) -> Result<Window, BookingError> {
    if end < start {
        return Err(BookingError::validation("end date must be after start date"));
    }

    let days = (end - start).num_days() + 1;
    if days < 1 {
        return Err(BookingError::validation(
            "rental house must be rented at least 1 day",
        ));
    }
    if days < listing.min_day {
        return Err(BookingError::validation(format!(
            "rental house must be rented at least {} days",
            listing.min_day
        )));
    }
    if days > config.max_daily_days {
        return Err(BookingError::validation(format!(
            "rental house can be rented at most {} days",
            config.max_daily_days
        )));
    }

    Ok(Window {
        start,
        end,
        billing_start: start,
        billing_end: end,
        units: days,
    })
}

fn monthly_window(
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Result<Window, BookingError> {
    ensure_future_month(start, now, tz)?;

    let window_start = first_day_of_month(start)?;
    let window_end = last_day_of_month(end.year(), end.month())?;
    if window_end < window_start {
        return Err(BookingError::validation("end date must be after start date"));
    }

    Ok(Window {
        start: window_start,
        end: window_end,
        billing_start: window_start,
        billing_end: last_day_of_month(start.year(), start.month())?,
        units: month_index(end) - month_index(start) + 1,
    })
}

fn yearly_window(
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Result<Window, BookingError> {
    ensure_future_month(start, now, tz)?;

    if end <= start {
        return Err(BookingError::validation("end date must be after start date"));
    }
    let anchor_month = if start.month() == 1 {
        12
    } else {
        start.month() - 1
    };
    if end.month() != anchor_month {
        return Err(BookingError::validation(
            "end date must be start date's previous month",
        ));
    }

    let window_start = date(start.year(), 1, 1)?;
    let window_end = date(start.year(), 12, 31)?;

    Ok(Window {
        start: window_start,
        end: window_end,
        billing_start: window_start,
        billing_end: window_end,
        units: i64::from(end.year() - start.year()) + 1,
    })
}

/// Reject a start month that is not strictly after the current month
fn ensure_future_month(
    start: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Result<(), BookingError> {
    let local_now = now.with_timezone(&tz);
    if (start.year(), start.month()) <= (local_now.year(), local_now.month()) {
        return Err(BookingError::validation(
            "you must select a start date in the future",
        ));
    }
    Ok(())
}

/// First payment deadline
///
/// Normally `now + payment_window_hours`. For daily and monthly rentals a
/// deadline past the start of the window is clamped to one hour after the
/// window starts, and the booking is refused if less than a full payment
/// window remains before that clamped deadline.
pub fn payment_deadline(
    period: RentPeriod,
    window_start: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
    config: &EngineConfig,
) -> Result<DateTime<Utc>, BookingError> {
    let window = Duration::hours(config.payment_window_hours);
    let expire = now + window;

    // Yearly windows start on Jan 1, which is a calendar anchor rather than
    // the move-in day, so only the future-month rule applies to them.
    if period == RentPeriod::Yearly {
        return Ok(expire);
    }

    let start_at = local_instant(window_start, NaiveTime::MIN, tz)?;
    if expire <= start_at {
        return Ok(expire);
    }

    let clamped = start_at + Duration::hours(1);
    if now > clamped - window {
        return Err(BookingError::validation(
            "you are late to select the start date, choose another date",
        ));
    }
    Ok(clamped)
}

/// Billing windows of the installments that follow the first payment
///
/// One window per calendar month, starting the month after `billing_start`,
/// for every month that ends on or before `reservation_end`. Each installment
/// falls due on `installment_due_day` of its month at 23:59:59 local time.
pub fn installment_windows(
    billing_start: NaiveDate,
    reservation_end: NaiveDate,
    config: &EngineConfig,
) -> Result<Vec<InstallmentWindow>, BookingError> {
    let tz = config.timezone()?;
    let due_time = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| BookingError::validation("invalid due time"))?;

    let mut windows = Vec::new();
    let mut index = month_index(billing_start) + 1;
    loop {
        let first = month_from_index(index)?;
        let last = last_day_of_month(first.year(), first.month())?;
        if last > reservation_end {
            break;
        }

        let due = date(first.year(), first.month(), config.installment_due_day)?;
        windows.push(InstallmentWindow {
            start_date: first,
            end_date: last,
            expire: local_instant(due, due_time, tz)?,
        });
        index += 1;
    }

    Ok(windows)
}

/// Round to cents, half away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Gross a net amount up so that the processor fee is covered
///
/// # Errors
///
/// Returns `BookingError::Validation` if the configured fee leaves nothing
/// to charge or the amount is out of range.
pub fn gross_up(amount: Decimal, config: &EngineConfig) -> Result<Decimal, BookingError> {
    let share = Decimal::ONE
        .checked_sub(config.fee_percent / Decimal::ONE_HUNDRED)
        .filter(|share| *share > Decimal::ZERO)
        .ok_or_else(|| BookingError::validation("fee percent leaves nothing to charge"))?;

    amount
        .checked_add(config.fixed_fee)
        .and_then(|fee_included| fee_included.checked_div(share))
        .map(round_money)
        .ok_or_else(|| BookingError::validation("amount is out of range"))
}

/// Fee the processor takes from a charge of `amount`
pub fn processor_fee(amount: Decimal, config: &EngineConfig) -> Result<Decimal, BookingError> {
    Ok(gross_up(amount, config)? - amount)
}

/// Amount charged to the renter for a list price under `policy`
pub fn charge_amount(
    gross: Decimal,
    policy: CommissionPolicy,
    config: &EngineConfig,
) -> Result<Decimal, BookingError> {
    match policy {
        CommissionPolicy::RenterPays => gross_up(gross, config),
        CommissionPolicy::OwnerPays | CommissionPolicy::None => Ok(gross),
    }
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate, BookingError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        BookingError::validation(format!("{}-{:02}-{:02} is not a valid date", year, month, day))
    })
}

fn first_day_of_month(day: NaiveDate) -> Result<NaiveDate, BookingError> {
    date(day.year(), day.month(), 1)
}

/// Last calendar day of a month
pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, BookingError> {
    let next = if month == 12 {
        date(year + 1, 1, 1)?
    } else {
        date(year, month + 1, 1)?
    };
    next.pred_opt()
        .ok_or_else(|| BookingError::validation("date is out of range"))
}

fn month_index(day: NaiveDate) -> i64 {
    i64::from(day.year()) * 12 + i64::from(day.month0())
}

fn month_from_index(index: i64) -> Result<NaiveDate, BookingError> {
    let year = i32::try_from(index.div_euclid(12))
        .map_err(|_| BookingError::validation("date is out of range"))?;
    // rem_euclid(12) is always in 0..12
    let month = index.rem_euclid(12) as u32 + 1;
    date(year, month, 1)
}

/// Instant of a local wall-clock time in the reference timezone
pub fn local_instant(
    day: NaiveDate,
    time: NaiveTime,
    tz: FixedOffset,
) -> Result<DateTime<Utc>, BookingError> {
    tz.from_local_datetime(&day.and_time(time))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| BookingError::validation(format!("{} has no local instant", day)))
}
