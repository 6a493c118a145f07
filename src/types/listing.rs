//! Listing types
//!
//! A listing is owned by the surrounding marketplace; the booking core only
//! reads its rent terms when pricing a reservation.

use super::error::BookingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Listing identifier (opaque, assigned by the marketplace)
pub type ListingId = String;

/// User identifier (opaque, assigned by the marketplace)
pub type UserId = String;

/// Billing unit of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentPeriod {
    /// Priced per night, booked for an exact day range
    Daily,
    /// Priced per calendar month, billed monthly
    Monthly,
    /// Priced per calendar year
    Yearly,
}

impl FromStr for RentPeriod {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(RentPeriod::Daily),
            "monthly" | "month" => Ok(RentPeriod::Monthly),
            "yearly" | "year" => Ok(RentPeriod::Yearly),
            _ => Err(BookingError::validation(format!(
                "invalid rent period '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for RentPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RentPeriod::Daily => "daily",
            RentPeriod::Monthly => "monthly",
            RentPeriod::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

/// Who carries the processor fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommissionPolicy {
    /// The renter is charged the grossed-up amount
    RenterPays,
    /// The renter pays the list price and the fee comes out of the owner's settlement
    OwnerPays,
    /// No fee handling at all
    None,
}

impl FromStr for CommissionPolicy {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "renter_pays" | "renter" => Ok(CommissionPolicy::RenterPays),
            "owner_pays" | "owner" => Ok(CommissionPolicy::OwnerPays),
            "none" | "" => Ok(CommissionPolicy::None),
            _ => Err(BookingError::validation(format!(
                "invalid commission policy '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for CommissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommissionPolicy::RenterPays => "renter_pays",
            CommissionPolicy::OwnerPays => "owner_pays",
            CommissionPolicy::None => "none",
        };
        f.write_str(name)
    }
}

/// Rent terms of a listing at the moment it is priced
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Listing identifier
    pub id: ListingId,

    /// Owner who receives settlements
    pub owner: UserId,

    /// Human readable title, used in processor charge descriptions
    pub title: String,

    /// Billing unit
    pub rent_period: RentPeriod,

    /// Price per unit of `rent_period`
    pub unit_price: Decimal,

    /// Minimum number of nights (daily listings only)
    pub min_day: i64,

    /// Fee policy
    pub commission: CommissionPolicy,
}
