//! Donations
//!
//! The donation entity, its closed value sets and the pure rules of its lifecycle. Storage
//! backends call the transition guards in here, the [`Lifecycle`](crate::lifecycle::Lifecycle)
//! manager decides which one applies.

use core::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::LifecycleError;

pub use filter::DEFAULT_LIMIT;
pub use filter::DonationFilter;
pub use filter::DonationPage;
pub use filter::ListedDonation;
pub use filter::Proximity;
pub use filter::Sort;
pub use filter::StatusFilter;
pub use geo::EARTH_RADIUS_MILES;
pub use geo::Point;
pub use validation::DonationPatch;
pub use validation::NewDonation;
pub use validation::ValidationError;

mod filter;
mod geo;
mod validation;

/// A string was not part of a closed value set
#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the value set
    pub(crate) kind: &'static str,

    /// The rejected value
    pub(crate) value: String,
}

/// Define a closed set of kebab-case values
///
/// Generates serde support, `as_str` and `FromStr`, so the same spelling is used on the wire and
/// in the database.
macro_rules! closed_set {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $text:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::serde::Deserialize, ::serde::Serialize)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Wire and database spelling
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::donations::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::donations::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use closed_set;

closed_set! {
    /// Lifecycle status of a donation
    pub enum Status {
        /// Listed and open for reservation
        Available => "available",
        /// Claimed by a volunteer or charity, pending pickup
        Reserved => "reserved",
        /// Collected, terminal
        PickedUp => "picked-up",
        /// Past its expiry date, terminal
        Expired => "expired",
        /// Withdrawn by the donor, terminal
        Cancelled => "cancelled",
    }
}

closed_set! {
    /// Food category
    pub enum Category {
        Fruits => "fruits",
        Vegetables => "vegetables",
        Dairy => "dairy",
        Meat => "meat",
        Seafood => "seafood",
        Bakery => "bakery",
        Grains => "grains",
        CannedGoods => "canned-goods",
        Beverages => "beverages",
        PreparedMeals => "prepared-meals",
        Other => "other",
    }
}

closed_set! {
    /// Unit of a quantity
    pub enum Unit {
        Kg => "kg",
        Lbs => "lbs",
        Pieces => "pieces",
        Servings => "servings",
        Liters => "liters",
        Boxes => "boxes",
    }
}

closed_set! {
    /// How the food has to be kept until pickup
    pub enum StorageTemperature {
        RoomTemperature => "room-temperature",
        Refrigerated => "refrigerated",
        Frozen => "frozen",
    }
}

closed_set! {
    /// How the donor prefers to be contacted
    pub enum ContactPreference {
        Email => "email",
        Phone => "phone",
        InApp => "in-app",
    }
}

closed_set! {
    /// Kind of actor that can hold a reservation
    pub enum ClaimantKind {
        Volunteer => "volunteer",
        Charity => "charity",
    }
}

impl Default for StorageTemperature {
    fn default() -> Self {
        Self::RoomTemperature
    }
}

impl Default for ContactPreference {
    fn default() -> Self {
        Self::InApp
    }
}

/// An amount of food
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Quantity {
    /// Strictly positive amount
    pub amount: f64,

    /// Unit of the amount
    pub unit: Unit,
}

/// Dietary flags, all `false` unless stated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct DietaryFlags {
    pub vegetarian: bool,
    pub vegan: bool,
    pub gluten_free: bool,
    pub dairy_free: bool,
    pub nut_free: bool,
    pub halal: bool,
}

/// Time of day formatted as `HH:MM`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    /// Format of the time of day
    const FORMAT: &'static str = "%H:%M";
}

impl FromStr for ClockTime {
    type Err = chrono::ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(value, Self::FORMAT).map(Self)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;

        value.parse().map_err(|_| {
            serde::de::Error::custom(format!("invalid time `{value}`, expected HH:MM"))
        })
    }
}

/// Window during the pickup day in which the food can be collected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PickupWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

/// Structured address of the pickup location
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
}

/// The actor holding (or asking for) a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Claimant {
    /// Volunteer or charity
    pub kind: ClaimantKind,

    /// User ID of the volunteer or charity
    pub id: Uuid,
}

/// A claim on a donation, present only while it is reserved
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Who reserved the donation
    #[serde(flatten)]
    pub claimant: Claimant,

    /// When the reservation was made
    pub reserved_at: DateTime<Utc>,

    /// Free-form notes for the donor
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Donation {
    pub id: Uuid,
    pub donor_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub quantity: Quantity,
    pub dietary: DietaryFlags,
    pub storage_temperature: StorageTemperature,
    pub tags: Vec<String>,
    pub contact_preference: ContactPreference,
    pub expiry_date: DateTime<Utc>,
    pub pickup_date: DateTime<Utc>,
    pub pickup_time: PickupWindow,
    pub location: Point,
    pub address: Address,
    pub status: Status,
    pub reserved_by: Option<Reservation>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub picked_up_by: Option<Claimant>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Is the expiry date reached at `now`?
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }

    /// Status as observed at `now`
    ///
    /// An available donation past its expiry date counts as expired, even when the sweeper did
    /// not write it yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> Status {
        if self.status == Status::Available && self.is_past_expiry(now) {
            Status::Expired
        } else {
            self.status
        }
    }

    /// Whole days left until expiry, rounded up, negative once expired
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        days_until(self.expiry_date, now)
    }

    /// Expires within a day
    pub fn is_urgent(&self, now: DateTime<Utc>) -> bool {
        self.days_until_expiry(now) <= 1
    }

    /// Is `claimant` the holder of the current reservation?
    pub fn is_reserved_by(&self, claimant: &Claimant) -> bool {
        self.reserved_by
            .as_ref()
            .is_some_and(|reservation| &reservation.claimant == claimant)
    }

    /// Is the claimant holding the reservation, or did they collect the donation?
    pub fn is_claimed_by(&self, claimant_id: &Uuid) -> bool {
        let reserver = self
            .reserved_by
            .as_ref()
            .map(|reservation| &reservation.claimant.id);
        let collector = self.picked_up_by.as_ref().map(|claimant| &claimant.id);

        reserver == Some(claimant_id) || collector == Some(claimant_id)
    }

    /// `reserved_by` is present exactly when the donation is reserved
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        (self.status == Status::Reserved) == self.reserved_by.is_some()
    }

    /// Guard: available → reserved
    pub fn check_reservable(&self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        match self.effective_status(now) {
            Status::Available => Ok(()),
            Status::Expired => Err(LifecycleError::Expired),
            Status::Reserved | Status::PickedUp | Status::Cancelled => {
                Err(LifecycleError::NotAvailable)
            }
        }
    }

    /// Guard: reserved → available or reserved → picked-up, by the reserver only
    pub fn check_reserved_by(&self, claimant: &Claimant) -> Result<(), LifecycleError> {
        if self.status != Status::Reserved {
            return Err(LifecycleError::InvalidState(self.status));
        }

        if !self.is_reserved_by(claimant) {
            return Err(LifecycleError::Forbidden(
                "Donation is reserved by someone else",
            ));
        }

        Ok(())
    }

    /// Guard: donor edits
    pub fn check_editable_by(
        &self,
        donor_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.check_owned_by(donor_id)?;

        match self.effective_status(now) {
            status @ (Status::PickedUp | Status::Expired) => Err(LifecycleError::Locked(status)),
            Status::Available | Status::Reserved | Status::Cancelled => Ok(()),
        }
    }

    /// Guard: hard removal by the donor
    pub fn check_deletable_by(&self, donor_id: &Uuid) -> Result<(), LifecycleError> {
        self.check_owned_by(donor_id)?;

        match self.status {
            status @ (Status::Reserved | Status::PickedUp) => Err(LifecycleError::Locked(status)),
            Status::Available | Status::Cancelled | Status::Expired => Ok(()),
        }
    }

    /// Only the donor may touch their listing
    fn check_owned_by(&self, donor_id: &Uuid) -> Result<(), LifecycleError> {
        if &self.donor_id == donor_id {
            Ok(())
        } else {
            Err(LifecycleError::Forbidden("Only the donor can change this donation"))
        }
    }

    /// Transition available → reserved
    pub fn reserve(
        &mut self,
        reservation: Reservation,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.check_reservable(now)?;

        self.status = Status::Reserved;
        self.reserved_by = Some(reservation);
        self.updated_at = now;

        Ok(())
    }

    /// Transition reserved → available
    pub fn release(
        &mut self,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.check_reserved_by(claimant)?;

        self.status = Status::Available;
        self.reserved_by = None;
        self.updated_at = now;

        Ok(())
    }

    /// Transition reserved → picked-up
    ///
    /// The reservation is consumed, the collector and the pickup moment are kept instead.
    pub fn pick_up(
        &mut self,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.check_reserved_by(claimant)?;

        self.status = Status::PickedUp;
        self.reserved_by = None;
        self.picked_up_at = Some(now);
        self.picked_up_by = Some(*claimant);
        self.updated_at = now;

        Ok(())
    }
}

/// Whole days from `now` until `moment`, rounded up
pub fn days_until(moment: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (moment - now).num_seconds();
    let day = Duration::days(1).num_seconds();

    // ceiling division, also for negative values
    let days = seconds / day;
    if seconds % day > 0 { days + 1 } else { days }
}
