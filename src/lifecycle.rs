//! Donation lifecycle manager
//!
//! Owns the status transitions of a donation:
//!
//! ```text
//! available ──reserve──▶ reserved ──pick up──▶ picked-up
//!     │   ▲                  │
//!     │   └────release───────┘
//!     ├──(expiry date passes)──▶ expired
//!     └──withdraw by donor──▶ cancelled
//! ```
//!
//! Every transition is handed to the storage as a conditional write. When the write is refused
//! the donation is read again to tell the caller why.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::donations::Claimant;
use crate::donations::Donation;
use crate::donations::DonationFilter;
use crate::donations::DonationPage;
use crate::donations::DonationPatch;
use crate::donations::NewDonation;
use crate::donations::Reservation;
use crate::donations::Status;
use crate::donations::ValidationError;
use crate::storage;
use crate::storage::Database;

/// Everything that can go wrong while changing a donation
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Input does not match the rules of a donation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No donation with this ID
    #[error("Donation not found")]
    NotFound,

    /// The actor is not allowed to touch the donation
    #[error("{0}")]
    Forbidden(&'static str),

    /// The donation can not be reserved in its current status
    #[error("Donation is not available")]
    NotAvailable,

    /// The donation is past its expiry date
    #[error("Donation has expired")]
    Expired,

    /// The transition does not start from the current status
    #[error("Donation is {0}")]
    InvalidState(Status),

    /// The donation can no longer be changed or removed
    #[error("Donation is {0} and can not be changed")]
    Locked(Status),

    /// The donation changed between reading and writing it
    #[error("Donation was changed by someone else, try again")]
    Conflict,

    /// The storage failed
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

/// Result type of the lifecycle operations
pub type Result<T> = core::result::Result<T, LifecycleError>;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The donation lifecycle manager
#[derive(Clone)]
pub struct Lifecycle {
    /// Where the donations live
    database: Database,

    /// Current time, replaceable in tests
    clock: Clock,
}

impl Lifecycle {
    /// Create a lifecycle manager running on the wall clock
    pub fn new(database: Database) -> Self {
        Self::with_clock(database, Arc::new(Utc::now))
    }

    /// Create a lifecycle manager with a custom clock
    pub fn with_clock(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    /// The current time according to the clock
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// A fresh listing filter as of now
    pub fn filter(&self) -> DonationFilter {
        DonationFilter::new(self.now())
    }

    /// List a new, available donation for a donor
    ///
    /// # Errors
    ///
    /// Will return `Err` when the donation is not valid or storage fails
    pub async fn create(&self, donor_id: &Uuid, values: NewDonation) -> Result<Donation> {
        let now = self.now();
        let values = values.validate(now)?;

        let donation = self
            .database
            .create_donation(donor_id, &values, now)
            .await?;

        tracing::debug!("Donation {} created by donor {donor_id}", donation.id);

        Ok(donation)
    }

    /// Fetch a single donation, without side effects
    ///
    /// # Errors
    ///
    /// Will return `Err` when the donation does not exist or storage fails
    pub async fn find(&self, donation_id: &Uuid) -> Result<Donation> {
        self.database
            .find_single_donation_by_id(donation_id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    /// Fetch a single donation and count the view
    ///
    /// # Errors
    ///
    /// Will return `Err` when the donation does not exist or storage fails
    pub async fn view(&self, donation_id: &Uuid) -> Result<Donation> {
        self.database
            .increment_views(donation_id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    /// Reserve an available donation
    ///
    /// # Errors
    ///
    /// Will return `Err` when the donation is not available, has expired or does not exist
    pub async fn reserve(
        &self,
        donation_id: &Uuid,
        claimant: Claimant,
        notes: Option<String>,
    ) -> Result<Donation> {
        let now = self.now();

        let reservation = Reservation {
            claimant,
            reserved_at: now,
            notes: notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
        };

        let reserved = self
            .database
            .reserve_donation(donation_id, &reservation, now)
            .await?;

        if let Some(donation) = reserved {
            tracing::info!(
                "Donation {donation_id} reserved by {} {}",
                claimant.kind,
                claimant.id
            );

            return Ok(donation);
        }

        // the write was refused, explain why
        let donation = self.find(donation_id).await?;
        donation.check_reservable(now)?;

        // became available again after the refused write
        Err(LifecycleError::Conflict)
    }

    /// Release a reservation, making the donation available again
    ///
    /// # Errors
    ///
    /// Will return `Err` when the donation is not reserved by `claimant` or does not exist
    pub async fn cancel_reservation(
        &self,
        donation_id: &Uuid,
        claimant: Claimant,
    ) -> Result<Donation> {
        let now = self.now();

        let released = self
            .database
            .release_donation(donation_id, &claimant, now)
            .await?;

        if let Some(donation) = released {
            tracing::info!(
                "Reservation on donation {donation_id} cancelled by {} {}",
                claimant.kind,
                claimant.id
            );

            return Ok(donation);
        }

        let donation = self.find(donation_id).await?;
        donation.check_reserved_by(&claimant)?;

        Err(LifecycleError::Conflict)
    }

    /// Mark a reserved donation as picked up
    ///
    /// # Errors
    ///
    /// Will return `Err` when the donation is not reserved by `claimant` or does not exist
    pub async fn mark_picked_up(&self, donation_id: &Uuid, claimant: Claimant) -> Result<Donation> {
        let now = self.now();

        let picked_up = self
            .database
            .pick_up_donation(donation_id, &claimant, now)
            .await?;

        if let Some(donation) = picked_up {
            tracing::info!(
                "Donation {donation_id} picked up by {} {}",
                claimant.kind,
                claimant.id
            );

            return Ok(donation);
        }

        let donation = self.find(donation_id).await?;
        donation.check_reserved_by(&claimant)?;

        Err(LifecycleError::Conflict)
    }

    /// Edit a donation as its donor
    ///
    /// The only status change accepted is withdrawing an available donation (`cancelled`).
    ///
    /// # Errors
    ///
    /// Will return `Err` when the actor is not the donor, the donation is locked, the edit is
    /// invalid or the donation changed in the meantime
    pub async fn update(
        &self,
        donation_id: &Uuid,
        donor_id: &Uuid,
        patch: &DonationPatch,
    ) -> Result<Donation> {
        let now = self.now();

        let donation = self.find(donation_id).await?;
        donation.check_editable_by(donor_id, now)?;

        let mut updated = patch.apply_to(&donation, now)?;

        if let Some(status) = patch.status {
            updated.status = next_status_on_edit(donation.status, status)?;
        }

        let updated = self
            .database
            .update_donation(&updated, donation.status)
            .await?
            .ok_or(LifecycleError::Conflict)?;

        tracing::debug!("Donation {donation_id} updated by donor {donor_id}");

        Ok(updated)
    }

    /// Remove a donation as its donor
    ///
    /// # Errors
    ///
    /// Will return `Err` when the actor is not the donor, the donation is reserved or picked up,
    /// or does not exist
    pub async fn delete(&self, donation_id: &Uuid, donor_id: &Uuid) -> Result<()> {
        let donation = self.find(donation_id).await?;
        donation.check_deletable_by(donor_id)?;

        if self.database.delete_donation(donation_id, donor_id).await? {
            tracing::info!("Donation {donation_id} deleted by donor {donor_id}");

            Ok(())
        } else {
            // reserved between the check and the delete
            let donation = self.find(donation_id).await?;
            donation.check_deletable_by(donor_id)?;

            Err(LifecycleError::Conflict)
        }
    }

    /// List donations matching a filter
    ///
    /// # Errors
    ///
    /// Will return `Err` when storage fails
    pub async fn list(&self, filter: &DonationFilter) -> Result<DonationPage> {
        Ok(self.database.find_donations(filter).await?)
    }

    /// Available donations expiring within `days` days from now
    ///
    /// # Errors
    ///
    /// Will return `Err` when storage fails
    pub async fn find_expiring_soon(&self, days: u32) -> Result<Vec<Donation>> {
        let now = self.now();
        let until = now + Duration::days(i64::from(days));

        Ok(self.database.find_expiring_donations(now, until).await?)
    }

    /// Write `expired` on every available donation past its expiry date
    ///
    /// # Errors
    ///
    /// Will return `Err` when storage fails
    pub async fn expire_overdue(&self) -> Result<u64> {
        Ok(self.database.expire_overdue_donations(self.now()).await?)
    }
}

/// Status after a donor asked for `requested`
fn next_status_on_edit(current: Status, requested: Status) -> Result<Status> {
    match (current, requested) {
        (current, requested) if current == requested => Ok(current),
        (Status::Available, Status::Cancelled) => Ok(Status::Cancelled),
        (Status::Available, _) => Err(LifecycleError::Validation(ValidationError::new(
            "Only `cancelled` can be set, to withdraw the donation",
        ))),
        (current, _) => Err(LifecycleError::InvalidState(current)),
    }
}
