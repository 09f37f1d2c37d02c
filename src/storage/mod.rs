//! All things related to the storage of users and donations
//!
//! Every lifecycle write is a single conditional statement: the storage only applies it when
//! the donation is still in the expected state and reports `None` otherwise. Two actors racing
//! for the same donation can therefore never both win.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::donations::Claimant;
use crate::donations::Donation;
use crate::donations::DonationFilter;
use crate::donations::DonationPage;
use crate::donations::NewDonation;
use crate::donations::Reservation;
use crate::donations::Status;
use crate::users::Role;
use crate::users::User;

pub use memory::Memory;
pub use postgres::Postgres;

mod memory;
mod postgres;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored data does not match the domain model
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Shared handle to the configured storage
pub type Database = Arc<dyn Storage>;

/// Database configuration
pub enum Config {
    /// Detect configuration from environment
    ///
    /// Uses Postgres when `DATABASE_URL` is set, memory otherwise
    DetectConfig,

    /// Keep everything in memory
    InMemory,
}

/// Setup the storage based on the configuration
///
/// # Errors
///
/// Will return `Err` when Postgres can not be reached or migrated
pub async fn setup(config: Config) -> Result<Database> {
    match config {
        Config::DetectConfig => match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(Arc::new(Postgres::new(&url).await?)),
            _ => {
                tracing::warn!("`DATABASE_URL` not set, donations are kept in memory");
                Ok(Arc::new(Memory::new()))
            }
        },
        Config::InMemory => Ok(Arc::new(Memory::new())),
    }
}

/// Values to create a User
pub struct CreateUserValues<'a> {
    /// The initial session ID for the user
    pub session_id: &'a Uuid,

    /// The role of the user
    pub role: Role,

    /// The email address, used to log in
    pub email: &'a str,

    /// Display name
    pub name: &'a str,

    /// The hashed password
    pub hashed_password: &'a str,
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Find any single user
    async fn find_any_single_user(&self) -> Result<Option<User>>;

    /// Finds all users
    async fn find_all_users(&self) -> Result<Vec<User>>;

    /// Finds a single user by its email address
    async fn find_single_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Finds a single user by its ID
    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>>;

    /// Create a single user
    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User>;

    /// Create an available donation for a donor
    async fn create_donation(
        &self,
        donor_id: &Uuid,
        values: &NewDonation,
        now: DateTime<Utc>,
    ) -> Result<Donation>;

    /// Find a single donation by ID
    async fn find_single_donation_by_id(&self, id: &Uuid) -> Result<Option<Donation>>;

    /// Find one page of donations matching the filter
    async fn find_donations(&self, filter: &DonationFilter) -> Result<DonationPage>;

    /// Find available donations expiring within `[from, until]`, soonest first
    async fn find_expiring_donations(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Donation>>;

    /// Reserve a donation, only when it is available and not past its expiry at `now`
    async fn reserve_donation(
        &self,
        id: &Uuid,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>>;

    /// Make a reserved donation available again, only when held by `claimant`
    async fn release_donation(
        &self,
        id: &Uuid,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>>;

    /// Mark a reserved donation as picked up, only when held by `claimant`
    async fn pick_up_donation(
        &self,
        id: &Uuid,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>>;

    /// Write the editable fields and status of a donation
    ///
    /// Only applied when the stored status still equals `expected_status`
    async fn update_donation(
        &self,
        donation: &Donation,
        expected_status: Status,
    ) -> Result<Option<Donation>>;

    /// Remove a donation of a donor, only when it is available, cancelled or expired
    async fn delete_donation(&self, id: &Uuid, donor_id: &Uuid) -> Result<bool>;

    /// Add one to the view counter
    async fn increment_views(&self, id: &Uuid) -> Result<Option<Donation>>;

    /// Write `expired` for available donations past their expiry at `now`
    ///
    /// Returns the number of donations touched
    async fn expire_overdue_donations(&self, now: DateTime<Utc>) -> Result<u64>;
}
