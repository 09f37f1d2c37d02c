//! Memory storage
//!
//! Will be destroyed on system shutdown. Conditional writes are checked and applied while
//! holding the lock, which makes them atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::donations::Claimant;
use crate::donations::Donation;
use crate::donations::DonationFilter;
use crate::donations::DonationPage;
use crate::donations::NewDonation;
use crate::donations::Reservation;
use crate::donations::Status;
use crate::users::User;

use super::CreateUserValues;
use super::Result;
use super::Storage;

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All users in storage
    users: Arc<Mutex<HashMap<Uuid, User>>>,

    /// All donations in storage
    donations: Arc<Mutex<HashMap<Uuid, Donation>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a transition on a single donation while holding the lock
    ///
    /// The donation is only written back when the transition succeeds.
    async fn transition<F>(&self, id: &Uuid, transition: F) -> Option<Donation>
    where
        F: FnOnce(&mut Donation) -> bool + Send,
    {
        let mut donations = self.donations.lock().await;
        let stored = donations.get_mut(id)?;

        let mut candidate = stored.clone();

        if transition(&mut candidate) {
            *stored = candidate.clone();
            Some(candidate)
        } else {
            None
        }
    }
}

#[async_trait]
impl Storage for Memory {
    async fn find_any_single_user(&self) -> Result<Option<User>> {
        Ok(self.users.lock().await.values().next().cloned())
    }

    async fn find_all_users(&self) -> Result<Vec<User>> {
        let mut users = self
            .users
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<User>>();

        users.sort_by(|one, two| one.created_at.cmp(&two.created_at));

        Ok(users)
    }

    async fn find_single_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(id).cloned())
    }

    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            session_id: *values.session_id,
            email: values.email.to_string(),
            name: values.name.to_string(),
            hashed_password: values.hashed_password.to_string(),
            role: values.role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        self.users.lock().await.insert(user.id, user.clone());

        Ok(user)
    }

    async fn create_donation(
        &self,
        donor_id: &Uuid,
        values: &NewDonation,
        now: DateTime<Utc>,
    ) -> Result<Donation> {
        let donation = Donation {
            id: Uuid::new_v4(),
            donor_id: *donor_id,
            title: values.title.clone(),
            description: values.description.clone(),
            category: values.category,
            quantity: values.quantity,
            dietary: values.dietary,
            storage_temperature: values.storage_temperature,
            tags: values.tags.clone(),
            contact_preference: values.contact_preference,
            expiry_date: values.expiry_date,
            pickup_date: values.pickup_date,
            pickup_time: values.pickup_time,
            location: values.location,
            address: values.address.clone(),
            status: Status::Available,
            reserved_by: None,
            picked_up_at: None,
            picked_up_by: None,
            views: 0,
            created_at: now,
            updated_at: now,
        };

        self.donations
            .lock()
            .await
            .insert(donation.id, donation.clone());

        Ok(donation)
    }

    async fn find_single_donation_by_id(&self, id: &Uuid) -> Result<Option<Donation>> {
        Ok(self.donations.lock().await.get(id).cloned())
    }

    async fn find_donations(&self, filter: &DonationFilter) -> Result<DonationPage> {
        Ok(filter.apply(self.donations.lock().await.values()))
    }

    async fn find_expiring_donations(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Donation>> {
        let mut donations = self
            .donations
            .lock()
            .await
            .values()
            .filter(|donation| {
                donation.status == Status::Available
                    && donation.expiry_date >= from
                    && donation.expiry_date <= until
            })
            .cloned()
            .collect::<Vec<Donation>>();

        donations.sort_by(|one, two| {
            one.expiry_date
                .cmp(&two.expiry_date)
                .then_with(|| one.id.cmp(&two.id))
        });

        Ok(donations)
    }

    async fn reserve_donation(
        &self,
        id: &Uuid,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>> {
        Ok(self
            .transition(id, |donation| {
                donation.reserve(reservation.clone(), now).is_ok()
            })
            .await)
    }

    async fn release_donation(
        &self,
        id: &Uuid,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>> {
        Ok(self
            .transition(id, |donation| donation.release(claimant, now).is_ok())
            .await)
    }

    async fn pick_up_donation(
        &self,
        id: &Uuid,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>> {
        Ok(self
            .transition(id, |donation| donation.pick_up(claimant, now).is_ok())
            .await)
    }

    async fn update_donation(
        &self,
        donation: &Donation,
        expected_status: Status,
    ) -> Result<Option<Donation>> {
        Ok(self
            .transition(&donation.id, |stored| {
                if stored.status != expected_status {
                    return false;
                }

                // lifecycle fields are owned by the transitions, not by edits
                let reserved_by = stored.reserved_by.take();
                let picked_up_at = stored.picked_up_at;
                let picked_up_by = stored.picked_up_by;
                let views = stored.views;

                *stored = Donation {
                    reserved_by,
                    picked_up_at,
                    picked_up_by,
                    views,
                    ..donation.clone()
                };

                true
            })
            .await)
    }

    async fn delete_donation(&self, id: &Uuid, donor_id: &Uuid) -> Result<bool> {
        let mut donations = self.donations.lock().await;

        let deletable = donations
            .get(id)
            .is_some_and(|donation| donation.check_deletable_by(donor_id).is_ok());

        if deletable {
            donations.remove(id);
        }

        Ok(deletable)
    }

    async fn increment_views(&self, id: &Uuid) -> Result<Option<Donation>> {
        Ok(self
            .transition(id, |donation| {
                donation.views += 1;
                true
            })
            .await)
    }

    async fn expire_overdue_donations(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;

        for donation in self.donations.lock().await.values_mut() {
            if donation.status == Status::Available && donation.is_past_expiry(now) {
                donation.status = Status::Expired;
                donation.updated_at = now;
                count += 1;
            }
        }

        Ok(count)
    }
}
