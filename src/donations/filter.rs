//! Listing filter
//!
//! One immutable description of a listing query, assembled once and shared by every storage
//! backend. The expiry rule lives here so no query path can forget it.

use std::cmp::Ordering;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::Category;
use super::Donation;
use super::Point;
use super::Status;

/// Default page size
pub const DEFAULT_LIMIT: u32 = 10;

/// Maximum page size
pub const MAX_LIMIT: u32 = 100;

/// Which statuses to list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    /// Only donations with this (effective) status
    Only(Status),

    /// Every status, expired included
    Any,
}

/// Restrict to a circle around a point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proximity {
    pub center: Point,
    pub radius_miles: f64,
}

/// Listing order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sort {
    /// Most recently created first
    #[default]
    Newest,

    /// Least recently created first
    Oldest,

    /// Soonest expiry first
    Expiring,

    /// Closest first, only meaningful with a proximity filter
    Nearest,
}

/// A donation in a listing, with its distance to the proximity center
#[derive(Clone, Debug)]
pub struct ListedDonation {
    pub donation: Donation,
    pub distance_miles: Option<f64>,
}

/// One page of a listing
#[derive(Clone, Debug)]
pub struct DonationPage {
    pub donations: Vec<ListedDonation>,

    /// Number of matches over all pages
    pub total: u64,
}

#[derive(Clone, Debug)]
pub struct DonationFilter {
    now: DateTime<Utc>,
    status: StatusFilter,
    category: Option<Category>,
    proximity: Option<Proximity>,
    urgent_only: bool,
    donor_id: Option<Uuid>,
    claimed_by: Option<Uuid>,
    sort: Option<Sort>,
    page: u32,
    limit: u32,
}

impl DonationFilter {
    /// Available donations as of `now`, first page, default order
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            status: StatusFilter::Only(Status::Available),
            category: None,
            proximity: None,
            urgent_only: false,
            donor_id: None,
            claimed_by: None,
            sort: None,
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }

    #[must_use]
    pub fn status(self, status: StatusFilter) -> Self {
        Self { status, ..self }
    }

    #[must_use]
    pub fn category(self, category: Option<Category>) -> Self {
        Self { category, ..self }
    }

    #[must_use]
    pub fn near(self, proximity: Option<Proximity>) -> Self {
        Self { proximity, ..self }
    }

    #[must_use]
    pub fn urgent_only(self, urgent_only: bool) -> Self {
        Self {
            urgent_only,
            ..self
        }
    }

    /// Only donations of this donor
    #[must_use]
    pub fn donor(self, donor_id: Uuid) -> Self {
        Self {
            donor_id: Some(donor_id),
            ..self
        }
    }

    /// Only donations reserved or collected by this volunteer or charity
    #[must_use]
    pub fn claimed_by(self, claimant_id: Uuid) -> Self {
        Self {
            claimed_by: Some(claimant_id),
            ..self
        }
    }

    #[must_use]
    pub fn sort(self, sort: Option<Sort>) -> Self {
        Self { sort, ..self }
    }

    /// Page (1-based) and page size, both clamped to sane values
    #[must_use]
    pub fn paginate(self, page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
            ..self
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status
    }

    pub fn category_filter(&self) -> Option<Category> {
        self.category
    }

    pub fn proximity(&self) -> Option<&Proximity> {
        self.proximity.as_ref()
    }

    pub fn is_urgent_only(&self) -> bool {
        self.urgent_only
    }

    pub fn donor_id(&self) -> Option<&Uuid> {
        self.donor_id.as_ref()
    }

    pub fn claimed_by_id(&self) -> Option<&Uuid> {
        self.claimed_by.as_ref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of matches to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Expiry dates up to this moment count as urgent
    pub fn urgent_until(&self) -> DateTime<Utc> {
        self.now + Duration::days(1)
    }

    /// The order in effect
    ///
    /// Nearest without a proximity filter falls back to newest, proximity without an explicit
    /// order sorts nearest first.
    pub fn effective_sort(&self) -> Sort {
        match (self.sort, self.proximity.is_some()) {
            (Some(Sort::Nearest), false) => Sort::Newest,
            (Some(sort), _) => sort,
            (None, true) => Sort::Nearest,
            (None, false) => Sort::Newest,
        }
    }

    /// Distance of a donation to the proximity center
    pub fn distance(&self, donation: &Donation) -> Option<f64> {
        self.proximity
            .map(|proximity| proximity.center.distance_miles(&donation.location))
    }

    /// Match a single donation against the filter, with its distance when it matches
    pub fn matches(&self, donation: &Donation) -> Option<ListedDonation> {
        let status_matches = match self.status {
            StatusFilter::Any => true,
            StatusFilter::Only(Status::Expired) => {
                donation.effective_status(self.now) == Status::Expired
            }
            StatusFilter::Only(status) => {
                donation.status == status && !donation.is_past_expiry(self.now)
            }
        };

        if !status_matches {
            return None;
        }

        if self.category.is_some_and(|category| donation.category != category) {
            return None;
        }

        if self.urgent_only && donation.expiry_date > self.urgent_until() {
            return None;
        }

        if self.donor_id.is_some_and(|donor_id| donation.donor_id != donor_id) {
            return None;
        }

        if self
            .claimed_by
            .is_some_and(|claimant_id| !donation.is_claimed_by(&claimant_id))
        {
            return None;
        }

        let distance_miles = self.distance(donation);

        if let (Some(proximity), Some(distance)) = (self.proximity, distance_miles) {
            if distance > proximity.radius_miles {
                return None;
            }
        }

        Some(ListedDonation {
            donation: donation.clone(),
            distance_miles,
        })
    }

    /// Filter, order and paginate donations held in memory
    pub fn apply<'a, I>(&self, donations: I) -> DonationPage
    where
        I: IntoIterator<Item = &'a Donation>,
    {
        let mut matches = donations
            .into_iter()
            .filter_map(|donation| self.matches(donation))
            .collect::<Vec<ListedDonation>>();

        let sort = self.effective_sort();
        matches.sort_by(|one, two| compare(sort, one, two));

        let total = matches.len() as u64;
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);

        let donations = matches
            .into_iter()
            .skip(offset)
            .take(self.limit as usize)
            .collect();

        DonationPage { donations, total }
    }
}

/// Order two listed donations, ties are broken by ID to keep pages stable
fn compare(sort: Sort, one: &ListedDonation, two: &ListedDonation) -> Ordering {
    let ordering = match sort {
        Sort::Newest => two.donation.created_at.cmp(&one.donation.created_at),
        Sort::Oldest => one.donation.created_at.cmp(&two.donation.created_at),
        Sort::Expiring => one.donation.expiry_date.cmp(&two.donation.expiry_date),
        Sort::Nearest => one
            .distance_miles
            .unwrap_or(f64::MAX)
            .total_cmp(&two.distance_miles.unwrap_or(f64::MAX)),
    };

    ordering.then_with(|| one.donation.id.cmp(&two.donation.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donations::Claimant;
    use crate::donations::ClaimantKind;
    use crate::donations::Reservation;
    use crate::donations::tests::sample_donation;

    fn at(longitude: f64, latitude: f64, now: DateTime<Utc>) -> Donation {
        let mut donation = sample_donation(now);
        donation.location = Point::new(longitude, latitude).unwrap();
        donation
    }

    #[test]
    fn test_default_excludes_expired() {
        let now = Utc::now();
        let fresh = sample_donation(now);
        let mut overdue = sample_donation(now);
        overdue.expiry_date = now - Duration::hours(1);
        let mut swept = sample_donation(now);
        swept.status = Status::Expired;
        swept.expiry_date = now - Duration::days(1);

        let page = DonationFilter::new(now).apply([&fresh, &overdue, &swept]);
        assert_eq!(page.total, 1);
        assert_eq!(page.donations[0].donation.id, fresh.id);

        let page = DonationFilter::new(now)
            .status(StatusFilter::Only(Status::Expired))
            .apply([&fresh, &overdue, &swept]);
        assert_eq!(page.total, 2);

        let page = DonationFilter::new(now)
            .status(StatusFilter::Any)
            .apply([&fresh, &overdue, &swept]);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_nearby_stays_within_radius() {
        let now = Utc::now();
        let center = Point::new(-73.9857, 40.7484).unwrap();
        let close = at(-73.9855, 40.7580, now);
        let brooklyn = at(-73.9442, 40.6782, now);
        let philadelphia = at(-75.1652, 39.9526, now);

        let filter = DonationFilter::new(now).near(Some(Proximity {
            center,
            radius_miles: 10.0,
        }));
        let page = filter.apply([&philadelphia, &brooklyn, &close]);

        assert_eq!(page.total, 2);
        assert_eq!(page.donations[0].donation.id, close.id);
        assert_eq!(page.donations[1].donation.id, brooklyn.id);
        assert!(
            page.donations
                .iter()
                .all(|listed| listed.distance_miles.unwrap() <= 10.0)
        );
        assert_eq!(filter.effective_sort(), Sort::Nearest);
    }

    #[test]
    fn test_urgent_only() {
        let now = Utc::now();
        let relaxed = sample_donation(now);
        let mut urgent = sample_donation(now);
        urgent.expiry_date = now + Duration::hours(12);

        let page = DonationFilter::new(now)
            .urgent_only(true)
            .apply([&relaxed, &urgent]);
        assert_eq!(page.total, 1);
        assert_eq!(page.donations[0].donation.id, urgent.id);
    }

    #[test]
    fn test_pagination() {
        let now = Utc::now();
        let donations = (0..25)
            .map(|minutes| {
                let mut donation = sample_donation(now);
                donation.created_at = now - Duration::minutes(minutes);
                donation
            })
            .collect::<Vec<Donation>>();

        let page = DonationFilter::new(now).paginate(3, 10).apply(&donations);
        assert_eq!(page.total, 25);
        assert_eq!(page.donations.len(), 5);
        assert_eq!(page.donations[0].donation.id, donations[20].id);

        let filter = DonationFilter::new(now).paginate(0, 1000);
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), MAX_LIMIT);
    }

    #[test]
    fn test_claimed_by_covers_reservations_and_pickups() {
        let now = Utc::now();
        let claimant = Claimant {
            kind: ClaimantKind::Charity,
            id: Uuid::new_v4(),
        };

        let open = sample_donation(now);
        let mut reserved = sample_donation(now);
        reserved.status = Status::Reserved;
        reserved.reserved_by = Some(Reservation {
            claimant,
            reserved_at: now,
            notes: None,
        });
        let mut collected = sample_donation(now);
        collected.status = Status::PickedUp;
        collected.picked_up_at = Some(now);
        collected.picked_up_by = Some(claimant);

        let page = DonationFilter::new(now)
            .status(StatusFilter::Any)
            .claimed_by(claimant.id)
            .apply([&open, &reserved, &collected]);
        assert_eq!(page.total, 2);
        assert!(page.donations.iter().all(|listed| listed.donation.id != open.id));
    }

    #[test]
    fn test_nearest_without_proximity() {
        let filter = DonationFilter::new(Utc::now()).sort(Some(Sort::Nearest));
        assert_eq!(filter.effective_sort(), Sort::Newest);
    }
}
