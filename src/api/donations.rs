//! Donation API

use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::donations::Address;
use crate::donations::Category;
use crate::donations::Claimant;
use crate::donations::ContactPreference;
use crate::donations::DEFAULT_LIMIT;
use crate::donations::DietaryFlags;
use crate::donations::Donation;
use crate::donations::DonationFilter;
use crate::donations::DonationPage;
use crate::donations::DonationPatch;
use crate::donations::ListedDonation;
use crate::donations::NewDonation;
use crate::donations::PickupWindow;
use crate::donations::Point;
use crate::donations::Proximity;
use crate::donations::Quantity;
use crate::donations::Reservation;
use crate::donations::Sort;
use crate::donations::Status;
use crate::donations::StatusFilter;
use crate::donations::StorageTemperature;
use crate::lifecycle::Lifecycle;
use crate::users::Role;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::PathParameters;
use super::QueryParameters;
use super::Success;
use super::parse_donation_id;

/// Radius of a proximity search when none is given, in miles
const DEFAULT_RADIUS_MILES: f64 = 10.0;

/// Longest look-ahead of the expiring soon report, in days
const MAX_EXPIRING_SOON_DAYS: u32 = 365;

/// The donation as served to the outside world
///
/// Urgency and the effective status are computed for the moment of the response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationResponse {
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picked_up_by: Option<Claimant>,
    pub views: i64,
    pub is_urgent: bool,
    pub days_until_expiry: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DonationResponse {
    fn new(donation: Donation, now: DateTime<Utc>) -> Self {
        Self {
            status: donation.effective_status(now),
            is_urgent: donation.is_urgent(now),
            days_until_expiry: donation.days_until_expiry(now),
            distance_miles: None,
            id: donation.id,
            donor_id: donation.donor_id,
            title: donation.title,
            description: donation.description,
            category: donation.category,
            quantity: donation.quantity,
            dietary: donation.dietary,
            storage_temperature: donation.storage_temperature,
            tags: donation.tags,
            contact_preference: donation.contact_preference,
            expiry_date: donation.expiry_date,
            pickup_date: donation.pickup_date,
            pickup_time: donation.pickup_time,
            location: donation.location,
            address: donation.address,
            reserved_by: donation.reserved_by,
            picked_up_at: donation.picked_up_at,
            picked_up_by: donation.picked_up_by,
            views: donation.views,
            created_at: donation.created_at,
            updated_at: donation.updated_at,
        }
    }

    fn from_listed(listed: ListedDonation, now: DateTime<Utc>) -> Self {
        Self {
            // two decimals is plenty for a distance in miles
            distance_miles: listed
                .distance_miles
                .map(|distance| (distance * 100.0).round() / 100.0),
            ..Self::new(listed.donation, now)
        }
    }
}

/// Page information of a listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

/// A page of donations
#[derive(Debug, Serialize)]
pub struct DonationListResponse {
    pub donations: Vec<DonationResponse>,
    pub pagination: Pagination,
}

impl DonationListResponse {
    fn new(page: DonationPage, filter: &DonationFilter) -> Self {
        let limit = u64::from(filter.limit());

        Self {
            donations: page
                .donations
                .into_iter()
                .map(|listed| DonationResponse::from_listed(listed, filter.now()))
                .collect(),
            pagination: Pagination {
                page: filter.page(),
                limit: filter.limit(),
                total: page.total,
                pages: page.total.div_ceil(limit),
            },
        }
    }
}

/// Create a donation, donors only
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "title": "Sourdough", "description": "Twenty loaves", "category": "bakery",
///           "quantity": { "amount": 20, "unit": "pieces" },
///           "expiryDate": "2025-01-10T18:00:00Z", "pickupDate": "2025-01-09T09:00:00Z",
///           "pickupTime": { "start": "09:00", "end": "12:00" },
///           "location": { "longitude": -73.9857, "latitude": 40.7484 },
///           "address": { "street": "350 5th Ave", "city": "New York" } }' \
///     http://localhost:6000/api/donations
/// ```
///
/// Response:
/// ```json
/// { "success": true, "data": { "id": "<uuid>", "status": "available", "isUrgent": false ... } }
/// ```
pub async fn create(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    Form(form): Form<NewDonation>,
) -> Result<Success<DonationResponse>, Error> {
    current_user.role.is_allowed(&[Role::Donor])?;

    let donation = lifecycle.create(&current_user.id, form).await?;

    Ok(Success::created(DonationResponse::new(donation, lifecycle.now()))
        .with_message("Donation created"))
}

/// Query parameters of the public listing
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    category: Option<Category>,
    status: Option<Status>,
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
    urgent: Option<bool>,
    page: Option<u32>,
    limit: Option<u32>,
    sort: Option<Sort>,
}

impl ListQuery {
    /// Proximity from `lat`, `lng` and `radius`, when a location is given
    fn proximity(&self) -> Result<Option<Proximity>, Error> {
        let (lng, lat) = match (self.lng, self.lat) {
            (Some(lng), Some(lat)) => (lng, lat),
            (None, None) => {
                return if self.radius.is_some() {
                    Err(Error::bad_request("`radius` needs `lat` and `lng`"))
                } else {
                    Ok(None)
                };
            }
            _ => return Err(Error::bad_request("Both `lat` and `lng` are required")),
        };

        let center = Point::new(lng, lat).ok_or_else(|| {
            Error::bad_request("Invalid location")
                .with_description("Longitude must be within [-180, 180], latitude within [-90, 90]")
        })?;

        let radius_miles = self.radius.unwrap_or(DEFAULT_RADIUS_MILES);
        if !radius_miles.is_finite() || radius_miles <= 0.0 {
            return Err(Error::bad_request("`radius` must be a positive number of miles"));
        }

        Ok(Some(Proximity {
            center,
            radius_miles,
        }))
    }

    fn into_filter(self, filter: DonationFilter) -> Result<DonationFilter, Error> {
        let proximity = self.proximity()?;

        Ok(filter
            .status(StatusFilter::Only(self.status.unwrap_or(Status::Available)))
            .category(self.category)
            .near(proximity)
            .urgent_only(self.urgent.unwrap_or(false))
            .sort(self.sort)
            .paginate(
                self.page.unwrap_or(1),
                self.limit.unwrap_or(DEFAULT_LIMIT),
            ))
    }
}

/// List donations, public
///
/// Without a `status` only available donations are listed. Passing `lat` and `lng` limits the
/// listing to `radius` miles (default 10) around that point, nearest first.
///
/// Request:
/// ```sh
/// curl -v 'http://localhost:6000/api/donations?category=bakery&lat=40.75&lng=-73.99&radius=5'
/// ```
///
/// Response:
/// ```json
/// { "success": true, "data": { "donations": [ { "id": "<uuid>", "distanceMiles": 0.42 ... } ],
///   "pagination": { "page": 1, "limit": 10, "total": 1, "pages": 1 } } }
/// ```
pub async fn list(
    Extension(lifecycle): Extension<Lifecycle>,
    QueryParameters(query): QueryParameters<ListQuery>,
) -> Result<Success<DonationListResponse>, Error> {
    let filter = query.into_filter(lifecycle.filter())?;

    let page = lifecycle.list(&filter).await?;

    Ok(Success::ok(DonationListResponse::new(page, &filter)))
}

/// Paging of personal listings
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

/// Donations of the current user, in any status
///
/// Donors get the donations they offered, volunteers and charities the donations they reserved,
/// including the ones they already picked up.
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/donations/mine
/// ```
pub async fn mine(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    QueryParameters(query): QueryParameters<PageQuery>,
) -> Result<Success<DonationListResponse>, Error> {
    let filter = lifecycle.filter().status(StatusFilter::Any);

    let filter = match current_user.role {
        Role::Donor => filter.donor(current_user.id),
        Role::Volunteer | Role::Charity => filter.claimed_by(current_user.id),
        Role::Admin => return Err(Error::forbidden("Admins do not own donations")),
    };

    let filter = filter.paginate(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_LIMIT),
    );

    let page = lifecycle.list(&filter).await?;

    Ok(Success::ok(DonationListResponse::new(page, &filter)))
}

/// Available donations expiring within the given number of days, soonest first
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/donations/expiring-soon/2
/// ```
pub async fn expiring_soon(
    Extension(lifecycle): Extension<Lifecycle>,
    _current_user: CurrentUser,
    PathParameters(days): PathParameters<u32>,
) -> Result<Success<Vec<DonationResponse>>, Error> {
    if days > MAX_EXPIRING_SOON_DAYS {
        return Err(Error::bad_request(format!(
            "Days must be at most {MAX_EXPIRING_SOON_DAYS}"
        )));
    }

    let now = lifecycle.now();
    let donations = lifecycle.find_expiring_soon(days).await?;

    Ok(Success::ok(
        donations
            .into_iter()
            .map(|donation| DonationResponse::new(donation, now))
            .collect(),
    ))
}

/// Get a single donation, public
///
/// Every request counts as a view.
///
/// Request:
/// ```sh
/// curl -v http://localhost:6000/api/donations/<uuid>
/// ```
pub async fn single(
    Extension(lifecycle): Extension<Lifecycle>,
    PathParameters(id): PathParameters<String>,
) -> Result<Success<DonationResponse>, Error> {
    let id = parse_donation_id(&id)?;

    let donation = lifecycle.view(&id).await?;

    Ok(Success::ok(DonationResponse::new(donation, lifecycle.now())))
}

/// Edit a donation, its donor only
///
/// Only the given fields change. Setting `status` to `cancelled` withdraws an available
/// donation.
///
/// Request:
/// ```sh
/// curl -v -XPUT -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "title": "Sourdough and rye" }' \
///     http://localhost:6000/api/donations/<uuid>
/// ```
pub async fn update(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    PathParameters(id): PathParameters<String>,
    Form(form): Form<DonationPatch>,
) -> Result<Success<DonationResponse>, Error> {
    current_user.role.is_allowed(&[Role::Donor])?;
    let id = parse_donation_id(&id)?;

    let donation = lifecycle.update(&id, &current_user.id, &form).await?;

    Ok(Success::ok(DonationResponse::new(donation, lifecycle.now()))
        .with_message("Donation updated"))
}

/// Remove a donation, its donor only
///
/// Reserved and picked up donations can not be removed.
///
/// Request:
/// ```sh
/// curl -v -XDELETE -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/donations/<uuid>
/// ```
pub async fn delete(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    PathParameters(id): PathParameters<String>,
) -> Result<Success<()>, Error> {
    current_user.role.is_allowed(&[Role::Donor])?;
    let id = parse_donation_id(&id)?;

    lifecycle.delete(&id, &current_user.id).await?;

    Ok(Success::message("Donation deleted"))
}

/// Reservation form
#[derive(Debug, Deserialize)]
pub struct ReserveForm {
    /// Notes for the donor, like an expected arrival time
    notes: Option<String>,
}

/// Reserve an available donation, volunteers and charities only
///
/// The body is optional, it only carries notes for the donor.
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "notes": "Around five" }' \
///     http://localhost:6000/api/donations/<uuid>/reserve
/// ```
pub async fn reserve(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    PathParameters(id): PathParameters<String>,
    form: Option<Form<ReserveForm>>,
) -> Result<Success<DonationResponse>, Error> {
    let claimant = current_user.claimant()?;
    let id = parse_donation_id(&id)?;
    let notes = form.and_then(|Form(form)| form.notes);

    let donation = lifecycle.reserve(&id, claimant, notes).await?;

    Ok(Success::ok(DonationResponse::new(donation, lifecycle.now()))
        .with_message("Donation reserved"))
}

/// Give up a reservation, the reserver only
///
/// Request:
/// ```sh
/// curl -v -XPOST -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/donations/<uuid>/cancel-reservation
/// ```
pub async fn cancel_reservation(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    PathParameters(id): PathParameters<String>,
) -> Result<Success<DonationResponse>, Error> {
    let claimant = current_user.claimant()?;
    let id = parse_donation_id(&id)?;

    let donation = lifecycle.cancel_reservation(&id, claimant).await?;

    Ok(Success::ok(DonationResponse::new(donation, lifecycle.now()))
        .with_message("Reservation cancelled"))
}

/// Confirm the pickup of a reserved donation, the reserver only
///
/// Request:
/// ```sh
/// curl -v -XPOST -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/donations/<uuid>/pickup
/// ```
pub async fn pickup(
    Extension(lifecycle): Extension<Lifecycle>,
    current_user: CurrentUser,
    PathParameters(id): PathParameters<String>,
) -> Result<Success<DonationResponse>, Error> {
    let claimant = current_user.claimant()?;
    let id = parse_donation_id(&id)?;

    let donation = lifecycle.mark_picked_up(&id, claimant).await?;

    Ok(Success::ok(DonationResponse::new(donation, lifecycle.now()))
        .with_message("Donation picked up"))
}
