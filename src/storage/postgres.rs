//! Postgres storage
//!
//! Lifecycle transitions are single `UPDATE … WHERE status = … RETURNING *` statements, so the
//! database decides which of two concurrent writers wins.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::PgPool;
use sqlx::QueryBuilder;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::donations::Address;
use crate::donations::Claimant;
use crate::donations::DietaryFlags;
use crate::donations::Donation;
use crate::donations::DonationFilter;
use crate::donations::DonationPage;
use crate::donations::EARTH_RADIUS_MILES;
use crate::donations::ListedDonation;
use crate::donations::NewDonation;
use crate::donations::PickupWindow;
use crate::donations::Point;
use crate::donations::Quantity;
use crate::donations::Reservation;
use crate::donations::Sort;
use crate::donations::Status;
use crate::donations::StatusFilter;
use crate::users::User;

use super::CreateUserValues;
use super::Error;
use super::Result;
use super::Storage;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,
}

impl Postgres {
    /// Create Postgres storage
    ///
    /// Migrations will be run
    pub async fn new(database_connection_string: &str) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_connection_string)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    pub async fn new_with_pool(connection_pool: PgPool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(|err| Error::Connection(format!("Migrations could not run: {err}")))?;

        Ok(Self { connection_pool })
    }
}

/// Postgres version of user
#[derive(FromRow)]
struct SqlxUser {
    id: Uuid,
    session_id: Uuid,
    email: String,
    name: String,
    hashed_password: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SqlxUser> for User {
    type Error = Error;

    fn try_from(user: SqlxUser) -> Result<Self> {
        Ok(Self {
            id: user.id,
            session_id: user.session_id,
            email: user.email,
            name: user.name,
            hashed_password: user.hashed_password,
            role: parse(&user.role)?,
            created_at: user.created_at,
            updated_at: user.updated_at,
        })
    }
}

/// Postgres version of donation, flattened into columns
#[derive(FromRow)]
#[allow(clippy::struct_excessive_bools)]
struct SqlxDonation {
    id: Uuid,
    donor_id: Uuid,
    title: String,
    description: String,
    category: String,
    quantity_amount: f64,
    quantity_unit: String,
    vegetarian: bool,
    vegan: bool,
    gluten_free: bool,
    dairy_free: bool,
    nut_free: bool,
    halal: bool,
    storage_temperature: String,
    tags: Vec<String>,
    contact_preference: String,
    expiry_date: DateTime<Utc>,
    pickup_date: DateTime<Utc>,
    pickup_time_start: String,
    pickup_time_end: String,
    longitude: f64,
    latitude: f64,
    street: String,
    city: String,
    state: String,
    zip_code: String,
    country: String,
    status: String,
    reserved_by_kind: Option<String>,
    reserved_by_id: Option<Uuid>,
    reserved_at: Option<DateTime<Utc>>,
    reservation_notes: Option<String>,
    picked_up_at: Option<DateTime<Utc>>,
    picked_up_by_kind: Option<String>,
    picked_up_by_id: Option<Uuid>,
    views: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Only present in listings with a proximity filter
    #[sqlx(default)]
    distance_miles: Option<f64>,
}

/// Parse a stored closed-set value
fn parse<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| Error::Corrupt(err.to_string()))
}

impl SqlxDonation {
    /// Convert into a listed donation, keeping the computed distance
    fn into_listed(self) -> Result<ListedDonation> {
        let distance_miles = self.distance_miles;

        Ok(ListedDonation {
            donation: Donation::try_from(self)?,
            distance_miles,
        })
    }
}

impl TryFrom<SqlxDonation> for Donation {
    type Error = Error;

    fn try_from(row: SqlxDonation) -> Result<Self> {
        let reserved_by = match (row.reserved_by_kind, row.reserved_by_id, row.reserved_at) {
            (Some(kind), Some(id), Some(reserved_at)) => Some(Reservation {
                claimant: Claimant {
                    kind: parse(&kind)?,
                    id,
                },
                reserved_at,
                notes: row.reservation_notes,
            }),
            _ => None,
        };

        let picked_up_by = match (row.picked_up_by_kind, row.picked_up_by_id) {
            (Some(kind), Some(id)) => Some(Claimant {
                kind: parse(&kind)?,
                id,
            }),
            _ => None,
        };

        let location = Point::new(row.longitude, row.latitude)
            .ok_or_else(|| Error::Corrupt(format!("location out of range for {}", row.id)))?;

        Ok(Self {
            id: row.id,
            donor_id: row.donor_id,
            title: row.title,
            description: row.description,
            category: parse(&row.category)?,
            quantity: Quantity {
                amount: row.quantity_amount,
                unit: parse(&row.quantity_unit)?,
            },
            dietary: DietaryFlags {
                vegetarian: row.vegetarian,
                vegan: row.vegan,
                gluten_free: row.gluten_free,
                dairy_free: row.dairy_free,
                nut_free: row.nut_free,
                halal: row.halal,
            },
            storage_temperature: parse(&row.storage_temperature)?,
            tags: row.tags,
            contact_preference: parse(&row.contact_preference)?,
            expiry_date: row.expiry_date,
            pickup_date: row.pickup_date,
            pickup_time: PickupWindow {
                start: parse(&row.pickup_time_start)?,
                end: parse(&row.pickup_time_end)?,
            },
            location,
            address: Address {
                street: row.street,
                city: row.city,
                state: row.state,
                zip_code: row.zip_code,
                country: row.country,
            },
            status: parse(&row.status)?,
            reserved_by,
            picked_up_at: row.picked_up_at,
            picked_up_by,
            views: row.views,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Convert an optional row
fn optional_donation(row: Option<SqlxDonation>) -> Result<Option<Donation>> {
    row.map(Donation::try_from).transpose()
}

/// Push the listing source: every donation with its distance to the proximity center, and the
/// filter conditions
fn push_listing(query: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &DonationFilter) {
    query.push(" FROM (SELECT donations.*, ");

    if let Some(proximity) = filter.proximity() {
        let latitude = proximity.center.latitude();
        let longitude = proximity.center.longitude();

        query
            .push("2 * ")
            .push_bind(EARTH_RADIUS_MILES)
            .push(" * ASIN(LEAST(1.0, SQRT(POWER(SIN(RADIANS(latitude - ")
            .push_bind(latitude)
            .push(") / 2), 2) + COS(RADIANS(")
            .push_bind(latitude)
            .push(")) * COS(RADIANS(latitude)) * POWER(SIN(RADIANS(longitude - ")
            .push_bind(longitude)
            .push(") / 2), 2))))");
    } else {
        query.push("NULL::DOUBLE PRECISION");
    }

    query.push(" AS distance_miles FROM donations) AS listed WHERE TRUE");

    match filter.status_filter() {
        StatusFilter::Any => {}
        StatusFilter::Only(Status::Expired) => {
            query
                .push(" AND (status = 'expired' OR (status = 'available' AND expiry_date <= ")
                .push_bind(filter.now())
                .push("))");
        }
        StatusFilter::Only(status) => {
            query
                .push(" AND status = ")
                .push_bind(status.as_str())
                .push(" AND expiry_date > ")
                .push_bind(filter.now());
        }
    }

    if let Some(category) = filter.category_filter() {
        query.push(" AND category = ").push_bind(category.as_str());
    }

    if filter.is_urgent_only() {
        query
            .push(" AND expiry_date <= ")
            .push_bind(filter.urgent_until());
    }

    if let Some(donor_id) = filter.donor_id() {
        query.push(" AND donor_id = ").push_bind(*donor_id);
    }

    if let Some(claimant_id) = filter.claimed_by_id() {
        query
            .push(" AND (reserved_by_id = ")
            .push_bind(*claimant_id)
            .push(" OR picked_up_by_id = ")
            .push_bind(*claimant_id)
            .push(")");
    }

    if let Some(proximity) = filter.proximity() {
        query
            .push(" AND distance_miles <= ")
            .push_bind(proximity.radius_miles);
    }
}

#[async_trait]
impl Storage for Postgres {
    async fn find_any_single_user(&self) -> Result<Option<User>> {
        sqlx::query_as::<_, SqlxUser>("SELECT * FROM users LIMIT 1")
            .fetch_optional(&self.connection_pool)
            .await
            .map_err(connection_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_all_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, SqlxUser>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.connection_pool)
            .await
            .map_err(connection_error)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn find_single_user_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, SqlxUser>("SELECT * FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.connection_pool)
            .await
            .map_err(connection_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, SqlxUser>("SELECT * FROM users WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.connection_pool)
            .await
            .map_err(connection_error)?
            .map(User::try_from)
            .transpose()
    }

    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User> {
        let user = sqlx::query_as::<_, SqlxUser>(
            r"
            INSERT INTO users (id, session_id, email, name, hashed_password, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(values.session_id)
        .bind(values.email)
        .bind(values.name)
        .bind(values.hashed_password)
        .bind(values.role.as_str())
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        User::try_from(user)
    }

    async fn create_donation(
        &self,
        donor_id: &Uuid,
        values: &NewDonation,
        now: DateTime<Utc>,
    ) -> Result<Donation> {
        let donation = sqlx::query_as::<_, SqlxDonation>(
            r"
            INSERT INTO donations (
                id, donor_id, title, description, category, quantity_amount, quantity_unit,
                vegetarian, vegan, gluten_free, dairy_free, nut_free, halal,
                storage_temperature, tags, contact_preference,
                expiry_date, pickup_date, pickup_time_start, pickup_time_end,
                longitude, latitude, street, city, state, zip_code, country,
                status, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11, $12, $13,
                $14, $15, $16,
                $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27,
                'available', $28, $28
            )
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(donor_id)
        .bind(&values.title)
        .bind(&values.description)
        .bind(values.category.as_str())
        .bind(values.quantity.amount)
        .bind(values.quantity.unit.as_str())
        .bind(values.dietary.vegetarian)
        .bind(values.dietary.vegan)
        .bind(values.dietary.gluten_free)
        .bind(values.dietary.dairy_free)
        .bind(values.dietary.nut_free)
        .bind(values.dietary.halal)
        .bind(values.storage_temperature.as_str())
        .bind(&values.tags)
        .bind(values.contact_preference.as_str())
        .bind(values.expiry_date)
        .bind(values.pickup_date)
        .bind(values.pickup_time.start.to_string())
        .bind(values.pickup_time.end.to_string())
        .bind(values.location.longitude())
        .bind(values.location.latitude())
        .bind(&values.address.street)
        .bind(&values.address.city)
        .bind(&values.address.state)
        .bind(&values.address.zip_code)
        .bind(&values.address.country)
        .bind(now)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Donation::try_from(donation)
    }

    async fn find_single_donation_by_id(&self, id: &Uuid) -> Result<Option<Donation>> {
        let donation = sqlx::query_as::<_, SqlxDonation>(
            "SELECT * FROM donations WHERE id = $1 LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        optional_donation(donation)
    }

    async fn find_donations(&self, filter: &DonationFilter) -> Result<DonationPage> {
        let mut count_query = QueryBuilder::new("SELECT COUNT(*)");
        push_listing(&mut count_query, filter);

        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.connection_pool)
            .await
            .map_err(connection_error)?;

        let mut page_query = QueryBuilder::new("SELECT *");
        push_listing(&mut page_query, filter);

        page_query.push(match filter.effective_sort() {
            Sort::Newest => " ORDER BY created_at DESC, id",
            Sort::Oldest => " ORDER BY created_at ASC, id",
            Sort::Expiring => " ORDER BY expiry_date ASC, id",
            Sort::Nearest => " ORDER BY distance_miles ASC, id",
        });

        page_query
            .push(" LIMIT ")
            .push_bind(i64::from(filter.limit()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));

        let donations = page_query
            .build_query_as::<SqlxDonation>()
            .fetch_all(&self.connection_pool)
            .await
            .map_err(connection_error)?
            .into_iter()
            .map(SqlxDonation::into_listed)
            .collect::<Result<Vec<ListedDonation>>>()?;

        Ok(DonationPage {
            donations,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn find_expiring_donations(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Donation>> {
        sqlx::query_as::<_, SqlxDonation>(
            r"
            SELECT *
            FROM donations
            WHERE status = 'available' AND expiry_date >= $1 AND expiry_date <= $2
            ORDER BY expiry_date ASC, id
            ",
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?
        .into_iter()
        .map(Donation::try_from)
        .collect()
    }

    async fn reserve_donation(
        &self,
        id: &Uuid,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>> {
        let donation = sqlx::query_as::<_, SqlxDonation>(
            r"
            UPDATE donations
            SET status = 'reserved',
                reserved_by_kind = $2,
                reserved_by_id = $3,
                reserved_at = $4,
                reservation_notes = $5,
                updated_at = $6
            WHERE id = $1 AND status = 'available' AND expiry_date > $6
            RETURNING *
            ",
        )
        .bind(id)
        .bind(reservation.claimant.kind.as_str())
        .bind(reservation.claimant.id)
        .bind(reservation.reserved_at)
        .bind(&reservation.notes)
        .bind(now)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        optional_donation(donation)
    }

    async fn release_donation(
        &self,
        id: &Uuid,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>> {
        let donation = sqlx::query_as::<_, SqlxDonation>(
            r"
            UPDATE donations
            SET status = 'available',
                reserved_by_kind = NULL,
                reserved_by_id = NULL,
                reserved_at = NULL,
                reservation_notes = NULL,
                updated_at = $4
            WHERE id = $1 AND status = 'reserved' AND reserved_by_kind = $2 AND reserved_by_id = $3
            RETURNING *
            ",
        )
        .bind(id)
        .bind(claimant.kind.as_str())
        .bind(claimant.id)
        .bind(now)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        optional_donation(donation)
    }

    async fn pick_up_donation(
        &self,
        id: &Uuid,
        claimant: &Claimant,
        now: DateTime<Utc>,
    ) -> Result<Option<Donation>> {
        let donation = sqlx::query_as::<_, SqlxDonation>(
            r"
            UPDATE donations
            SET status = 'picked-up',
                reserved_by_kind = NULL,
                reserved_by_id = NULL,
                reserved_at = NULL,
                reservation_notes = NULL,
                picked_up_at = $4,
                picked_up_by_kind = $2,
                picked_up_by_id = $3,
                updated_at = $4
            WHERE id = $1 AND status = 'reserved' AND reserved_by_kind = $2 AND reserved_by_id = $3
            RETURNING *
            ",
        )
        .bind(id)
        .bind(claimant.kind.as_str())
        .bind(claimant.id)
        .bind(now)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        optional_donation(donation)
    }

    async fn update_donation(
        &self,
        donation: &Donation,
        expected_status: Status,
    ) -> Result<Option<Donation>> {
        let updated = sqlx::query_as::<_, SqlxDonation>(
            r"
            UPDATE donations
            SET title = $3,
                description = $4,
                category = $5,
                quantity_amount = $6,
                quantity_unit = $7,
                vegetarian = $8,
                vegan = $9,
                gluten_free = $10,
                dairy_free = $11,
                nut_free = $12,
                halal = $13,
                storage_temperature = $14,
                tags = $15,
                contact_preference = $16,
                expiry_date = $17,
                pickup_date = $18,
                pickup_time_start = $19,
                pickup_time_end = $20,
                longitude = $21,
                latitude = $22,
                street = $23,
                city = $24,
                state = $25,
                zip_code = $26,
                country = $27,
                status = $28,
                updated_at = $29
            WHERE id = $1 AND status = $2
            RETURNING *
            ",
        )
        .bind(donation.id)
        .bind(expected_status.as_str())
        .bind(&donation.title)
        .bind(&donation.description)
        .bind(donation.category.as_str())
        .bind(donation.quantity.amount)
        .bind(donation.quantity.unit.as_str())
        .bind(donation.dietary.vegetarian)
        .bind(donation.dietary.vegan)
        .bind(donation.dietary.gluten_free)
        .bind(donation.dietary.dairy_free)
        .bind(donation.dietary.nut_free)
        .bind(donation.dietary.halal)
        .bind(donation.storage_temperature.as_str())
        .bind(&donation.tags)
        .bind(donation.contact_preference.as_str())
        .bind(donation.expiry_date)
        .bind(donation.pickup_date)
        .bind(donation.pickup_time.start.to_string())
        .bind(donation.pickup_time.end.to_string())
        .bind(donation.location.longitude())
        .bind(donation.location.latitude())
        .bind(&donation.address.street)
        .bind(&donation.address.city)
        .bind(&donation.address.state)
        .bind(&donation.address.zip_code)
        .bind(&donation.address.country)
        .bind(donation.status.as_str())
        .bind(donation.updated_at)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        optional_donation(updated)
    }

    async fn delete_donation(&self, id: &Uuid, donor_id: &Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM donations
            WHERE id = $1 AND donor_id = $2 AND status IN ('available', 'cancelled', 'expired')
            ",
        )
        .bind(id)
        .bind(donor_id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: &Uuid) -> Result<Option<Donation>> {
        let donation = sqlx::query_as::<_, SqlxDonation>(
            "UPDATE donations SET views = views + 1 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        optional_donation(donation)
    }

    async fn expire_overdue_donations(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE donations
            SET status = 'expired', updated_at = $1
            WHERE status = 'available' AND expiry_date <= $1
            ",
        )
        .bind(now)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(result.rows_affected())
    }
}

/// Convert `SQLx` to storage connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}
