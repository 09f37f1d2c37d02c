//! Validation of new donations and donor edits
//!
//! Closed value sets are already enforced while deserializing, the rules in here cover ranges,
//! lengths and the relation between the dates.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use super::Address;
use super::Category;
use super::ContactPreference;
use super::DietaryFlags;
use super::Donation;
use super::PickupWindow;
use super::Point;
use super::Quantity;
use super::Status;
use super::StorageTemperature;

/// Maximum length of a title
const TITLE_MAX_LENGTH: usize = 100;

/// Maximum length of a description
const DESCRIPTION_MAX_LENGTH: usize = 1000;

/// Maximum number of tags
const TAGS_MAX_COUNT: usize = 10;

/// Maximum length of a single tag
const TAG_MAX_LENGTH: usize = 30;

/// Input does not match the rules of a donation
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub(crate) fn new<M: ToString>(message: M) -> Self {
        Self(message.to_string())
    }
}

/// Fields of a new donation, as offered by a donor
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonation {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub quantity: Quantity,
    #[serde(default)]
    pub dietary: DietaryFlags,
    #[serde(default)]
    pub storage_temperature: StorageTemperature,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contact_preference: ContactPreference,
    pub expiry_date: DateTime<Utc>,
    pub pickup_date: DateTime<Utc>,
    pub pickup_time: PickupWindow,
    pub location: Point,
    pub address: Address,
}

impl NewDonation {
    /// Validate and normalize the donation as of `now`
    ///
    /// # Errors
    ///
    /// Will return `Err` on the first rule that is not met
    pub fn validate(self, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        if self.pickup_date < now {
            return Err(ValidationError::new("Pickup date can not be in the past"));
        }

        check_dates(self.pickup_date, self.expiry_date)?;

        Ok(Self {
            title: text("Title", &self.title, TITLE_MAX_LENGTH)?,
            description: text("Description", &self.description, DESCRIPTION_MAX_LENGTH)?,
            quantity: quantity(self.quantity)?,
            tags: tags(&self.tags)?,
            pickup_time: pickup_window(self.pickup_time)?,
            address: address(&self.address)?,
            ..self
        })
    }
}

/// Donor edits, fields that are not provided are left as they are
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub quantity: Option<Quantity>,
    pub dietary: Option<DietaryFlags>,
    pub storage_temperature: Option<StorageTemperature>,
    pub tags: Option<Vec<String>>,
    pub contact_preference: Option<ContactPreference>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub pickup_date: Option<DateTime<Utc>>,
    pub pickup_time: Option<PickupWindow>,
    pub location: Option<Point>,
    pub address: Option<Address>,

    /// Only `cancelled` is accepted, to withdraw an available donation
    pub status: Option<Status>,
}

impl DonationPatch {
    /// Apply the edits to a copy of `donation`
    ///
    /// The status field is not touched, status changes belong to the lifecycle.
    ///
    /// # Errors
    ///
    /// Will return `Err` on the first rule that is not met
    pub fn apply_to(
        &self,
        donation: &Donation,
        now: DateTime<Utc>,
    ) -> Result<Donation, ValidationError> {
        let mut updated = donation.clone();

        if let Some(title) = &self.title {
            updated.title = text("Title", title, TITLE_MAX_LENGTH)?;
        }

        if let Some(description) = &self.description {
            updated.description = text("Description", description, DESCRIPTION_MAX_LENGTH)?;
        }

        if let Some(category) = self.category {
            updated.category = category;
        }

        if let Some(value) = self.quantity {
            updated.quantity = quantity(value)?;
        }

        if let Some(dietary) = self.dietary {
            updated.dietary = dietary;
        }

        if let Some(storage_temperature) = self.storage_temperature {
            updated.storage_temperature = storage_temperature;
        }

        if let Some(values) = &self.tags {
            updated.tags = tags(values)?;
        }

        if let Some(contact_preference) = self.contact_preference {
            updated.contact_preference = contact_preference;
        }

        if let Some(pickup_date) = self.pickup_date {
            if pickup_date < now {
                return Err(ValidationError::new("Pickup date can not be in the past"));
            }

            updated.pickup_date = pickup_date;
        }

        if let Some(expiry_date) = self.expiry_date {
            if expiry_date <= now {
                return Err(ValidationError::new("Expiry date must be in the future"));
            }

            updated.expiry_date = expiry_date;
        }

        if self.pickup_date.is_some() || self.expiry_date.is_some() {
            check_dates(updated.pickup_date, updated.expiry_date)?;
        }

        if let Some(window) = self.pickup_time {
            updated.pickup_time = pickup_window(window)?;
        }

        if let Some(location) = self.location {
            updated.location = location;
        }

        if let Some(value) = &self.address {
            updated.address = address(value)?;
        }

        updated.updated_at = now;

        Ok(updated)
    }
}

/// Expiry must come strictly after pickup
fn check_dates(
    pickup_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if expiry_date <= pickup_date {
        Err(ValidationError::new("Expiry date must be after the pickup date"))
    } else {
        Ok(())
    }
}

/// Trimmed, non-empty text with a maximum length
fn text(field: &str, value: &str, max_length: usize) -> Result<String, ValidationError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::new(format!("{field} is required")));
    }

    if value.chars().count() > max_length {
        return Err(ValidationError::new(format!(
            "{field} can not be longer than {max_length} characters"
        )));
    }

    Ok(value.to_string())
}

fn quantity(quantity: Quantity) -> Result<Quantity, ValidationError> {
    if quantity.amount.is_finite() && quantity.amount > 0.0 {
        Ok(quantity)
    } else {
        Err(ValidationError::new("Quantity amount must be greater than zero"))
    }
}

/// Trimmed tags, empty ones are dropped
fn tags(values: &[String]) -> Result<Vec<String>, ValidationError> {
    let tags = values
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect::<Vec<String>>();

    if tags.len() > TAGS_MAX_COUNT {
        return Err(ValidationError::new(format!(
            "At most {TAGS_MAX_COUNT} tags are allowed"
        )));
    }

    if tags.iter().any(|tag| tag.chars().count() > TAG_MAX_LENGTH) {
        return Err(ValidationError::new(format!(
            "Tags can not be longer than {TAG_MAX_LENGTH} characters"
        )));
    }

    Ok(tags)
}

fn pickup_window(window: PickupWindow) -> Result<PickupWindow, ValidationError> {
    if window.start < window.end {
        Ok(window)
    } else {
        Err(ValidationError::new("Pickup time must start before it ends"))
    }
}

fn address(address: &Address) -> Result<Address, ValidationError> {
    Ok(Address {
        street: text("Street", &address.street, TITLE_MAX_LENGTH)?,
        city: text("City", &address.city, TITLE_MAX_LENGTH)?,
        state: address.state.trim().to_string(),
        zip_code: address.zip_code.trim().to_string(),
        country: address.country.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::TimeZone;

    use super::*;
    use crate::donations::tests::sample_donation;

    fn new_donation(now: DateTime<Utc>) -> NewDonation {
        serde_json::from_value(serde_json::json!({
            "title": "  Apples ",
            "description": "A crate of apples",
            "category": "fruits",
            "quantity": { "amount": 12.5, "unit": "kg" },
            "tags": [" organic ", ""],
            "expiryDate": now + Duration::days(4),
            "pickupDate": now + Duration::days(1),
            "pickupTime": { "start": "08:00", "end": "12:00" },
            "location": { "longitude": 4.9, "latitude": 52.37 },
            "address": { "street": "Dam 1", "city": "Amsterdam" }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_donation_is_normalized() {
        let now = Utc::now();
        let donation = new_donation(now).validate(now).unwrap();

        assert_eq!(donation.title, "Apples");
        assert_eq!(donation.tags, vec!["organic".to_string()]);
        assert_eq!(donation.storage_temperature, StorageTemperature::RoomTemperature);
        assert_eq!(donation.contact_preference, ContactPreference::InApp);
    }

    #[test]
    fn test_expiry_before_pickup() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut donation = new_donation(now);
        donation.pickup_date = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        donation.expiry_date = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();

        assert_eq!(
            donation.validate(now).unwrap_err(),
            ValidationError::new("Expiry date must be after the pickup date")
        );
    }

    #[test]
    fn test_expiry_equal_to_pickup() {
        let now = Utc::now();
        let mut donation = new_donation(now);
        donation.expiry_date = donation.pickup_date;

        assert!(donation.validate(now).is_err());
    }

    #[test]
    fn test_pickup_in_the_past() {
        let now = Utc::now();
        let mut donation = new_donation(now);
        donation.pickup_date = now - Duration::hours(1);

        assert_eq!(
            donation.validate(now).unwrap_err(),
            ValidationError::new("Pickup date can not be in the past")
        );
    }

    #[test]
    fn test_quantity_must_be_positive() {
        let now = Utc::now();

        for amount in [0.0, -1.0, f64::NAN] {
            let mut donation = new_donation(now);
            donation.quantity.amount = amount;
            assert!(donation.validate(now).is_err());
        }
    }

    #[test]
    fn test_closed_sets_are_enforced_while_parsing() {
        let result = serde_json::from_value::<NewDonation>(serde_json::json!({
            "title": "Apples",
            "description": "A crate of apples",
            "category": "candy",
            "quantity": { "amount": 1, "unit": "kg" },
            "expiryDate": "2030-01-05T00:00:00Z",
            "pickupDate": "2030-01-01T00:00:00Z",
            "pickupTime": { "start": "08:00", "end": "12:00" },
            "location": { "longitude": 4.9, "latitude": 52.37 },
            "address": { "street": "Dam 1", "city": "Amsterdam" }
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_pickup_window_order() {
        let now = Utc::now();
        let mut donation = new_donation(now);
        donation.pickup_time = PickupWindow {
            start: "12:00".parse().unwrap(),
            end: "08:00".parse().unwrap(),
        };

        assert!(donation.validate(now).is_err());
    }

    #[test]
    fn test_patch() {
        let now = Utc::now();
        let donation = sample_donation(now);

        let patch = DonationPatch {
            title: Some(" Rye bread ".to_string()),
            expiry_date: Some(now + Duration::days(5)),
            ..DonationPatch::default()
        };
        let updated = patch.apply_to(&donation, now).unwrap();
        assert_eq!(updated.title, "Rye bread");
        assert_eq!(updated.expiry_date, now + Duration::days(5));
        assert_eq!(updated.status, donation.status);

        let patch = DonationPatch {
            expiry_date: Some(donation.pickup_date - Duration::hours(1)),
            ..DonationPatch::default()
        };
        assert!(patch.apply_to(&donation, now).is_err());

        let patch = DonationPatch {
            description: Some("   ".to_string()),
            ..DonationPatch::default()
        };
        assert!(patch.apply_to(&donation, now).is_err());
    }
}
