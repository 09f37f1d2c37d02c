use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use crate::donations::Claimant;
use crate::donations::ClaimantKind;
use crate::donations::closed_set;
use crate::password::generate;
use crate::password::hash;
use crate::storage::CreateUserValues;
use crate::storage::Database;
use crate::utils::env_var_or_else;

closed_set! {
    /// User roles
    pub enum Role {
        /// Offers donations
        Donor => "donor",
        /// Reserves and picks up donations
        Volunteer => "volunteer",
        /// Reserves and picks up donations on behalf of a charity
        Charity => "charity",
        /// Manages users
        Admin => "admin",
    }
}

impl Role {
    /// The kind of reservation holder this role acts as, if any
    pub fn claimant_kind(self) -> Option<ClaimantKind> {
        match self {
            Role::Volunteer => Some(ClaimantKind::Volunteer),
            Role::Charity => Some(ClaimantKind::Charity),
            Role::Donor | Role::Admin => None,
        }
    }

    /// Can this role be picked when registering?
    pub fn is_self_service(self) -> bool {
        match self {
            Role::Donor | Role::Volunteer | Role::Charity => true,
            Role::Admin => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The user as reservation holder, `None` for donors and admins
    pub fn as_claimant(&self) -> Option<Claimant> {
        self.role
            .claimant_kind()
            .map(|kind| Claimant { kind, id: self.id })
    }
}

/// Make sure there is at least one user to log in with
///
/// # Errors
///
/// Will return `Err` when the storage can not be reached
pub async fn ensure_initial_user(database: &Database) -> Result<()> {
    let user = database.find_any_single_user().await?;

    if user.is_none() {
        let email = env_var_or_else("INITIAL_EMAIL", || {
            let initial_email = format!("admin-{}@localhost", Uuid::new_v4().simple());
            tracing::info!("`INITIAL_EMAIL` not set, generating new email: {initial_email}");
            initial_email
        });

        let password = env_var_or_else("INITIAL_PASSWORD", || {
            let initial_password = generate();
            tracing::info!(
                "`INITIAL_PASSWORD` not set, generating new password: {initial_password}"
            );
            initial_password
        });

        let hashed_password = hash(&password)?;

        let values = CreateUserValues {
            session_id: &Uuid::new_v4(),
            role: Role::Admin,
            email: &email,
            name: "Administrator",
            hashed_password: &hashed_password,
        };

        database.create_user(&values).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_spelling() {
        for role in [Role::Donor, Role::Volunteer, Role::Charity, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(
                serde_json::to_string(&role).unwrap(),
                format!(r#""{}""#, role.as_str())
            );
        }

        assert!("manager".parse::<Role>().is_err());
    }

    #[test]
    fn test_claimant_kind() {
        assert_eq!(Role::Volunteer.claimant_kind(), Some(ClaimantKind::Volunteer));
        assert_eq!(Role::Charity.claimant_kind(), Some(ClaimantKind::Charity));
        assert_eq!(Role::Donor.claimant_kind(), None);
        assert_eq!(Role::Admin.claimant_kind(), None);
        assert!(!Role::Admin.is_self_service());
    }
}
