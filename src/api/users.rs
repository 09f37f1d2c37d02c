//! Registration, tokens and user management

use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::password::MIN_PASSWORD_LENGTH;
use crate::password::hash;
use crate::password::verify;
use crate::storage::CreateUserValues;
use crate::storage::Database;
use crate::users::Role;
use crate::users::User;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::JwtKeys;
use super::Success;
use super::current_user::Token;

/// A user as shown by the API, without password or session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Registration form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    email: String,
    name: String,
    password: String,
    role: Role,
}

/// Register a new donor, volunteer or charity
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "email": "bakery@example.com", "name": "Corner Bakery", \
///           "password": "verysecret", "role": "donor" }' \
///     http://localhost:6000/api/auth/register
/// ```
///
/// Response:
/// ```json
/// { "success": true, "data": { "id": "<uuid>", "email": "bakery@example.com", ... } }
/// ```
pub async fn register(
    Extension(database): Extension<Database>,
    Form(form): Form<RegisterForm>,
) -> Result<Success<UserResponse>, Error> {
    let email = form.email.trim().to_lowercase();
    let name = form.name.trim();

    if !form.role.is_self_service() {
        return Err(Error::bad_request("Role can not be picked when registering"));
    }

    if !email.contains('@') {
        return Err(Error::bad_request("Invalid email address"));
    }

    if name.is_empty() {
        return Err(Error::bad_request("Name can not be empty"));
    }

    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let existing = database
        .find_single_user_by_email(&email)
        .await
        .map_err(Error::internal_server_error)?;

    if existing.is_some() {
        return Err(Error::bad_request("User already exists"));
    }

    let hashed_password = hash(&form.password).map_err(Error::internal_server_error)?;

    let values = CreateUserValues {
        session_id: &Uuid::new_v4(),
        role: form.role,
        email: &email,
        name,
        hashed_password: &hashed_password,
    };

    let user = database
        .create_user(&values)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::info!("Registered {} {}", user.role.as_str(), user.id);

    Ok(Success::created(UserResponse::from(user)))
}

/// Login form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    email: String,
    password: String,
}

/// Log in with email and password
///
/// The access token goes in the `Authorization: Bearer` header of later calls. It stops working
/// when it expires or the session of the user is rotated.
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "email": "bakery@example.com", "password": "verysecret" }' \
///     http://localhost:6000/api/auth/token
/// ```
///
/// Response
/// ```json
/// { "success": true, "data": { "tokenType": "Bearer", "expiresIn": 3600, "accessToken": "…" } }
/// ```
pub async fn token(
    Extension(jwt_keys): Extension<JwtKeys>,
    Extension(database): Extension<Database>,
    Form(form): Form<LoginForm>,
) -> Result<Success<Token>, Error> {
    let user = database
        .find_single_user_by_email(&form.email.trim().to_lowercase())
        .await
        .map_err(Error::internal_server_error)?;

    match user {
        Some(user) if verify(&user.hashed_password, &form.password) => {
            let token = jwt_keys.issue(&user)?;

            Ok(Success::ok(token))
        }
        _ => Err(Error::bad_request("Invalid email or password")),
    }
}

/// Get the current user
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/auth/me
/// ```
pub async fn me(current_user: CurrentUser) -> Success<UserResponse> {
    Success::ok(UserResponse::from(User::clone(&current_user)))
}

/// List all users, admins only
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/users
/// ```
///
/// Response:
/// ```json
/// { "success": true, "data": [ { "id": "<uuid>", "email": "admin@localhost" ... } ] }
/// ```
pub async fn list(
    Extension(database): Extension<Database>,
    current_user: CurrentUser,
) -> Result<Success<Vec<UserResponse>>, Error> {
    current_user.role.is_allowed(&[Role::Admin])?;

    let users = database
        .find_all_users()
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(
        users.into_iter().map(UserResponse::from).collect(),
    ))
}
