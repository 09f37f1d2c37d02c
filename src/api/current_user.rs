//! Authentication of API calls
//!
//! Tokens are HS256 JWTs. The `jti` claim carries the session ID of the user, rotating that ID
//! invalidates every token handed out before.

use std::ops::Deref;
use std::sync::Arc;

use axum::Extension;
use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use chrono::Utc;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::api::Error;
use crate::donations::Claimant;
use crate::storage::Database;
use crate::users::User;

/// Default lifetime of an access token, in seconds
pub const DEFAULT_TOKEN_LIFETIME: i64 = 3600;

/// Signs and checks access tokens
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,

    /// Seconds a freshly issued token stays valid
    token_lifetime: i64,
}

impl JwtKeys {
    /// Derive both keys from a shared secret
    pub fn new(secret: &[u8], token_lifetime: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            token_lifetime,
        }
    }

    /// Issue an access token for the user's current session
    pub fn issue(&self, user: &User) -> Result<Token, Error> {
        let claims = Claims {
            sub: user.id,
            exp: Utc::now().timestamp() + self.token_lifetime,
            jti: user.session_id,
        };

        let access_token =
            jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &self.encoding)
                .map_err(Error::internal_server_error)?;

        Ok(Token {
            token_type: "Bearer",
            expires_in: self.token_lifetime,
            access_token,
        })
    }

    /// Check the signature and expiry of a token
    fn verify(&self, token: &str) -> Result<Claims, Error> {
        let validation = jsonwebtoken::Validation::default();

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => Error::forbidden("Token expired"),
                _ => Error::forbidden("Invalid token").with_description(err.to_string()),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    /// User ID
    sub: Uuid,

    /// UNIX timestamp
    exp: i64,

    /// Session ID of the user when the token was issued
    jti: Uuid,
}

/// Access token as handed out by `POST /api/auth/token`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    token_type: &'static str,
    expires_in: i64,
    access_token: String,
}

/// The authenticated user of a request
///
/// Rejects the request with a 403 when the `Authorization` header is missing or does not hold
/// a token for an existing session.
#[derive(Clone)]
pub struct CurrentUser {
    user: Arc<User>,
}

impl CurrentUser {
    /// The user as holder of reservations
    ///
    /// Only volunteers and charities can reserve donations.
    pub fn claimant(&self) -> Result<Claimant, Error> {
        self.user
            .as_claimant()
            .ok_or_else(|| Error::forbidden("Only volunteers and charities can do this"))
    }
}

impl Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

/// Find the user a token was issued to, provided its session is still the same
async fn authenticate(
    database: &Database,
    jwt_keys: &JwtKeys,
    token: &str,
) -> Result<CurrentUser, Error> {
    let claims = jwt_keys.verify(token)?;

    let user = database
        .find_single_user_by_id(&claims.sub)
        .await
        .map_err(Error::internal_server_error)?
        .ok_or_else(|| Error::forbidden("Could not find user"))?;

    if user.session_id != claims.jti {
        return Err(Error::forbidden("Token expired"));
    }

    Ok(CurrentUser {
        user: Arc::new(user),
    })
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| Error::forbidden("Missing API token"))?;

        let Extension(jwt_keys) = parts
            .extract::<Extension<JwtKeys>>()
            .await
            .map_err(|_| Error::internal_server_error("JWT keys are not configured"))?;

        let Extension(database) = parts
            .extract::<Extension<Database>>()
            .await
            .map_err(|_| Error::internal_server_error("Database is not configured"))?;

        authenticate(&database, &jwt_keys, bearer.token()).await
    }
}
