//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;

pub use current_user::CurrentUser;
pub use current_user::DEFAULT_TOKEN_LIFETIME;
pub use current_user::JwtKeys;
pub use request::Form;
pub use request::PathParameters;
pub use request::QueryParameters;
pub use request::parse_donation_id;
pub use response::Error;
pub use response::Success;

mod current_user;
mod donations;
mod request;
mod response;
mod users;

/// Get the Axum router for all API routes
pub fn router() -> Router {
    Router::new()
        .route("/auth/register", post(users::register))
        .route("/auth/token", post(users::token))
        .route("/auth/me", get(users::me))
        .route("/users", get(users::list))
        .route("/donations", get(donations::list).post(donations::create))
        .route("/donations/mine", get(donations::mine))
        .route(
            "/donations/expiring-soon/{days}",
            get(donations::expiring_soon),
        )
        .route(
            "/donations/{donation}",
            get(donations::single)
                .put(donations::update)
                .delete(donations::delete),
        )
        .route("/donations/{donation}/reserve", post(donations::reserve))
        .route(
            "/donations/{donation}/cancel-reservation",
            post(donations::cancel_reservation),
        )
        .route("/donations/{donation}/pickup", post(donations::pickup))
}
