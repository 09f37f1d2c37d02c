//! API response helpers
//!
//! Every response body is wrapped in the same envelope:
//!
//! ```json
//! { "success": true, "data": { ... }, "message": "optional" }
//! { "success": false, "error": "short message", "message": "optional description" }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;

use crate::lifecycle::LifecycleError;
use crate::users::Role;

/// Hold data for a successful API interaction
pub struct Success<V>
where
    V: Serialize,
{
    status_code: StatusCode,
    data: Option<V>,
    message: Option<String>,
}

impl<V> Success<V>
where
    V: Serialize,
{
    pub fn ok(data: V) -> Self {
        Self {
            status_code: StatusCode::OK,
            data: Some(data),
            message: None,
        }
    }

    pub fn created(data: V) -> Self {
        Self {
            status_code: StatusCode::CREATED,
            data: Some(data),
            message: None,
        }
    }

    /// A response with only a message and no data
    pub fn message<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self {
            status_code: StatusCode::OK,
            data: None,
            message: Some(message.to_string()),
        }
    }

    #[must_use]
    pub fn with_message<M>(self, message: M) -> Self
    where
        M: ToString,
    {
        Self {
            message: Some(message.to_string()),
            ..self
        }
    }
}

#[derive(Serialize)]
struct SuccessEnvelope<D>
where
    D: Serialize,
{
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<D>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<V> IntoResponse for Success<V>
where
    V: Serialize,
{
    fn into_response(self) -> Response {
        (
            self.status_code,
            Json(SuccessEnvelope {
                success: true,
                data: self.data,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Hold data for a failed API interaction
#[derive(Debug)]
pub struct Error {
    status_code: StatusCode,
    message: String,
    description: Option<String>,
}

impl Error {
    fn new<M>(status_code: StatusCode, message: M) -> Self
    where
        M: ToString,
    {
        Self {
            status_code,
            message: message.to_string(),
            description: None,
        }
    }

    pub fn bad_request<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error<M>(message: M) -> Self
    where
        M: ToString,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn with_description<M>(self, description: M) -> Self
    where
        M: ToString,
    {
        Self {
            description: Some(description.to_string()),
            ..self
        }
    }

    #[cfg(test)]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            self.status_code,
            Json(ErrorEnvelope {
                success: false,
                error: self.message,
                message: self.description,
            }),
        )
            .into_response()
    }
}

impl From<LifecycleError> for Error {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(err) => {
                Error::bad_request("Validation error").with_description(err)
            }
            LifecycleError::NotFound => Error::not_found(err),
            LifecycleError::Forbidden(message) => Error::forbidden(message),
            LifecycleError::NotAvailable
            | LifecycleError::Expired
            | LifecycleError::InvalidState(_)
            | LifecycleError::Locked(_) => Error::bad_request(err),
            LifecycleError::Conflict => Error::conflict(err),
            LifecycleError::Storage(err) => {
                tracing::error!("Storage failure: {err}");
                Error::internal_server_error("Storage error")
            }
        }
    }
}

impl Role {
    /// Only let one of the `allowed` roles through
    pub fn is_allowed(self, allowed: &[Role]) -> Result<(), Error> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "Not allowed as {}",
                self.as_str()
            )))
        }
    }
}
