//! Map arbitrary errors into a client-facing error body and status.
//!
//! The request layer owns transport; this module only decides *what* to
//! send. Known [`AppError`]s keep their code, message, and status. Anything
//! else collapses to `INTERNAL`/500 with a generic message unless details are
//! explicitly exposed (development builds).

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AppError, ErrorKind};

const GENERIC_MESSAGE: &str = "An unexpected error occurred";

/// `{ "error": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Wrapped payload.
    pub error: ErrorPayload,
}

/// Inner payload of an [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Wire label of the error kind.
    pub code: ErrorKind,
    /// Message safe to show a client.
    pub message: String,
    /// Structured details, omitted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A status plus the body to send with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    /// HTTP status.
    pub status: u16,
    /// Serializable body.
    pub body: ErrorBody,
}

impl ErrorResponse {
    /// Build the response for `error`.
    ///
    /// With `expose_details` set, an unclassified error reports its own
    /// message instead of the generic one.
    #[must_use]
    pub fn from_error(error: &(dyn StdError + 'static), expose_details: bool) -> Self {
        if let Some(app) = error.downcast_ref::<AppError>() {
            return Self::from_app_error(app);
        }

        let message = if expose_details { error.to_string() } else { GENERIC_MESSAGE.to_string() };
        Self {
            status: ErrorKind::Internal.default_status(),
            body: ErrorBody {
                error: ErrorPayload { code: ErrorKind::Internal, message, details: None },
            },
        }
    }

    /// Build the response for a classified error.
    #[must_use]
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            status: error.status_code(),
            body: ErrorBody {
                error: ErrorPayload {
                    code: error.kind(),
                    message: error.message().to_string(),
                    details: error.details().cloned(),
                },
            },
        }
    }

    /// Body as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.body).unwrap_or(Value::Null)
    }
}
