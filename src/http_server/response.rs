//! Response envelope
//!
//! Every body carries `status`; failures add `error`, validation failures
//! add the per-field list.

use serde::{Deserialize, Serialize};

use super::validate::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Error")]
    Error,
}

/// Common envelope: `{status, error?, fields?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            error: None,
            fields: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(message.into()),
            fields: None,
        }
    }

    /// All field messages joined into `error`, plus the structured list.
    pub fn validation(fields: Vec<FieldError>) -> Self {
        let joined = fields
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            status: Status::Error,
            error: Some(joined),
            fields: Some(fields),
        }
    }
}

/// `GET /keys/:key` success body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(flatten)]
    pub response: Response,
    pub value: String,
}

impl GetResponse {
    pub fn new(value: String) -> Self {
        Self {
            response: Response::ok(),
            value,
        }
    }
}
