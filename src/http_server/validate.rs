//! Request body validation
//!
//! Bodies decode with every field defaulted, so a missing or `null` field
//! reaches validation as an empty string and is reported per field rather
//! than as a decode failure.

use serde::{Deserialize, Deserializer, Serialize};

/// One failed field constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn required(field: &str) -> Self {
        Self {
            field: field.to_string(),
            message: format!("field {} is a required field", field),
        }
    }

    pub fn invalid(field: &str) -> Self {
        Self {
            field: field.to_string(),
            message: format!("field {} is not valid", field),
        }
    }
}

/// Accumulates field errors in declaration order
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-empty
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.is_empty() {
            self.errors.push(FieldError::required(field));
        }
        self
    }

    /// Non-empty ASCII letters and digits
    pub fn required_alphanum(mut self, field: &str, value: &str) -> Self {
        if value.is_empty() {
            self.errors.push(FieldError::required(field));
        } else if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            self.errors.push(FieldError::invalid(field));
        }
        self
    }

    pub fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `POST /keys` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,
}

impl SaveRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required_alphanum("key", &self.key)
            .required("value", &self.value)
            .finish()
    }
}

/// `PUT /keys/:key` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,
}

impl UpdateRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new().required("value", &self.value).finish()
    }
}
