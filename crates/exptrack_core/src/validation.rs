//! Structured field-level validation errors.
//!
//! Errors are grouped per field, each field holding one or more
//! human-readable messages. The serialized form is the JSON object
//! `{"field": ["message", ...]}` returned by the endpoint layer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MISSING_FIELD: &str = "Missing data for required field.";
pub const NULL_FIELD: &str = "Field may not be null.";
pub const UNKNOWN_FIELD: &str = "Unknown field.";
pub const NOT_AN_INTEGER: &str = "Not a valid integer.";
pub const NOT_A_STRING: &str = "Not a valid string.";
pub const NOT_A_LIST: &str = "Not a valid list.";
pub const BLANK_FIELD: &str = "Field may not be blank.";
pub const TEAM_IDS_LENGTH: &str = "Length must be between 1 and 2.";
pub const INVALID_BODY: &str = "Invalid input type.";

/// Key for errors about the body as a whole rather than one field.
pub const SCHEMA_FIELD: &str = "_schema";

/// Field name to messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field error.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    /// `Ok(value)` when no error was recorded, `Err(self)` otherwise.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// `"Must be one of: a, b."` for a closed set of accepted values.
pub fn one_of_message(choices: &[&str]) -> String {
    format!("Must be one of: {}.", choices.join(", "))
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl Error for ValidationErrors {}
