//! Field-level validation shared by every submitted form.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const BLANK: &str = "can't be blank";

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// A non-empty list of field errors.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error, Serialize)]
#[error("Validation failed: {}", describe(.0))]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    #[must_use]
    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(value: FieldError) -> Self {
        Self(vec![value])
    }
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects field errors while a form is being checked.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn presence(mut self, field: &str, value: Option<&str>) -> Self {
        if value.is_none_or(is_blank) {
            self.errors.push(FieldError::new(field, BLANK));
        }
        self
    }

    #[must_use]
    pub fn check(mut self, field: &str, ok: bool, message: &str) -> Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

/// Whitespace-only text counts as absent.
#[must_use]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::{BLANK, FieldError, Validator};

    #[test]
    fn presence_rejects_missing_and_blank() {
        assert!(Validator::new().presence("message", Some("hi")).finish().is_ok());

        for value in [None, Some(""), Some("  \n\t")] {
            let errors = Validator::new()
                .presence("message", value)
                .finish()
                .unwrap_err();
            assert_eq!(errors.into_inner(), [FieldError::new("message", BLANK)]);
        }
    }

    #[test]
    fn collects_every_failure() {
        let errors = Validator::new()
            .presence("message", Some(""))
            .check("picture", false, BLANK)
            .finish()
            .unwrap_err();

        assert_eq!(
            errors.to_string(),
            "Validation failed: message can't be blank, picture can't be blank"
        );
        assert_eq!(
            errors.into_inner(),
            [
                FieldError::new("message", BLANK),
                FieldError::new("picture", BLANK),
            ]
        );
    }
}
