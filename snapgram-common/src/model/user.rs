use crate::model::{
    Id,
    validation::{FieldError, ValidationErrors, Validator, is_blank},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const USER_HANDLE_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub handle: UserHandle,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateUser {
    pub handle: UserHandle,
}

/// Body of a sign-up request, before validation.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub handle: String,
}

impl Registration {
    pub fn validate(self) -> Result<CreateUser, ValidationErrors> {
        Validator::new()
            .presence("handle", Some(&self.handle))
            .check(
                "handle",
                self.handle.chars().count() <= USER_HANDLE_MAX_LEN,
                "is too long",
            )
            .finish()?;

        let handle = UserHandle::new(self.handle)
            .map_err(|_| ValidationErrors::from(FieldError::new("handle", "is invalid")))?;
        Ok(CreateUser { handle })
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserHandle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The user handle is invalid: {0:?}")]
pub struct InvalidUserHandleError(String);

impl UserHandle {
    pub fn new(handle: String) -> Result<Self, InvalidUserHandleError> {
        if !is_blank(&handle) && handle.chars().count() <= USER_HANDLE_MAX_LEN {
            Ok(UserHandle(handle))
        } else {
            Err(InvalidUserHandleError(handle))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserHandle::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"UserHandle"))
    }
}

#[cfg(test)]
mod tests {
    use super::{Registration, USER_HANDLE_MAX_LEN, UserHandle};
    use crate::model::validation::{BLANK, FieldError};

    #[test]
    fn handle_limits() {
        assert!(UserHandle::new("gramfan".into()).is_ok());
        assert!(UserHandle::new("x".repeat(USER_HANDLE_MAX_LEN)).is_ok());
        assert!(UserHandle::new("x".repeat(USER_HANDLE_MAX_LEN + 1)).is_err());
        assert!(UserHandle::new("   ".into()).is_err());
    }

    #[test]
    fn registration_reports_field_errors() {
        let created = Registration {
            handle: "gramfan".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(created.handle.get(), "gramfan");

        let errors = Registration {
            handle: String::new(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.into_inner(), [FieldError::new("handle", BLANK)]);

        let errors = Registration {
            handle: "y".repeat(USER_HANDLE_MAX_LEN * 2),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.into_inner(), [FieldError::new("handle", "is too long")]);
    }
}
