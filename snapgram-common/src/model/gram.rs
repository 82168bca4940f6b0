use crate::model::{
    Id, ModelValidationError,
    comment::Comment,
    user::{User, UserMarker},
    validation::{BLANK, FieldError, ValidationErrors, Validator},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const DEFAULT_PICTURE_NAME: &str = "picture";
pub const DEFAULT_PICTURE_CONTENT_TYPE: &str = "application/octet-stream";
pub const NOT_AN_IMAGE: &str = "must be an image";

/// Whether a picture with this content type may be served back as-is.
///
/// SVG is refused since browsers run scripts embedded in it.
#[must_use]
pub fn is_image_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty() && !subtype.starts_with("svg"))
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GramMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Gram {
    pub id: Id<GramMarker>,
    pub owner: User,
    pub message: String,
    pub picture: Picture,
}

impl Gram {
    #[must_use]
    pub fn is_owned_by(&self, user: Id<UserMarker>) -> bool {
        self.owner.id == user
    }
}

/// A gram together with its comments, oldest comment first.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct GramDetails {
    pub gram: Gram,
    pub comments: Vec<Comment>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Picture {
    pub key: PictureKey,
    pub content_type: String,
}

impl Picture {
    /// The content type to serve, falling back to an opaque one for anything
    /// that is not an image.
    #[must_use]
    pub fn served_content_type(&self) -> &str {
        if is_image_content_type(&self.content_type) {
            &self.content_type
        } else {
            DEFAULT_PICTURE_CONTENT_TYPE
        }
    }
}

/// Object store key of an uploaded picture.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PictureKey(String);

impl PictureKey {
    /// Builds `pictures/<owner>/<nonce>/<file name>`, keeping only characters
    /// that are safe in a path segment.
    #[must_use]
    pub fn for_upload(owner: Id<UserMarker>, nonce: u64, file_name: Option<&str>) -> Self {
        let file_name = file_name
            .map(sanitize_file_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_PICTURE_NAME.to_owned());

        Self(format!("pictures/{owner}/{nonce:016x}/{file_name}"))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

fn sanitize_file_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let name: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    name.trim_start_matches('.').to_owned()
}

impl TryFrom<String> for PictureKey {
    type Error = ModelValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let valid = !value.is_empty()
            && !value.starts_with('/')
            && value.split('/').all(|part| !part.is_empty() && part != "..");

        if valid {
            Ok(Self(value))
        } else {
            Err(ModelValidationError::PictureKey(value))
        }
    }
}

impl From<PictureKey> for String {
    fn from(value: PictureKey) -> Self {
        value.0
    }
}

impl Display for PictureKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A file received with a gram submission.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PictureUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl PictureUpload {
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or(DEFAULT_PICTURE_CONTENT_TYPE)
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        is_image_content_type(self.content_type())
    }
}

/// Fields of the new-gram form as submitted.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct GramSubmission {
    pub message: Option<String>,
    pub picture: Option<PictureUpload>,
}

/// A submission that passed validation.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct ValidGramSubmission {
    pub message: String,
    pub picture: PictureUpload,
}

impl GramSubmission {
    pub fn validate(self) -> Result<ValidGramSubmission, ValidationErrors> {
        let picture = self
            .picture
            .as_ref()
            .filter(|picture| !picture.data.is_empty());

        Validator::new()
            .presence("message", self.message.as_deref())
            .check("picture", picture.is_some(), BLANK)
            .check(
                "picture",
                picture.is_none_or(PictureUpload::is_image),
                NOT_AN_IMAGE,
            )
            .finish()?;

        match (self.message, self.picture) {
            (Some(message), Some(picture)) => Ok(ValidGramSubmission { message, picture }),
            _ => Err(FieldError::new("picture", BLANK).into()),
        }
    }
}

/// Row to insert once a submission was validated and its picture stored.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateGram {
    pub owner: Id<UserMarker>,
    pub message: String,
    pub picture: Picture,
}

/// Body of an edit request.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct GramEdit {
    #[serde(default)]
    pub message: String,
}

impl GramEdit {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        Validator::new()
            .presence("message", Some(&self.message))
            .finish()
    }
}

/// Context for rendering the new and edit forms.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct GramForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gram_id: Option<Id<GramMarker>>,
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl GramForm {
    /// The form to show again after a failed submission.
    #[must_use]
    pub fn rejected(
        gram_id: Option<Id<GramMarker>>,
        message: String,
        errors: ValidationErrors,
    ) -> Self {
        Self {
            gram_id,
            message,
            errors: errors.into_inner(),
        }
    }

    #[must_use]
    pub fn edit(gram: &Gram) -> Self {
        Self {
            gram_id: Some(gram.id),
            message: gram.message.clone(),
            errors: Vec::new(),
        }
    }
}
