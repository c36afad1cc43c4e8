//! Login and registration inputs. Never persisted.

use std::fmt;

use thiserror::Error;

use crate::NonEmptyString;
use crate::session::Role;

/// Lowest [`password_strength`] accepted at sign-up.
pub const MIN_PASSWORD_STRENGTH: u8 = 60;

/// Score a password from 0 to 100.
///
/// Length earns 20 at 8 characters and 10 more at 12. Each character class
/// earns its share: lowercase 15, uppercase 15, digit 20, anything else 20.
#[must_use]
pub fn password_strength(password: &str) -> u8 {
    let length = password.chars().count();
    let mut score = 0;
    if length >= 8 {
        score += 20;
    }
    if length >= 12 {
        score += 10;
    }
    if password.chars().any(|c| c.is_ascii_lowercase()) {
        score += 15;
    }
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        score += 15;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 20;
    }
    if password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        score += 20;
    }
    score.min(100)
}

/// Why a sign-up form was refused before it reached the backend.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Enter your full name")]
    MissingName,
    #[error("Use a stronger password")]
    WeakPassword,
}

/// Identifier + secret pair for a login exchange.
///
/// `Debug` redacts the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub identifier: NonEmptyString,
    secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier.as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credential {
    #[must_use]
    pub fn new(identifier: NonEmptyString, secret: impl Into<String>) -> Self {
        Self {
            identifier,
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

/// Everything a sign-up form collects.
///
/// Role-specific fields are carried verbatim; [`RegistrationProfile::role_fields`]
/// drops the ones that do not apply to the chosen role instead of rejecting them.
/// [`RegistrationProfile::validate`] is the local check run before any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationProfile {
    pub credential: Credential,
    pub display_name: String,
    pub role: Role,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub grade_level: Option<u32>,
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub child_name: Option<String>,
    pub invite_code: Option<String>,
}

/// The subset of role-specific fields meaningful for a role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFields {
    pub grade_level: Option<u32>,
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub child_name: Option<String>,
    pub invite_code: Option<String>,
}

impl RegistrationProfile {
    #[must_use]
    pub fn new(credential: Credential, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            credential,
            display_name: display_name.into(),
            role,
            email: None,
            phone: None,
            grade_level: None,
            class_name: None,
            subject: None,
            child_name: None,
            invite_code: None,
        }
    }

    /// Name first, then password strength.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.display_name.trim().is_empty() {
            return Err(ProfileError::MissingName);
        }
        if password_strength(self.credential.expose_secret()) < MIN_PASSWORD_STRENGTH {
            return Err(ProfileError::WeakPassword);
        }
        Ok(())
    }

    /// Contact fields with blank values collapsed to `None`.
    #[must_use]
    pub fn contact(&self) -> (Option<&str>, Option<&str>) {
        (non_blank(self.email.as_ref()), non_blank(self.phone.as_ref()))
    }

    #[must_use]
    pub fn role_fields(&self) -> RoleFields {
        let mut fields = RoleFields::default();
        match self.role.as_str() {
            "student" => {
                fields.grade_level = self.grade_level;
                fields.class_name = non_blank(self.class_name.as_ref()).map(str::to_string);
            }
            "teacher" => {
                fields.subject = non_blank(self.subject.as_ref()).map(str::to_string);
            }
            "parent" => {
                fields.child_name = non_blank(self.child_name.as_ref()).map(str::to_string);
            }
            Role::ADMIN => {
                fields.invite_code = non_blank(self.invite_code.as_ref()).map(str::to_string);
            }
            _ => {}
        }
        fields
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}
