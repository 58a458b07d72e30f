//! Identity records and the capability trait the directory is generic over.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// What the loader, snapshot and directory need from a record type.
///
/// Anything deserializable from a record file that can name its id and
/// username can be served. [`User`] is the stock implementation.
pub trait Identity: DeserializeOwned + Send + Sync + 'static {
    /// Primary key; unique within a snapshot.
    fn id(&self) -> &str;

    /// Secondary lookup key.
    fn username(&self) -> &str;

    /// Per-record checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        if self.id().trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        Ok(())
    }
}

/// A user as stored in a record file.
///
/// `password` is carried verbatim; whatever hashing scheme the files use is
/// the consumer's business.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub preferred_language: LanguageTag,
    #[serde(default)]
    pub is_admin: bool,
}

impl Identity for User {
    fn id(&self) -> &str {
        &self.id
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.username.trim().is_empty() {
            return Err(format!("user '{}' has an empty username", self.id));
        }
        Ok(())
    }
}

impl User {
    /// JSON view with the credential blanked, for logs and operator output.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("password".to_string(), serde_json::Value::from("***"));
        }
        value
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("phone", &self.phone)
            .field("phone_verified", &self.phone_verified)
            .field("preferred_language", &self.preferred_language)
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

// ── Language tags ─────────────────────────────────────────────

/// A BCP 47 language tag such as `en`, `de-CH` or `zh-Hant-TW`.
///
/// Only the shape is checked (primary subtag of 2–8 letters, further
/// subtags of 1–8 alphanumerics); registry membership is not. An absent tag
/// is `und`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    pub const UNDETERMINED: &'static str = "und";

    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut subtags = raw.split(['-', '_']);
        let primary = subtags.next().unwrap_or_default();
        if !(2..=8).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("language tag '{}' is not well-formed", raw));
        }
        let mut normalized = primary.to_ascii_lowercase();
        for sub in subtags {
            if !(1..=8).contains(&sub.len()) || !sub.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!("language tag '{}' is not well-formed", raw));
            }
            normalized.push('-');
            normalized.push_str(&normalize_subtag(sub));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_undetermined(&self) -> bool {
        self.0 == Self::UNDETERMINED
    }
}

/// Canonical casing: regions upper, scripts title, everything else lower.
fn normalize_subtag(sub: &str) -> String {
    match sub.len() {
        2 if sub.chars().all(|c| c.is_ascii_alphabetic()) => sub.to_ascii_uppercase(),
        4 if sub.chars().all(|c| c.is_ascii_alphabetic()) => {
            let lower = sub.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => lower,
            }
        }
        _ => sub.to_ascii_lowercase(),
    }
}

impl Default for LanguageTag {
    fn default() -> Self {
        Self(Self::UNDETERMINED.to_string())
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self::default());
        }
        Self::parse(&value)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
