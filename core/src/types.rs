//! Records exchanged with the grant and item endpoints.
//!
//! # Design
//! Every response record tolerates missing members: scalars default to zero,
//! objects to `None`, collections to empty, and unknown enum tags map to an
//! `Unknown` variant. Podio adds fields over time and omits nulls freely;
//! neither should break deserialization.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Type of object a grant or reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    App,
    AppField,
    Item,
    Space,
    Org,
    Status,
    Task,
    Comment,
    File,
    Conversation,
    Profile,
    User,
    Mail,
    #[serde(other)]
    Unknown,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::App => "app",
            RefType::AppField => "app_field",
            RefType::Item => "item",
            RefType::Space => "space",
            RefType::Org => "org",
            RefType::Status => "status",
            RefType::Task => "task",
            RefType::Comment => "comment",
            RefType::File => "file",
            RefType::Conversation => "conversation",
            RefType::Profile => "profile",
            RefType::User => "user",
            RefType::Mail => "mail",
            RefType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person or object reference sent to Podio, e.g. the people of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RefType>,
    #[serde(default)]
    pub id: i64,
}

impl Ref {
    /// A reference by bare id; Podio reads it as a user id.
    pub fn new(id: i64) -> Self {
        Self { kind: None, id }
    }

    pub fn typed(kind: RefType, id: i64) -> Self {
        Self {
            kind: Some(kind),
            id,
        }
    }
}

/// What the people of a grant are asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantAction {
    View,
    Comment,
    Rate,
    #[serde(other)]
    Unknown,
}

/// The object a grant applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRef {
    #[serde(rename = "type", default)]
    pub kind: Option<RefType>,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// A user as embedded in grant records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantUser {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub profile_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Who created a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByLine {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Access granted to one person on one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(rename = "ref", default)]
    pub reference: Option<GrantRef>,
    #[serde(default)]
    pub user: Option<GrantUser>,
    #[serde(default)]
    pub action: Option<GrantAction>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, with = "podio_datetime")]
    pub created_on: Option<NaiveDateTime>,
    #[serde(default)]
    pub created_by: Option<ByLine>,
}

/// Response of the create grant call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGrant {
    #[serde(default)]
    pub ref_type: Option<RefType>,
    #[serde(default)]
    pub ref_id: i64,
    /// Ids of the users the object was shared with.
    #[serde(default)]
    pub users: Vec<i64>,
}

/// Body of the create grant call. `None` members are left out.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGrant<'a> {
    pub people: &'a [Ref],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GrantAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantCount {
    #[serde(default)]
    pub count: i64,
}

/// Response of the create item call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedItem {
    #[serde(default)]
    pub item_id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Response of the update item call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRevision {
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Podio timestamps: `"YYYY-MM-DD HH:MM:SS"` in UTC, optional.
pub mod podio_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(stamp) => serializer.serialize_str(&stamp.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.is_empty() => NaiveDateTime::parse_from_str(&raw, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
