//! Entity types and the record shapes the client decodes.

use crate::error::TpError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_types {
    ($($variant:ident),+ $(,)?) => {
        /// A Target Process entity type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum EntityType {
            $($variant),+
        }

        impl EntityType {
            /// Every built-in entity type, in canonical order.
            pub const ALL: &'static [EntityType] = &[$(EntityType::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EntityType::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

entity_types!(
    UserStory,
    Bug,
    Task,
    Feature,
    Epic,
    PortfolioEpic,
    Solution,
    Request,
    Impediment,
    TestCase,
    TestPlan,
    Project,
    Team,
    Iteration,
    TeamIteration,
    Release,
    Program,
);

impl EntityType {
    /// REST collection name. Upstream routes every type as `<Name>s` (e.g. `UserStorys`).
    #[must_use]
    pub fn plural(self) -> String {
        format!("{}s", self.as_str())
    }

    /// Built-in type names, used when metadata discovery is unavailable.
    #[must_use]
    pub fn static_names() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = TpError;

    /// Case-insensitive; yields the canonical spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TpError::InvalidEntityType(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "Id", default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(rename = "FirstName", default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(rename = "LastName", default, deserialize_with = "null_as_default")]
    pub last_name: String,
}

/// Reference to another record (`General`, `Project`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "Id", default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "ResourceType", default, deserialize_with = "null_as_default")]
    pub resource_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "Id", default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(rename = "Description", default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "CreateDate", default, deserialize_with = "null_as_default")]
    pub create_date: String,
    #[serde(rename = "IsPrivate", default, deserialize_with = "null_as_default")]
    pub is_private: bool,
    #[serde(rename = "Owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
    #[serde(rename = "General", default, skip_serializing_if = "Option::is_none")]
    pub general: Option<EntityRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "Id", default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(rename = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Date", default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(rename = "MimeType", default)]
    pub mime_type: Option<String>,
    #[serde(rename = "Size", default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(rename = "Uri", default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(rename = "ThumbnailUri", default)]
    pub thumbnail_uri: Option<String>,
    #[serde(rename = "UniqueFileName", default, deserialize_with = "null_as_default")]
    pub unique_file_name: String,
    #[serde(rename = "Owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
    #[serde(rename = "General", default, skip_serializing_if = "Option::is_none")]
    pub general: Option<EntityRef>,
}

/// Explicit `null` decodes the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Collection envelope returned by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPage {
    #[serde(rename = "Items", default, deserialize_with = "null_as_default")]
    pub items: Vec<Map<String, Value>>,
    #[serde(rename = "Next", default)]
    pub next: Option<String>,
}

impl ApiPage {
    /// Decode every item into `T`, skipping items that do not fit the shape.
    #[must_use]
    pub fn decode_items<T: serde::de::DeserializeOwned>(self) -> Vec<T> {
        self.items
            .into_iter()
            .filter_map(|item| serde_json::from_value(Value::Object(item)).ok())
            .collect()
    }
}
