//! Item, Content and ItemSummary types stored inside a vault.
//!
//! Tags are kept in a `BTreeSet` and field content in a `BTreeMap`, so
//! serializing an unchanged item always yields the same bytes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Longest item name accepted, in bytes.
const MAX_NAME_LEN: usize = 256;

/// What an item holds.
///
/// The engine treats content as an opaque payload; the variants only
/// exist so callers get back exactly the shape they stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Content {
    /// A single text blob (e.g. a note written in an editor).
    Text(String),

    /// Key/value pairs such as `{"ssid": "NET1", "psk": "secret"}`.
    Fields(BTreeMap<String, String>),

    /// Arbitrary bytes, stored base64 in the encrypted payload.
    Bytes(
        #[serde(
            serialize_with = "super::format::base64_encode",
            deserialize_with = "super::format::base64_decode"
        )]
        Vec<u8>,
    ),
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<BTreeMap<String, String>> for Content {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Fields(value)
    }
}

impl From<HashMap<String, String>> for Content {
    fn from(value: HashMap<String, String>) -> Self {
        Self::Fields(value.into_iter().collect())
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Content {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// A named, tagged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub tags: BTreeSet<String>,
    pub content: Content,
}

impl Item {
    /// Build a validated item.
    pub fn new<I, T>(name: &str, tags: I, content: impl Into<Content>) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        validate_name(name)?;
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        for tag in &tags {
            validate_tag(tag)?;
        }
        Ok(Self {
            name: name.to_string(),
            tags,
            content: content.into(),
        })
    }

    /// `true` if this item carries every tag in `wanted`.
    pub fn has_all_tags<'a>(&self, wanted: impl IntoIterator<Item = &'a str>) -> bool {
        wanted.into_iter().all(|t| self.tags.contains(t))
    }

    /// Name and tags only, without the content.
    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Lightweight view of an item (no content).
///
/// Returned by listing operations so callers can display names and tags
/// without handling secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub name: String,
    pub tags: BTreeSet<String>,
}

/// Validate an item name.
///
/// Must be non-empty, at most 256 bytes, and free of control characters.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidName("item name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VaultError::InvalidName(format!(
            "item name cannot exceed {MAX_NAME_LEN} bytes"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(VaultError::InvalidName(format!(
            "item name '{}' contains control characters",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Validate a tag: non-empty, no control characters.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(VaultError::InvalidTag("tag cannot be empty".into()));
    }
    if tag.chars().any(char::is_control) {
        return Err(VaultError::InvalidTag(format!(
            "tag '{}' contains control characters",
            tag.escape_debug()
        )));
    }
    Ok(())
}
