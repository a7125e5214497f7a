use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{Cursor, ReviewId, SettingsId, WalletId};

/// Treats an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A `next_cursor` of `null`, `""` or `0` all mean "no further page".
fn optional_cursor<'de, D>(deserializer: D) -> Result<Option<Cursor>, D::Error>
where
    D: Deserializer<'de>,
{
    let cursor = Option::<Cursor>::deserialize(deserializer)?;
    Ok(cursor.filter(|cursor| {
        let raw = cursor.as_str().trim();
        !raw.is_empty() && raw != "0"
    }))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: ReviewId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings_id: SettingsId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Raw units: hundredths of a star, doubled (`1000` is five stars).
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Unix seconds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
}

impl ReviewRecord {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }
}

/// One page of `GET /{settings_id}/{tag}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeysetPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<ReviewRecord>,
    #[serde(default, deserialize_with = "optional_cursor")]
    pub next_cursor: Option<Cursor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_count: u64,
    /// Raw rating accumulator for the whole tag, same units as [`ReviewRecord::rating`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PanelSettings {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: SettingsId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment_word_limit: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

impl PanelSettings {
    pub fn first_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .map(|tag| tag.as_str())
            .find(|tag| !tag.trim().is_empty())
    }
}

/// Aggregate for a single tag from `GET /tags/{settings_id}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avg_rating: f64,
}
