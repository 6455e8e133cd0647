//! Alert documents: the wire form read off the feed and the typed event
//! built from it once its category parses.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::category::AlertCategory;

/// An alert document exactly as the feed delivers it.
///
/// Field names follow the `alerts` collection. Everything except `id` is
/// optional on the wire; interpretation is left to the eligibility filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub share_location: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub viewed_by: Vec<String>,
    /// RFC 3339 string or epoch milliseconds on the wire.
    #[serde(default, deserialize_with = "de_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, alert_type: impl Into<String>) -> Self {
        self.alert_type = Some(alert_type.into());
        self
    }

    pub fn with_category(self, category: AlertCategory) -> Self {
        self.with_type(category.as_str())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_author_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn viewed_by(mut self, user_id: impl Into<String>) -> Self {
        self.viewed_by.push(user_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn anonymous(mut self, yes: bool) -> Self {
        self.is_anonymous = yes;
        self
    }

    pub fn sharing_location(mut self, yes: bool) -> Self {
        self.share_location = yes;
        self
    }

    /// The parsed category, if `alertType` is present and known.
    pub fn category(&self) -> Option<AlertCategory> {
        self.alert_type.as_deref()?.parse().ok()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Millis(i64),
    Text(DateTime<Utc>),
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<TimestampRepr>::deserialize(deserializer)?;
    Ok(match repr {
        Some(TimestampRepr::Millis(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(TimestampRepr::Text(at)) => Some(at),
        None => None,
    })
}

/// A categorized alert. Immutable once built; identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub id: String,
    pub category: AlertCategory,
    pub description: Option<String>,
    pub is_anonymous: bool,
    pub share_location: bool,
    pub author_id: Option<String>,
    pub author_handle: Option<String>,
    pub viewed_by: BTreeSet<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn from_record(
        record: &AlertRecord,
        category: AlertCategory,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            category,
            description: record.description.clone(),
            is_anonymous: record.is_anonymous,
            share_location: record.share_location,
            author_id: record.user_id.clone(),
            author_handle: record.user_email.clone(),
            viewed_by: record.viewed_by.iter().cloned().collect(),
            occurred_at,
        }
    }
}
