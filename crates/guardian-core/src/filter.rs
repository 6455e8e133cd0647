//! Dedup & eligibility filter.
//!
//! A pure decision over one alert record, the local identity and the
//! current time. Checks run in a fixed order and the first match wins:
//!
//! ```text
//! MissingType -> NoIdentity -> OwnAlert -> AlreadyViewed -> Stale -> Deliver
//! ```
//!
//! Staleness is evaluated against the `now` passed in, which the supervisor
//! reads at delivery time. An alert that was fresh when the feed handed it
//! over can still be refused here.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertEvent, AlertRecord};
use crate::identity::LocalIdentity;

/// Default subscription and staleness window.
pub fn default_window() -> Duration {
    Duration::hours(1)
}

/// Why an alert was not delivered. These are expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// `alertType` missing or outside the known categories.
    MissingType,
    /// Nobody is signed in on this device.
    NoIdentity,
    /// The signed-in user wrote the alert.
    OwnAlert,
    /// The signed-in user already saw the alert.
    AlreadyViewed,
    /// Older than the window at delivery time.
    Stale,
}

impl SuppressReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SuppressReason::MissingType => "missing_type",
            SuppressReason::NoIdentity => "no_identity",
            SuppressReason::OwnAlert => "own_alert",
            SuppressReason::AlreadyViewed => "already_viewed",
            SuppressReason::Stale => "stale",
        }
    }
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    Deliver(AlertEvent),
    Suppress(SuppressReason),
}

impl Eligibility {
    pub fn is_deliver(&self) -> bool {
        matches!(self, Eligibility::Deliver(_))
    }

    pub fn reason(&self) -> Option<SuppressReason> {
        match self {
            Eligibility::Deliver(_) => None,
            Eligibility::Suppress(reason) => Some(*reason),
        }
    }
}

/// Alert ids this process has already handed to the notifier, remembered for
/// one window. The feed is at-least-once and re-sends its whole window as
/// "added" after every resubscribe.
#[derive(Debug, Default, Clone)]
pub struct SeenAlerts {
    seen: HashMap<String, DateTime<Utc>>,
}

impl SeenAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, occurred_at: DateTime<Utc>) {
        self.seen.insert(id.into(), occurred_at);
    }

    /// Forget alerts that have fallen out of the window; the filter refuses
    /// them as stale anyway.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        self.seen.retain(|_, at| now - *at <= window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EligibilityFilter {
    window: Duration,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new(default_window())
    }
}

impl EligibilityFilter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn classify(
        &self,
        record: &AlertRecord,
        identity: Option<&LocalIdentity>,
        now: DateTime<Utc>,
    ) -> Eligibility {
        self.classify_seen(record, identity, &SeenAlerts::default(), now)
    }

    /// Like [`classify`](Self::classify), also refusing ids in `seen` as
    /// already viewed.
    pub fn classify_seen(
        &self,
        record: &AlertRecord,
        identity: Option<&LocalIdentity>,
        seen: &SeenAlerts,
        now: DateTime<Utc>,
    ) -> Eligibility {
        let Some(category) = record.category() else {
            return Eligibility::Suppress(SuppressReason::MissingType);
        };
        let Some(identity) = identity else {
            return Eligibility::Suppress(SuppressReason::NoIdentity);
        };
        if is_own_alert(record, identity) {
            return Eligibility::Suppress(SuppressReason::OwnAlert);
        }
        if record.viewed_by.iter().any(|v| *v == identity.user_id) || seen.contains(&record.id) {
            return Eligibility::Suppress(SuppressReason::AlreadyViewed);
        }
        // No timestamp means freshness can't be shown.
        let Some(occurred_at) = record.timestamp else {
            return Eligibility::Suppress(SuppressReason::Stale);
        };
        if now - occurred_at > self.window {
            return Eligibility::Suppress(SuppressReason::Stale);
        }
        Eligibility::Deliver(AlertEvent::from_record(record, category, occurred_at))
    }
}

fn is_own_alert(record: &AlertRecord, identity: &LocalIdentity) -> bool {
    if record.user_id.as_deref() == Some(identity.user_id.as_str()) {
        return true;
    }
    matches!(
        (record.user_email.as_deref(), identity.email.as_deref()),
        (Some(author), Some(mine)) if author == mine
    )
}

/// Classify with the default one-hour window.
pub fn classify(
    record: &AlertRecord,
    identity: Option<&LocalIdentity>,
    now: DateTime<Utc>,
) -> Eligibility {
    EligibilityFilter::default().classify(record, identity, now)
}
