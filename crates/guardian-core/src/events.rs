use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertCategory;
use crate::filter::SuppressReason;
use crate::supervisor::{Input, ServiceState};

/// Every state change and every delivery decision produces an Event.
/// Observers subscribe through the supervisor; nothing depends on them
/// being read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ServiceStarted {
        subscription_id: uuid::Uuid,
        trigger: Input,
        at: DateTime<Utc>,
    },
    ServiceStopped {
        trigger: Input,
        at: DateTime<Utc>,
    },
    /// Killed while running and came back without outside help.
    SelfHealed {
        subscription_id: uuid::Uuid,
        at: DateTime<Utc>,
    },
    RestartFailed {
        trigger: Input,
        error: String,
        state: ServiceState,
        at: DateTime<Utc>,
    },
    AlertDelivered {
        alert_id: String,
        category: AlertCategory,
        notification_id: i32,
        vibrated: bool,
        at: DateTime<Utc>,
    },
    AlertSuppressed {
        alert_id: String,
        reason: SuppressReason,
        at: DateTime<Utc>,
    },
    /// Platform notifier refused an eligible alert. Not retried.
    NotifierFailed {
        alert_id: String,
        error: String,
        at: DateTime<Utc>,
    },
    /// Eligible, but notifications are switched off.
    AlertWithheld {
        alert_id: String,
        category: AlertCategory,
        at: DateTime<Utc>,
    },
    StreamInterrupted {
        error: String,
        at: DateTime<Utc>,
    },
    /// The feed closed a subscription the supervisor never asked to close.
    StreamEnded {
        subscription_id: uuid::Uuid,
        at: DateTime<Utc>,
    },
    ReconciliationRan {
        was_running: bool,
        restarted: bool,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::ServiceStarted { at, .. }
            | Event::ServiceStopped { at, .. }
            | Event::SelfHealed { at, .. }
            | Event::RestartFailed { at, .. }
            | Event::AlertDelivered { at, .. }
            | Event::AlertSuppressed { at, .. }
            | Event::NotifierFailed { at, .. }
            | Event::AlertWithheld { at, .. }
            | Event::StreamInterrupted { at, .. }
            | Event::StreamEnded { at, .. }
            | Event::ReconciliationRan { at, .. } => *at,
        }
    }
}
