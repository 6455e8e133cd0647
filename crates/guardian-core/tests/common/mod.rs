//! Shared harness for supervisor integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use guardian_core::alert::{AlertCategory, AlertRecord};
use guardian_core::{
    Dependencies, Event, LocalIdentity, ManualClock, MemoryFeed, MemoryNotifier, MemoryVibrator,
    StaticIdentity, Supervisor, SupervisorSettings,
};
use tokio::sync::broadcast;

pub struct Harness {
    pub feed: Arc<MemoryFeed>,
    pub notifier: Arc<MemoryNotifier>,
    pub vibrator: Arc<MemoryVibrator>,
    pub identity: Arc<StaticIdentity>,
    pub clock: Arc<ManualClock>,
    pub supervisor: Supervisor,
    pub events: broadcast::Receiver<Event>,
}

impl Harness {
    /// Signed in as `u1` with the default settings.
    pub fn new() -> Self {
        Self::with_settings(SupervisorSettings::default())
    }

    pub fn with_settings(settings: SupervisorSettings) -> Self {
        let feed = Arc::new(MemoryFeed::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let vibrator = Arc::new(MemoryVibrator::new());
        let identity = Arc::new(StaticIdentity::signed_in(
            LocalIdentity::new("u1").with_email("u1@example.com"),
        ));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let deps = Dependencies::new(feed.clone(), identity.clone(), notifier.clone())
            .with_vibrator(vibrator.clone())
            .with_clock(clock.clone());
        let supervisor = Supervisor::new(deps, settings);
        let events = supervisor.subscribe_events();
        Self {
            feed,
            notifier,
            vibrator,
            identity,
            clock,
            supervisor,
            events,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        guardian_core::Clock::now(self.clock.as_ref())
    }

    /// A fresh alert written by someone else.
    pub fn alert(&self, id: &str, category: AlertCategory) -> AlertRecord {
        AlertRecord::new(id)
            .with_category(category)
            .with_author("u2")
            .at(self.now())
    }

    /// Wait for the first event matching `pred`, skipping others.
    pub async fn wait_for(&mut self, pred: impl Fn(&Event) -> bool) -> Event {
        let deadline = Duration::from_secs(2);
        loop {
            match tokio::time::timeout(deadline, self.events.recv()).await {
                Ok(Ok(event)) if pred(&event) => return event,
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(e)) => panic!("event channel closed: {e}"),
                Err(_) => panic!("timed out waiting for event"),
            }
        }
    }

    pub async fn next_alert_outcome(&mut self) -> Event {
        self.wait_for(|e| {
            matches!(
                e,
                Event::AlertDelivered { .. }
                    | Event::AlertSuppressed { .. }
                    | Event::NotifierFailed { .. }
                    | Event::AlertWithheld { .. }
            )
        })
        .await
    }
}
