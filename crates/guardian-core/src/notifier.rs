//! Platform notifier seam and alert dispatch.
//!
//! Channels are declared on every start. Re-declaring a channel with the same
//! parameters is a no-op on the platform side. A channel that was already
//! installed keeps its original importance and sound even if the declaration
//! changes later; that is platform behavior and is left alone here.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::alert::{AlertEvent, Locale, Rgb, Urgency, ALERT_LIGHT, EMERGENCY_WAVEFORM};
use crate::clock::now_ms;
use crate::error::{CoreError, Result};
use crate::policy::{self, NotificationSpec, RenderOptions, ALERTS_CHANNEL_ID, SERVICE_CHANNEL_ID};

/// Fixed id of the persistent "service alive" notification.
pub const INDICATOR_ID: i32 = 1001;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub urgency: Urgency,
    pub show_badge: bool,
    pub lights: Option<Rgb>,
    pub vibration: Option<Vec<u64>>,
    pub sound: bool,
}

impl ChannelSpec {
    pub fn service(locale: Locale) -> Self {
        Self {
            id: SERVICE_CHANNEL_ID,
            name: "Guardian Background Service",
            description: match locale {
                Locale::Es => "Mantiene Guardian escuchando alertas en segundo plano",
                Locale::En => "Keeps Guardian listening for alerts in the background",
            },
            urgency: Urgency::Low,
            show_badge: false,
            lights: None,
            vibration: None,
            sound: false,
        }
    }

    pub fn alerts(locale: Locale) -> Self {
        Self {
            id: ALERTS_CHANNEL_ID,
            name: "Emergency Alerts",
            description: match locale {
                Locale::Es => "Notificaciones de alertas de emergencia",
                Locale::En => "Emergency alert notifications",
            },
            urgency: Urgency::Maximum,
            show_badge: true,
            lights: Some(ALERT_LIGHT),
            vibration: Some(EMERGENCY_WAVEFORM.to_vec()),
            sound: true,
        }
    }
}

/// A rendered notification as handed to the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: i32,
    pub spec: NotificationSpec,
}

static LAST_ID: AtomicI32 = AtomicI32::new(0);

/// Time-derived id, bumped past the previous one so two alerts in the same
/// millisecond don't replace each other.
pub fn next_notification_id() -> i32 {
    let candidate = (now_ms() % i32::MAX as u64) as i32;
    let bump = |last: i32| {
        if candidate > last {
            candidate
        } else {
            last.checked_add(1).unwrap_or(1)
        }
    };
    match LAST_ID.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(bump(last))) {
        Ok(previous) | Err(previous) => bump(previous),
    }
}

impl NotificationRecord {
    pub fn new(spec: NotificationSpec) -> Self {
        Self {
            id: next_notification_id(),
            spec,
        }
    }

    pub fn indicator(locale: Locale) -> Self {
        Self {
            id: INDICATOR_ID,
            spec: policy::alive_indicator(locale),
        }
    }
}

/// Platform notification calls. Failures come back as
/// [`CoreError::NotifierUnavailable`].
pub trait Notifier: Send + Sync {
    fn declare_channel(&self, channel: &ChannelSpec) -> Result<()>;

    fn post(&self, record: &NotificationRecord) -> Result<()>;

    fn withdraw(&self, id: i32) -> Result<()>;
}

/// Notifier that writes every call to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn declare_channel(&self, channel: &ChannelSpec) -> Result<()> {
        tracing::debug!(channel = channel.id, urgency = ?channel.urgency, "declare channel");
        Ok(())
    }

    fn post(&self, record: &NotificationRecord) -> Result<()> {
        tracing::info!(
            id = record.id,
            channel = record.spec.channel_id,
            urgency = ?record.spec.urgency,
            title = %record.spec.title,
            body = %record.spec.body,
            "notification posted"
        );
        Ok(())
    }

    fn withdraw(&self, id: i32) -> Result<()> {
        tracing::debug!(id, "notification withdrawn");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryNotifierState {
    channels: Vec<ChannelSpec>,
    posted: Vec<NotificationRecord>,
    withdrawn: Vec<i32>,
    fail_posts: bool,
}

/// In-memory notifier that records calls.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    state: Mutex<MemoryNotifierState>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryNotifierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make alert posts fail. The service indicator keeps working.
    pub fn fail_posts(&self, fail: bool) {
        self.lock().fail_posts = fail;
    }

    pub fn channels(&self) -> Vec<ChannelSpec> {
        self.lock().channels.clone()
    }

    pub fn posted(&self) -> Vec<NotificationRecord> {
        self.lock().posted.clone()
    }

    /// Posted emergency alerts, without the service indicator.
    pub fn alerts(&self) -> Vec<NotificationRecord> {
        self.lock()
            .posted
            .iter()
            .filter(|r| r.spec.channel_id == ALERTS_CHANNEL_ID)
            .cloned()
            .collect()
    }

    pub fn withdrawn(&self) -> Vec<i32> {
        self.lock().withdrawn.clone()
    }

    pub fn indicator_visible(&self) -> bool {
        let state = self.lock();
        let posted = state.posted.iter().filter(|r| r.id == INDICATOR_ID).count();
        let withdrawn = state.withdrawn.iter().filter(|id| **id == INDICATOR_ID).count();
        posted > withdrawn
    }
}

impl Notifier for MemoryNotifier {
    fn declare_channel(&self, channel: &ChannelSpec) -> Result<()> {
        let mut state = self.lock();
        if !state.channels.iter().any(|c| c.id == channel.id) {
            state.channels.push(channel.clone());
        }
        Ok(())
    }

    fn post(&self, record: &NotificationRecord) -> Result<()> {
        let mut state = self.lock();
        if state.fail_posts && record.id != INDICATOR_ID {
            return Err(CoreError::notifier_unavailable("notifications disabled"));
        }
        state.posted.push(record.clone());
        Ok(())
    }

    fn withdraw(&self, id: i32) -> Result<()> {
        self.lock().withdrawn.push(id);
        Ok(())
    }
}

/// Renders eligible alerts and posts them. At most once per call.
#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    options: RenderOptions,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, options: RenderOptions) -> Self {
        Self { notifier, options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn dispatch(&self, event: &AlertEvent) -> Result<NotificationRecord> {
        let record = NotificationRecord::new(policy::render(event, &self.options));
        self.notifier.post(&record).map_err(|err| match err {
            unavailable @ CoreError::NotifierUnavailable { .. } => unavailable,
            other => CoreError::notifier_unavailable(other.to_string()),
        })?;
        Ok(record)
    }
}
