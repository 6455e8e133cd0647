//! Notification policy: turns an eligible alert into what the platform
//! notifier should show.
//!
//! Every delivered alert is treated as life-safety critical. There is no
//! lower tier: each spec rendered here is `Maximum` urgency, full-screen,
//! public, tagged as an alarm and auto-dismissed after the timeout.

use serde::Serialize;

use crate::alert::{AlertCategory, AlertEvent, Locale, Rgb, Urgency, ALERT_LIGHT};

/// Channel for emergency alerts.
pub const ALERTS_CHANNEL_ID: &str = "emergency_alerts";
/// Channel for the persistent "service alive" indicator.
pub const SERVICE_CHANNEL_ID: &str = "guardian_background_service";

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightPattern {
    pub color: Rgb,
    pub on_ms: u32,
    pub off_ms: u32,
}

/// Everything the platform needs to display one notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationSpec {
    pub channel_id: &'static str,
    pub title: String,
    pub body: String,
    pub urgency: Urgency,
    /// `None` for the service indicator.
    pub category: Option<AlertCategory>,
    /// Auto-dismiss after this long. `None` stays until withdrawn.
    pub timeout_ms: Option<u64>,
    pub color: Option<Rgb>,
    pub vibration: Option<Vec<u64>>,
    pub sound: bool,
    pub lights: Option<LightPattern>,
    pub full_screen: bool,
    pub visibility: Visibility,
    /// Platform notification category, e.g. `"alarm"`.
    pub system_category: Option<&'static str>,
    pub ongoing: bool,
    pub auto_cancel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub locale: Locale,
    pub timeout_ms: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

pub fn location_marker(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => "📍 Ubicación incluida",
        Locale::En => "📍 Location included",
    }
}

pub fn anonymous_marker(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => "👤 Reporte anónimo",
        Locale::En => "👤 Anonymous report",
    }
}

/// Description first, then the location marker, then the anonymous marker,
/// one per line.
pub fn compose_body(event: &AlertEvent, locale: Locale) -> String {
    let mut lines: Vec<&str> = Vec::with_capacity(3);
    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(description);
    }
    if event.share_location {
        lines.push(location_marker(locale));
    }
    if event.is_anonymous {
        lines.push(anonymous_marker(locale));
    }
    lines.join("\n")
}

/// Render an alert. No side effects; safe to call any number of times.
pub fn render(event: &AlertEvent, options: &RenderOptions) -> NotificationSpec {
    let profile = event.category.profile();
    NotificationSpec {
        channel_id: ALERTS_CHANNEL_ID,
        title: profile.title(options.locale),
        body: compose_body(event, options.locale),
        urgency: profile.urgency,
        category: Some(event.category),
        timeout_ms: Some(options.timeout_ms),
        color: Some(profile.color),
        vibration: Some(profile.waveform.to_vec()),
        sound: true,
        lights: Some(LightPattern {
            color: ALERT_LIGHT,
            on_ms: 1000,
            off_ms: 1000,
        }),
        full_screen: true,
        visibility: Visibility::Public,
        system_category: Some("alarm"),
        ongoing: false,
        auto_cancel: true,
    }
}

/// The low-key ongoing notification shown while the supervisor runs.
pub fn alive_indicator(locale: Locale) -> NotificationSpec {
    let (title, body) = match locale {
        Locale::Es => ("Guardian Activo", "Escuchando alertas en tu área"),
        Locale::En => ("Guardian Active", "Listening for alerts in your area"),
    };
    NotificationSpec {
        channel_id: SERVICE_CHANNEL_ID,
        title: title.to_string(),
        body: body.to_string(),
        urgency: Urgency::Low,
        category: None,
        timeout_ms: None,
        color: None,
        vibration: None,
        sound: false,
        lights: None,
        full_screen: false,
        visibility: Visibility::Private,
        system_category: Some("service"),
        ongoing: true,
        auto_cancel: false,
    }
}
