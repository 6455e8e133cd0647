mod category;
mod record;

pub use category::{
    AlertCategory, Locale, NotificationProfile, Rgb, UnknownCategory, Urgency, ALERT_LIGHT,
    EMERGENCY_WAVEFORM, PROFILES,
};
pub use record::{AlertEvent, AlertRecord};
