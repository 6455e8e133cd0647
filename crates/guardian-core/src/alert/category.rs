//! Alert categories and their notification profiles.
//!
//! [`PROFILES`] is the only place a category's title, icon, color and
//! vibration waveform are defined. Rendering, channel declaration and the
//! CLI all read from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

/// Closed set of alert categories carried by the feed's `alertType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCategory {
    StreetEscort,
    Robbery,
    Unsafety,
    PhysicalRisk,
    PublicServicesEmergency,
    VialEmergency,
    Assistance,
    Fire,
    GeneralEmergency,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 9] = [
        AlertCategory::StreetEscort,
        AlertCategory::Robbery,
        AlertCategory::Unsafety,
        AlertCategory::PhysicalRisk,
        AlertCategory::PublicServicesEmergency,
        AlertCategory::VialEmergency,
        AlertCategory::Assistance,
        AlertCategory::Fire,
        AlertCategory::GeneralEmergency,
    ];

    /// Canonical wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::StreetEscort => "STREET_ESCORT",
            AlertCategory::Robbery => "ROBBERY",
            AlertCategory::Unsafety => "UNSAFETY",
            AlertCategory::PhysicalRisk => "PHYSICAL_RISK",
            AlertCategory::PublicServicesEmergency => "PUBLIC_SERVICES_EMERGENCY",
            AlertCategory::VialEmergency => "VIAL_EMERGENCY",
            AlertCategory::Assistance => "ASSISTANCE",
            AlertCategory::Fire => "FIRE",
            AlertCategory::GeneralEmergency => "GENERAL_EMERGENCY",
        }
    }

    pub fn profile(self) -> &'static NotificationProfile {
        &PROFILES[self as usize]
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown alert category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for AlertCategory {
    type Err = UnknownCategory;

    /// Accepts the canonical names as well as the space-separated form the
    /// alert authoring client writes (`"STREET ESCORT"`), and the bare
    /// `"EMERGENCY"` for the general category.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        if normalized == "EMERGENCY" {
            return Ok(AlertCategory::GeneralEmergency);
        }
        AlertCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Display language for titles and body markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "es" => Ok(Locale::Es),
            "en" => Ok(Locale::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// How intrusive a notification is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Min,
    Low,
    Default,
    High,
    /// Full-screen, sound, vibration and light.
    Maximum,
}

/// 24-bit RGB color, serialized as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u32);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:06X}", self.0 & 0x00FF_FFFF)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

/// Off/on timings in milliseconds, starting with the delay before the
/// first pulse.
pub const EMERGENCY_WAVEFORM: [u64; 10] = [0, 1000, 500, 1000, 500, 1000, 500, 1000, 500, 1000];

/// Light color of the emergency channel.
pub const ALERT_LIGHT: Rgb = Rgb(0xD32F2F);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationProfile {
    pub category: AlertCategory,
    pub icon: &'static str,
    pub title_es: &'static str,
    pub title_en: &'static str,
    pub color: Rgb,
    pub waveform: &'static [u64],
    pub urgency: Urgency,
}

impl NotificationProfile {
    /// Icon-prefixed title in the requested language.
    pub fn title(&self, locale: Locale) -> String {
        let text = match locale {
            Locale::Es => self.title_es,
            Locale::En => self.title_en,
        };
        format!("{} {}", self.icon, text)
    }
}

/// Indexed by `AlertCategory as usize`.
pub static PROFILES: [NotificationProfile; 9] = [
    NotificationProfile {
        category: AlertCategory::StreetEscort,
        icon: "👥",
        title_es: "Acompañamiento Solicitado",
        title_en: "Street Escort Requested",
        color: Rgb(0x0000FF),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::Robbery,
        icon: "🚨",
        title_es: "Robo Reportado",
        title_en: "Robbery Reported",
        color: Rgb(0xFF0000),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::Unsafety,
        icon: "⚠️",
        title_es: "Zona Insegura",
        title_en: "Unsafe Area",
        color: Rgb(0xFF9800),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::PhysicalRisk,
        icon: "🚨",
        title_es: "Riesgo Físico",
        title_en: "Physical Risk",
        color: Rgb(0x9C27B0),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::PublicServicesEmergency,
        icon: "🏗️",
        title_es: "Emergencia Servicios Públicos",
        title_en: "Public Services Emergency",
        color: Rgb(0xFFC107),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::VialEmergency,
        icon: "🚦",
        title_es: "Emergencia Vial",
        title_en: "Traffic Emergency",
        color: Rgb(0x00BCD4),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::Assistance,
        icon: "🆘",
        title_es: "Asistencia Necesaria",
        title_en: "Assistance Needed",
        color: Rgb(0x4CAF50),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::Fire,
        icon: "🔥",
        title_es: "Incendio Reportado",
        title_en: "Fire Reported",
        color: Rgb(0xF44336),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
    NotificationProfile {
        category: AlertCategory::GeneralEmergency,
        icon: "🚨",
        title_es: "Emergencia General",
        title_en: "General Emergency",
        color: Rgb(0xE91E63),
        waveform: &EMERGENCY_WAVEFORM,
        urgency: Urgency::Maximum,
    },
];
