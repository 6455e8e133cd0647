use chrono::{DateTime, Utc};
use clap::Args;
use guardian_core::alert::{AlertEvent, Locale};
use guardian_core::policy::{render, RenderOptions, DEFAULT_TIMEOUT_MS};
use guardian_core::{Eligibility, EligibilityFilter};
use serde_json::json;

use super::{identity, parse_record};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Alert document as JSON, or @path to a file
    #[arg(long)]
    record: String,
    /// Signed-in user id; omit to classify as signed out
    #[arg(long)]
    user_id: Option<String>,
    /// Signed-in user email
    #[arg(long)]
    email: Option<String>,
    /// Evaluate at this instant (RFC 3339) instead of now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    /// Staleness window in minutes
    #[arg(long, default_value = "60")]
    window_minutes: u32,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Alert document as JSON, or @path to a file
    #[arg(long)]
    record: String,
    /// Notification language (es, en)
    #[arg(long, default_value = "es")]
    locale: Locale,
    /// Auto-dismiss timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,
}

pub fn run_classify(args: ClassifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let record = parse_record(&args.record)?;
    let identity = identity(args.user_id, args.email);
    let now = args.at.unwrap_or_else(Utc::now);
    let filter = EligibilityFilter::new(chrono::Duration::minutes(i64::from(args.window_minutes)));

    let out = match filter.classify(&record, identity.as_ref(), now) {
        Eligibility::Deliver(event) => json!({
            "decision": "deliver",
            "event": event,
        }),
        Eligibility::Suppress(reason) => json!({
            "decision": "suppress",
            "alert_id": record.id,
            "reason": reason,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub fn run_render(args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let record = parse_record(&args.record)?;
    let category = record.category().ok_or_else(|| {
        format!(
            "alert {} has no known alertType ({})",
            record.id,
            record.alert_type.as_deref().unwrap_or("missing")
        )
    })?;
    let event = AlertEvent::from_record(&record, category, record.timestamp.unwrap_or_else(Utc::now));
    let options = RenderOptions {
        locale: args.locale,
        timeout_ms: args.timeout_ms,
    };
    println!("{}", serde_json::to_string_pretty(&render(&event, &options))?);
    Ok(())
}
