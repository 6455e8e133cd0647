pub mod classify;
pub mod config;
pub mod profiles;
pub mod run;

use guardian_core::alert::AlertRecord;
use guardian_core::LocalIdentity;

/// Parse an alert document given inline or as `@path`.
pub fn parse_record(input: &str) -> Result<AlertRecord, Box<dyn std::error::Error>> {
    let json = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => input.to_string(),
    };
    Ok(serde_json::from_str(&json)?)
}

pub fn identity(user_id: Option<String>, email: Option<String>) -> Option<LocalIdentity> {
    user_id.map(|id| {
        let identity = LocalIdentity::new(id);
        match email {
            Some(email) => identity.with_email(email),
            None => identity,
        }
    })
}
