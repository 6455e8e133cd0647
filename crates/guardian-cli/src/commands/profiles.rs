use clap::Args;
use guardian_core::alert::{AlertCategory, Locale};
use serde_json::json;

#[derive(Args)]
pub struct ProfilesArgs {
    /// Title language (es, en)
    #[arg(long, default_value = "es")]
    locale: Locale,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: ProfilesArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.json {
        let rows: Vec<_> = AlertCategory::ALL
            .iter()
            .map(|category| {
                let profile = category.profile();
                json!({
                    "category": category,
                    "title": profile.title(args.locale),
                    "color": profile.color,
                    "urgency": profile.urgency,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for category in AlertCategory::ALL {
        let profile = category.profile();
        println!(
            "{:<26} {}  {}",
            category.as_str(),
            profile.color.hex(),
            profile.title(args.locale)
        );
    }
    Ok(())
}
