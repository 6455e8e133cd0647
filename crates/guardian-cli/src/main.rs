use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "guardian", version, about = "Guardian alert supervisor CLI")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines alert feed through a live supervisor
    Run(commands::run::RunArgs),
    /// Decide whether an alert would be delivered
    Classify(commands::classify::ClassifyArgs),
    /// Render the notification an alert would produce
    Render(commands::classify::RenderArgs),
    /// List the category notification profiles
    Profiles(commands::profiles::ProfilesArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Classify(args) => commands::classify::run_classify(args),
        Commands::Render(args) => commands::classify::run_render(args),
        Commands::Profiles(args) => commands::profiles::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
