pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "echoshop",
    about = "EchoShop recommendations operator CLI",
    long_about = "Apply migrations, load the demo catalog, inspect configuration, and preview recommendations for a shopper.",
    after_help = "Examples:\n  echoshop migrate\n  echoshop seed\n  echoshop recommend --user user-demo --limit 5\n  echoshop doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load and verify the deterministic demo catalog")]
    Seed,
    #[command(about = "Print ranked recommendations for one shopper")]
    Recommend {
        #[arg(long, help = "Shopper id to recommend for")]
        user: String,
        #[arg(long, help = "Number of products to return (defaults to recommendations.default_limit)")]
        limit: Option<usize>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Recommend { user, limit } => commands::recommend::run(&user, limit),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
