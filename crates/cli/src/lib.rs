pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "Relay operator CLI",
    long_about = "Inspect relay configuration, check platform readiness, \
                  and manage webhook subscriptions.",
    after_help = "Examples:\n  relay doctor --json\n  relay config\n  \
                  relay webhooks --target-url https://relay.example.com"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Path to relay.toml (defaults to ./relay.toml or ./config/relay.toml)"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, the access token, and webhook subscriptions")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Replace the agent's webhooks with the relay subscriptions")]
    Webhooks {
        #[arg(long, help = "Public base URL of relay-server (defaults to server.public_url)")]
        target_url: Option<String>,
        #[arg(long, default_value = "relay", help = "Name prefix for created webhooks")]
        name: String,
        #[arg(long, help = "Only list the current webhooks")]
        list: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Doctor { json } => commands::doctor::run(json, config_path),
        Command::Webhooks { target_url, name, list } => {
            commands::webhooks::run(config_path, target_url.as_deref(), &name, list)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
