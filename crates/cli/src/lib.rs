pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use slashbot_core::config::TransportMode;

use crate::commands::doctor::DoctorOptions;

#[derive(Debug, Parser)]
#[command(
    name = "slashbot",
    about = "Slashbot operator CLI",
    long_about = "Check slashbot configuration and Slack credentials before starting the server.",
    after_help = "Examples:\n  slashbot doctor --json\n  slashbot doctor --transport webhook --online"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config and Slack token readiness, optionally online")]
    Doctor {
        #[arg(long, default_value = "socket", help = "Transport whose credentials are checked")]
        transport: TransportMode,
        #[arg(long, help = "Path to a slashbot.toml config file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Call auth.test with the bot token")]
        online: bool,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { transport, config, online, json } => {
            commands::doctor::run(&DoctorOptions { transport, config_path: config, online }, json)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
