mod cli;
mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use commands::Session;
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (AUTHGATE__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(&cli);

    logging::init(&config.logging, cli.verbose)?;

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Command::Status) {
        Command::Check => commands::check(&config),
        Command::Status => {
            commands::status(&Session::open(&config)?);
            Ok(())
        }
        Command::Login { email, password } => {
            commands::login(&Session::open(&config)?, &email, &password).await
        }
        Command::Register {
            name,
            email,
            password,
        } => commands::register(&Session::open(&config)?, &name, &email, &password).await,
        Command::Logout => {
            commands::logout(&Session::open(&config)?).await;
            Ok(())
        }
        Command::Whoami => commands::whoami(&Session::open(&config)?).await,
        Command::Get { path } => commands::get(&Session::open(&config)?, &path).await,
    }
}
