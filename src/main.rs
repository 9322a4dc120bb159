//! Vigil CLI entry point.

use clap::Parser;

use vigil::cli::{commands, handle_error, Cli, Commands};
use vigil::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Trigger { entry, account } => commands::trigger::execute(entry, account, &config, cli.json).await,
        Commands::Run => commands::run::execute(&config).await,
        Commands::Config(command) => commands::config::execute(command, &config, cli.json).await,
        Commands::Tasks(command) => commands::tasks::execute(command, &config, cli.json).await,
        Commands::Workflow(command) => commands::workflow::execute(command, &config, cli.json).await,
        Commands::Migrate => commands::migrate::execute(&config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
