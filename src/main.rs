use anyhow::Context;
use clap::Parser;
use fleet_operator::cli::{self, Cli, Commands};
use fleet_operator::config::AppConfig;
use fleet_operator::logging::{init_logging, init_logging_simple};
use fleet_operator::server::run_server;
use tracing::{error, info};

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.as_ref().unwrap_or(&Commands::Serve) {
        Commands::Serve => {
            let config = load_config(&cli)?;
            let _log_guard = init_logging(&config.logging);

            if let Err(errors) = config.validate() {
                for e in &errors {
                    error!("Invalid configuration: {}", e);
                }
                anyhow::bail!("configuration has {} problem(s)", errors.len());
            }

            info!("Starting fleet operator");
            run_server(&config).await.context("operator server failed")?;
            info!("Fleet operator stopped");
        }
        Commands::CheckConfig => {
            init_logging_simple();
            let config = load_config(&cli)?;
            match config.validate() {
                Ok(()) => println!("Configuration OK ({})", cli.config.display()),
                Err(errors) => {
                    for e in &errors {
                        println!("  - {e}");
                    }
                    anyhow::bail!("configuration has {} problem(s)", errors.len());
                }
            }
        }
        Commands::CompileSigns { file } => {
            init_logging_simple();
            let (config, report) = cli::compile_signs_file(file)
                .with_context(|| format!("failed to compile {}", file.display()))?;
            let output = serde_json::json!({ "config": config, "report": report });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
