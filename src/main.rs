use anyhow::Context;
use clap::Parser;
use msgload::cli::{check, run, CheckCommand, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            run::execute(&args).await.context("load run failed")?;
        }
        Commands::Check(CheckCommand::Config(arg)) => {
            check::execute_config(&arg.config).context("configuration check failed")?;
        }
    }
    Ok(())
}
