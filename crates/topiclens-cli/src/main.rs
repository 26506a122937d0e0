mod run;
mod runs;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::run::RunArgs;

#[derive(Debug, Parser)]
#[command(name = "topiclens")]
#[command(about = "Reddit topic clustering and content brief pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute pipeline stages under a new run
    Run(RunArgs),
    /// Inspect and maintain pipeline runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum RunsCommands {
    /// Show the most recent pipeline runs
    List {
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Mark running runs without a recent heartbeat as failed
    Reap,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("topiclens: no command given; see --help");
        return Ok(());
    };

    let config = topiclens_core::load_app_config().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;

    let pool_config = topiclens_db::PoolConfig::from_app_config(&config);
    let pool = topiclens_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")?;

    match command {
        Commands::Run(args) => run::run_pipeline(&pool, &config, &args).await,
        Commands::Runs {
            command: RunsCommands::List { limit },
        } => runs::list_runs(&pool, limit).await,
        Commands::Runs {
            command: RunsCommands::Reap,
        } => runs::reap_runs(&pool, &config).await,
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            topiclens_db::ping(&pool).await?;
            println!("database ok");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests;
