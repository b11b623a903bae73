//! forge - bakes conda packages from Rust recipes

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use forge_cli::cmd;
use forge_cli::{Cli, Commands};
use forge_core::{ForgeConfig, Mode};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = ForgeConfig::from_env();

    // The engine calls back into a staged copy of this binary
    if let Mode::Execute(exec) = Mode::detect(&args).unwrap_or_else(|e| e.exit()) {
        return cmd::execute::execute(&exec, config).await;
    }

    let cli = Cli::parse_from(args);
    match cli.command {
        Commands::Bake(args) => cmd::bake::bake(args, &config).await,
        Commands::Render {
            recipe,
            version,
            platform,
            skip_schema,
        } => cmd::render::render(&recipe, version.as_deref(), platform, skip_schema, &config).await,
        Commands::Platforms { recipe, version } => {
            cmd::render::platforms(&recipe, version.as_deref(), &config).await
        }
        Commands::Delete {
            platform,
            filename,
            channel,
        } => cmd::delete::delete(platform, &filename, channel.as_deref(), &config).await,
        Commands::List => {
            cmd::list();
            Ok(())
        }
    }
}
