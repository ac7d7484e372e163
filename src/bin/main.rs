use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use tenant_hydrator::{AppConfig, build_hydrator, server};

#[derive(Parser)]
#[command(name = "tenant-hydrator")]
#[command(about = "Identity-hydration sidecar for the API gateway authorization hook")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hydration HTTP server
    Server {
        /// Path to the JSON configuration file
        #[arg(long, env = "HYDRATOR_CONFIG", default_value = "hydrator.json")]
        config: PathBuf,
        /// Override the bind address from the configuration
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load the configuration and all referenced files, then exit
    CheckConfig {
        #[arg(long, env = "HYDRATOR_CONFIG", default_value = "hydrator.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tenant_hydrator=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config, bind } => {
            let app_config = AppConfig::load(&config)?;
            let bind = bind.unwrap_or_else(|| app_config.bind.clone());

            let hydrator = build_hydrator(&app_config)?;
            let app = server::create_router(hydrator);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Hydrator listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::CheckConfig { config } => {
            let app_config = AppConfig::load(&config)?;
            build_hydrator(&app_config)?;
            println!("configuration OK");
        }
    }

    Ok(())
}
