mod commands;

use artist_atlas::{AtlasClient, AtlasConfig};
use clap::Parser;
use commands::{execute_command, Commands};

/// Query Last.fm and Deezer through the application proxies
#[derive(Parser)]
#[command(
    name = "artist-atlas",
    about = "Query Last.fm and Deezer artist metadata through the application proxies",
    long_about = None
)]
struct Cli {
    /// Show detailed debug information
    #[arg(long, global = true)]
    verbose: bool,

    /// Origin serving the proxies (overrides ATLAS_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = AtlasConfig::from_env();
    if let Some(base_url) = args.base_url {
        config.origin = base_url;
    }
    log::debug!("Using proxies at {}", config.origin);

    let http_client = http_client::native::NativeClient::new();
    let client = match AtlasClient::new(Box::new(http_client), config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ Failed to create client: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = execute_command(args.command, &client).await {
        eprintln!("❌ Command failed: {e}");
        std::process::exit(1);
    }

    Ok(())
}
