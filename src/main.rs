//! Signing Agent CLI
//!
//! Command-line interface for running the transaction approval agent.

use clap::{Parser, Subcommand};
use reqwest::Method;
use signing_agent_client::signing::canonical::{HEADER_SIGN, HEADER_TIMESTAMP};
use signing_agent_client::{
    AgentSession, CanonicalSigner, Config, NetAmountPolicy, RequestKey, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "sa-client")]
#[command(about = "Transaction approval agent for a custody signing service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the agent and answer approval requests until interrupted
    Run,

    /// Register (or look up) the agent and print its id
    Register,

    /// Print the authentication headers for a partner API request
    Sign {
        /// Full request URL
        #[arg(long)]
        url: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // File first, then environment
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => {
            run_agent(config).await?;
        }
        Commands::Register => {
            let session = AgentSession::from_config(config)?;
            let agent_id = session.register_or_lookup().await?;
            println!("{}", agent_id);
        }
        Commands::Sign { url, body, method } => {
            sign_request(&config, &url, body.as_deref(), &method)?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_agent(config: Config) -> Result<()> {
    tracing::info!(
        name = %config.agent.name,
        host = %config.agent.host,
        port = config.agent.port,
        company_id = ?config.partner.company_id,
        max_net_amount = config.policy.max_net_amount,
        "Starting signing agent"
    );

    let policy = NetAmountPolicy::from_settings(&config.policy);
    let session = AgentSession::from_config(config)?.with_policy(policy);

    let agent_id = session.initialize().await?;
    tracing::info!(agent_id = %agent_id, "Listening for approval requests");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted");
    session.shutdown();
    Ok(())
}

fn sign_request(config: &Config, url: &str, body: Option<&str>, method: &str) -> Result<()> {
    let key = RequestKey::from_file(&config.agent.private_key_path)?;
    let signer = CanonicalSigner::new(Some(Arc::new(key)));

    let url = Url::parse(url)
        .map_err(|e| signing_agent_client::Error::Config(format!("Invalid url {}: {}", url, e)))?;
    let method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|e| {
        signing_agent_client::Error::Config(format!("Invalid method {}: {}", method, e))
    })?;
    let body: Option<serde_json::Value> = body.map(serde_json::from_str).transpose()?;

    let signed = signer.sign(method, &url, body.as_ref())?;

    println!("{}: {}", HEADER_TIMESTAMP, signed.timestamp);
    println!("{}: {}", HEADER_SIGN, signed.signature);
    if let Some(body) = signed.body_json {
        println!("body: {}", body);
    }
    Ok(())
}
