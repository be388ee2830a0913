// CampaignForge Backend - Main Entry Point
//
// Wires the entitlement gate together and serves the HTTP API:
// - Tier catalog and licence validation
// - Per-licence usage quotas
// - Anonymous demo rate limiting
// - Ownership-scoped campaign storage

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use campaignforge::campaigns::{CampaignService, InMemoryCampaignStore};
use campaignforge::config::Config;
use campaignforge::entitlement::{
    EntitlementManager, HttpLicenceValidator, InMemoryEntitlementStore, LicenceValidator,
    StaticLicenceValidator,
};
use campaignforge::generation::{GenerationService, StubGenerator};
use campaignforge::identity::AddrHasher;
use campaignforge::rate_limit::{DemoRateLimiter, InMemoryRateLimitStore};
use campaignforge::server::{self, AppState};
use campaignforge::tiers::TierCatalog;

/// CampaignForge: paid outbound-campaign generation backend
#[derive(Parser, Debug)]
#[command(name = "campaignforge")]
#[command(author = "CampaignForge Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Entitlement-gated campaign generation API", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides CAMPAIGNFORGE_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the tier catalog and exit
    Tiers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .init();

    info!("CampaignForge backend v0.1.0 starting...");

    let config = Config::from_env();

    match args.command {
        Some(Commands::Tiers) => {
            print_tiers(&config);
            Ok(())
        }
        Some(Commands::Serve { port }) => {
            let port = resolve_port(port, &config);
            serve(config, port).await
        }
        None => {
            let port = resolve_port(None, &config);
            serve(config, port).await
        }
    }
}

/// Port precedence: command-line flag over configuration
fn resolve_port(flag: Option<u16>, config: &Config) -> u16 {
    flag.unwrap_or(config.server.port)
}

fn print_tiers(config: &Config) {
    let catalog = TierCatalog::builtin(
        &config.billing.default_tier,
        config.licence.product_ids.clone(),
    );
    for tier in catalog.all() {
        println!(
            "{:<14} ${:<4} campaigns: {:<10} validity: {:?} saves: {:?}",
            tier.name,
            tier.price_usd,
            tier.campaign_limit
                .count()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unlimited".to_string()),
            tier.validity,
            tier.save_limit.count(),
        );
    }
}

async fn serve(config: Config, port: u16) -> Result<()> {
    let catalog = Arc::new(TierCatalog::builtin(
        &config.billing.default_tier,
        config.licence.product_ids.clone(),
    ));

    let validator: Arc<dyn LicenceValidator> = match &config.licence.verify_url {
        Some(url) => {
            let product_ids: Vec<String> =
                config.licence.product_ids.keys().cloned().collect();
            Arc::new(HttpLicenceValidator::new(
                url.clone(),
                product_ids,
                Duration::from_secs(config.licence.timeout_secs),
            )?)
        }
        None => {
            warn!("No licence verify URL configured; using static development keys");
            Arc::new(
                StaticLicenceValidator::new()
                    .with_key("GUM-2025-XYZ789", "dev-professional")
                    .with_key("GUM-TEST-11111", "dev-professional"),
            )
        }
    };

    let entitlements = Arc::new(EntitlementManager::new(
        catalog,
        Arc::new(InMemoryEntitlementStore::new()),
        validator,
        config.billing.period_days,
    ));

    let demo_limiter = Arc::new(DemoRateLimiter::new(
        Arc::new(InMemoryRateLimitStore::new()),
        &config.demo,
    ));

    let campaigns = Arc::new(CampaignService::new(
        Arc::new(InMemoryCampaignStore::new()),
        entitlements.clone(),
    ));

    // TODO: swap the stub for the real LLM provider client once its
    // request/response contract is settled
    let generation = Arc::new(GenerationService::new(
        entitlements.clone(),
        demo_limiter,
        Arc::new(StubGenerator),
    ));

    let state = Arc::new(AppState {
        generation,
        entitlements,
        campaigns,
        hasher: AddrHasher::new(config.server.addr_salt.as_bytes()),
    });

    server::serve(port, state).await
}
