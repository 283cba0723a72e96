//! ef-track — report affiliate impressions, clicks, and conversions from the
//! command line, persisting transaction identifiers between invocations.

use std::path::PathBuf;
use std::sync::Arc;

use attribution_core::{EventKind, EventOptions, OrganicConfig, TrackerConfig};
use attribution_sdk::identifiers::IdentifierStore;
use attribution_sdk::{HttpTransport, StaticPage, Tracker};
use attribution_store::{FileStore, KeyValueStore};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "ef-track")]
#[command(about = "Affiliate attribution tracker")]
#[command(version)]
struct Cli {
    /// Tracking endpoint base URL (overrides config)
    #[arg(long, env = "ATTRIBUTION__TRACKING_DOMAIN")]
    tracking_domain: Option<String>,

    /// Domain identifiers are scoped to (overrides config)
    #[arg(long, env = "ATTRIBUTION__TLD")]
    tld: Option<String>,

    /// Identifier store file
    #[arg(long, default_value = "ef-track-store.json")]
    store: PathBuf,

    /// URL of the page the event happens on
    #[arg(long)]
    page_url: Option<String>,

    /// Referrer of the page
    #[arg(long, default_value = "")]
    referrer: String,

    /// Fallback offer for organic clicks
    #[arg(long, requires = "organic_affiliate_id")]
    organic_offer_id: Option<String>,

    /// Fallback affiliate for organic clicks
    #[arg(long, requires = "organic_offer_id")]
    organic_affiliate_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report an impression
    Impression(EventArgs),
    /// Report a click
    Click(EventArgs),
    /// Report a conversion
    Conversion(EventArgs),
    /// Print the stored transaction id for an offer or advertiser
    Lookup(LookupArgs),
}

#[derive(Args, Debug)]
struct LookupArgs {
    #[arg(long, conflicts_with = "advertiser_id")]
    offer_id: Option<String>,
    #[arg(long)]
    advertiser_id: Option<String>,
}

#[derive(Args, Debug)]
struct EventArgs {
    #[arg(long)]
    offer_id: Option<String>,
    #[arg(long)]
    affiliate_id: Option<String>,
    #[arg(long)]
    advertiser_id: Option<String>,
    #[arg(long)]
    transaction_id: Option<String>,
    #[arg(long)]
    coupon_code: Option<String>,
    /// Full event options as JSON; the flags above take precedence
    #[arg(long)]
    options: Option<String>,
}

impl EventArgs {
    fn into_options(self) -> anyhow::Result<EventOptions> {
        let base = match &self.options {
            Some(raw) => serde_json::from_str(raw)?,
            None => EventOptions::default(),
        };
        Ok(base.overlay(EventOptions {
            offer_id: self.offer_id,
            affiliate_id: self.affiliate_id,
            advertiser_id: self.advertiser_id,
            transaction_id: self.transaction_id,
            coupon_code: self.coupon_code,
            ..Default::default()
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attribution=info,ef_track=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = TrackerConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        TrackerConfig::default()
    });
    if let Some(domain) = cli.tracking_domain {
        config.tracking_domain = domain;
    }
    if let Some(tld) = cli.tld {
        config.tld = Some(tld);
    }
    if let (Some(offer_id), Some(affiliate_id)) = (cli.organic_offer_id, cli.organic_affiliate_id)
    {
        config.organic = Some(OrganicConfig::new(offer_id, affiliate_id));
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&cli.store, config.tld.as_deref())?);

    let (kind, args) = match cli.command {
        Command::Lookup(args) => return lookup(store, &config, args),
        Command::Impression(args) => (EventKind::Impression, args),
        Command::Click(args) => (EventKind::Click, args),
        Command::Conversion(args) => (EventKind::Conversion, args),
    };
    let options = args.into_options()?;

    let location = cli.page_url.as_deref().map(Url::parse).transpose()?;
    let page = StaticPage::new(location, cli.referrer);
    let tracker = Tracker::new(config, store, Arc::new(HttpTransport::new()?))?
        .with_page(Arc::new(page));

    info!(event = %kind, store = %cli.store.display(), "ef-track dispatching");

    let output = match kind {
        EventKind::Impression => {
            serde_json::json!({ "transaction_id": tracker.impression(options).await })
        }
        EventKind::Click => serde_json::json!({ "transaction_id": tracker.click(options).await }),
        EventKind::Conversion => serde_json::to_value(tracker.conversion(options).await)?,
    };
    println!("{output}");
    Ok(())
}

fn lookup(
    store: Arc<dyn KeyValueStore>,
    config: &TrackerConfig,
    args: LookupArgs,
) -> anyhow::Result<()> {
    let ttl = chrono::Duration::days(i64::from(config.identifier_ttl_days));
    let identifiers = IdentifierStore::new(store, ttl);
    let tid = match (args.offer_id, args.advertiser_id) {
        (Some(offer_id), _) => identifiers.transaction_id(&offer_id),
        (None, Some(advertiser_id)) => identifiers.advertiser_transaction_id(&advertiser_id),
        (None, None) => anyhow::bail!("lookup needs --offer-id or --advertiser-id"),
    };
    println!("{}", serde_json::json!({ "transaction_id": tid }));
    Ok(())
}
