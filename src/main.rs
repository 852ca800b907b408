use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use tender_market::{
    config, init_telemetry, shutdown_telemetry, Database, Decision, Market, MarketConfig, Page,
};

#[derive(Parser)]
#[command(name = "tender-market")]
#[command(about = "Tender and bid marketplace core")]
#[command(long_about = "Operate a tender marketplace database: run migrations, inspect caches, \
                       decide bids, roll back content and read version history and reviews. \
                       Every command prints JSON on stdout; logs go to stderr.")]
struct Cli {
    /// Configuration file to load instead of tender-market.toml
    #[arg(long, global = true)]
    config: Option<String>,

    /// Database URL overriding the configured one
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EntityArg {
    Tender,
    Bid,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Warm the caches and print their sizes
    Stats,
    /// Approve or reject a published bid
    Decide {
        /// Username of the organization member deciding
        #[arg(long)]
        actor: String,
        #[arg(long)]
        bid: String,
        /// approve or reject
        #[arg(long)]
        decision: Decision,
    },
    /// Copy an old content version into a new one
    Rollback {
        #[arg(value_enum)]
        kind: EntityArg,
        id: String,
        version: i64,
        #[arg(long)]
        actor: String,
    },
    /// List every content version of a tender or bid
    History {
        #[arg(value_enum)]
        kind: EntityArg,
        id: String,
    },
    /// List feedback received by a bid author
    Reviews {
        #[arg(long)]
        requester: String,
        #[arg(long)]
        tender: String,
        #[arg(long)]
        author: String,
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Page size; defaults to pagination.default_limit
        #[arg(long)]
        limit: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MarketConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => config()?.clone(),
    };
    if let Some(url) = cli.database {
        config.database.url = url;
    }

    init_telemetry(&config.observability)?;
    let result = tokio::runtime::Runtime::new()?.block_on(run(cli.command, config));
    shutdown_telemetry();
    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Commands, config: MarketConfig) -> Result<()> {
    let database = Database::connect(&config.database)
        .await
        .context("Failed to open database")?;

    if let Commands::Migrate = command {
        database.migrate().await?;
        print_json(&json!({ "migrated": true }))?;
        database.shutdown().await;
        return Ok(());
    }

    let market = Market::assemble(&database, &config).await?;
    let outcome = dispatch(command, &market, &config).await;
    market.caches.log_stats();
    database.shutdown().await;
    outcome
}

async fn dispatch(command: Commands, market: &Market, config: &MarketConfig) -> Result<()> {
    match command {
        Commands::Migrate => Ok(()),
        Commands::Stats => print_json(&json!({
            "tenders": market.caches.tender_ids.len(),
            "bids": market.caches.bid_ids.len(),
            "users": market.caches.user_ids.len(),
        })),
        Commands::Decide {
            actor,
            bid,
            decision,
        } => {
            let bid = market.bids.submit_decision(&actor, &bid, decision).await?;
            print_json(&bid)
        }
        Commands::Rollback {
            kind,
            id,
            version,
            actor,
        } => match kind {
            EntityArg::Tender => print_json(&market.tenders.rollback(&actor, &id, version).await?),
            EntityArg::Bid => print_json(&market.bids.rollback(&actor, &id, version).await?),
        },
        Commands::History { kind, id } => match kind {
            EntityArg::Tender => print_json(&market.tenders.history(&id).await?),
            EntityArg::Bid => print_json(&market.bids.history(&id).await?),
        },
        Commands::Reviews {
            requester,
            tender,
            author,
            offset,
            limit,
        } => {
            let page = Page::new(offset, limit.unwrap_or(config.pagination.default_limit));
            let reviews = market
                .bids
                .reviews(&requester, &tender, &author, page)
                .await?;
            print_json(&reviews)
        }
    }
}
