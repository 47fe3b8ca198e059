use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use portfolio_tracker::config::WatchList;
use portfolio_tracker::marketplace::coincap::{CoinCap, COINCAP_ENDPOINT};
use portfolio_tracker::marketplace::fetch_price;
use portfolio_tracker::monitor::{AlertMode, MonitorSettings};
use portfolio_tracker::portfolio::memory::MemoryStore;
use portfolio_tracker::portfolio::sqlite::SqliteStore;
use portfolio_tracker::portfolio::{to_holdings, HoldingStore};
use portfolio_tracker::server::{self, ServerState};
use portfolio_tracker::supervisor::MonitorSupervisor;
use portfolio_tracker::valuation::Valuator;
use portfolio_tracker::AppEvent;
use tokio::net::TcpListener;
use tokio::select;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_POLL_SECS: u64 = 30;
const MEMORY_DATABASE: &str = ":memory:";

#[derive(Parser, Debug)]
#[command(version, about = "Tracks crypto holdings and alerts on price thresholds")]
struct Args {
    /// Watch list of `{name, symbol, threshold}` tokens
    #[arg(long, env = "TRACKER_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,
    /// Holdings database url, or `:memory:`
    #[arg(long, env = "TRACKER_DATABASE", default_value = "sqlite://portfolio.db", global = true)]
    database: String,
    #[arg(long, env = "TRACKER_PRICE_ENDPOINT", default_value = COINCAP_ENDPOINT, global = true)]
    price_endpoint: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the monitors and the HTTP server
    Start {
        #[arg(long, env = "TRACKER_LISTEN", default_value = DEFAULT_LISTEN)]
        listen: String,
        /// Seconds between two polls of the same asset
        #[arg(long, default_value_t = DEFAULT_POLL_SECS, value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval: u64,
        /// `repeat` alerts on every breaching poll, `edge` only when crossing
        #[arg(long, default_value_t = AlertMode::Repeat)]
        alert_mode: AlertMode,
    },
    /// Print the current value of all stored holdings
    Value,
    /// Print the current price of one symbol
    Price {
        #[arg(long)]
        symbol: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "{}=debug,portfolio_tracker=debug,tower_http=debug,reqwest=info",
                env!("CARGO_CRATE_NAME")
            )
            .into()
        }))
        .with(fmt::layer())
        .init();

    let args = parse_args_from(std::env::args_os()).unwrap_or_else(|err| err.exit());

    if let Err(err) = run(args).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

/// Parses the command line. Without a subcommand, `start` is implied so its
/// options still come from defaults and the environment.
fn parse_args_from<I, T>(itr: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<OsString> = itr.into_iter().map(Into::into).collect();
    let args = Args::try_parse_from(argv.clone())?;
    if args.command.is_some() {
        return Ok(args);
    }
    Args::try_parse_from(argv.into_iter().chain([OsString::from("start")]))
}

async fn run(args: Args) -> Result<()> {
    let source = CoinCap::new(args.price_endpoint.clone()).context("Error creating HTTP client")?;

    let command = args.command.context("No command given")?;

    match command {
        Commands::Price { symbol } => run_price(source, symbol).await,
        Commands::Value => {
            if args.database == MEMORY_DATABASE {
                bail!("The value command needs a persistent database, not {}", MEMORY_DATABASE);
            }
            run_value(open_sqlite(&args.database).await?, source).await
        }
        Commands::Start {
            listen,
            poll_interval,
            alert_mode,
        } => {
            let settings = MonitorSettings {
                interval: Duration::from_secs(poll_interval),
                mode: alert_mode,
            };
            if args.database == MEMORY_DATABASE {
                run_start(MemoryStore::new(), source, args.config, listen, settings).await
            } else {
                let store = open_sqlite(&args.database).await?;
                run_start(store, source, args.config, listen, settings).await
            }
        }
    }
}

async fn open_sqlite(url: &str) -> Result<SqliteStore> {
    SqliteStore::connect(url)
        .await
        .with_context(|| format!("Error opening database {}", url))
}

async fn run_price(source: CoinCap, symbol: String) -> Result<()> {
    let price = fetch_price(&source, &symbol).await?;
    println!("{} {}", symbol, price);
    Ok(())
}

async fn run_value<S: HoldingStore>(store: S, source: CoinCap) -> Result<()> {
    let records = store.list_all_holdings().await?;
    let total = Valuator::new(source).valuate(&to_holdings(&records)).await?;
    println!("{}", total);
    Ok(())
}

async fn run_start<S>(
    store: S,
    source: CoinCap,
    config_path: PathBuf,
    listen: String,
    settings: MonitorSettings,
) -> Result<()>
where
    S: HoldingStore + Send + Sync + 'static,
{
    let watch_list = WatchList::load(&config_path)
        .await
        .context("Error loading configuration")?;

    let (app_tx, _) = tokio::sync::broadcast::channel::<AppEvent>(64);

    let mut supervisor =
        MonitorSupervisor::start(watch_list.tokens, source.clone(), settings, app_tx.clone());
    let has_monitors = !supervisor.is_empty();

    let state = ServerState::new(store, Valuator::new(source), app_tx);
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Error binding {}", listen))?;
    let server_task = tokio::task::spawn(server::serve(listener, server::router(state)));

    info!("{}", "STARTING TRACKER".green());

    let result = select! {
        _ = supervisor.join(), if has_monitors => {
            info!("All monitors ended");
            Ok(())
        }
        res = server_task => {
            match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.context("HTTP server error")),
                Err(err) => Err(anyhow::Error::from(err).context("HTTP server task failed")),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    supervisor.shutdown();
    supervisor.join().await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_the_default_command() {
        std::env::set_var("TRACKER_LISTEN", "127.0.0.1:9999");
        let args = parse_args_from(["tracker", "--database", MEMORY_DATABASE]).unwrap();
        std::env::remove_var("TRACKER_LISTEN");

        assert_eq!(args.database, MEMORY_DATABASE);
        match args.command {
            Some(Commands::Start {
                listen,
                poll_interval,
                alert_mode,
            }) => {
                assert_eq!(listen, "127.0.0.1:9999");
                assert_eq!(poll_interval, DEFAULT_POLL_SECS);
                assert_eq!(alert_mode, AlertMode::Repeat);
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_subcommand_is_kept() {
        let args = parse_args_from(["tracker", "price", "--symbol", "BTC"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Price { symbol }) if symbol == "BTC"));

        let args = parse_args_from(["tracker", "start", "--alert-mode", "edge"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::Start { alert_mode: AlertMode::Edge, .. })
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(parse_args_from(["tracker", "start", "--poll-interval", "0"]).is_err());
        assert!(parse_args_from(["tracker", "start", "--poll-interval", "1"]).is_ok());
    }

    #[tokio::test]
    async fn test_value_needs_persistent_database() {
        let args = parse_args_from(["tracker", "--database", MEMORY_DATABASE, "value"]).unwrap();
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains(MEMORY_DATABASE));
    }
}
