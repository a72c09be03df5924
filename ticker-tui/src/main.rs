use crate::{
    config::{Cli, TickerConfig},
    error::ConfigError,
    logging::init_logging,
    terminal::TerminalSession,
};
use clap::Parser;
use itertools::Itertools;
use rustls::crypto::ring::default_provider;
use smol_str::SmolStr;
use std::{
    error::Error,
    io::{self, BufWriter},
    sync::Arc,
};
use ticker_board::{Registry, RefreshClock, Renderer};
use ticker_data::{
    catalog::SymbolCatalog,
    error::FeedError,
    exchange::{FeedAdapter, binance::Binance, hitbtc::HitBtc},
    instrument::ExchangeId,
    supervisor::{FeedSupervisor, SupervisorConfig},
    transport::websocket::WsConnector,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

mod config;
mod error;
mod logging;
mod terminal;

/// Room for a whole frame, so each redraw reaches the terminal in one write.
const FRAME_BUFFER_CAPACITY: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Cli::parse().into_config_from_env()?;

    let deferred_log = init_logging(config.logfile.as_deref())?;
    let result = run(config).await;

    // Terminal is restored by now, surface any buffered errors
    deferred_log.drain_into(&mut io::stderr())?;
    result
}

async fn run(config: TickerConfig) -> Result<(), Box<dyn Error>> {
    let _ = default_provider().install_default();

    let client = reqwest::Client::new();
    let catalog = SymbolCatalog::fetch(&client, config.exchange).await?;
    let tickers = if config.leaders.is_some() || config.board.volume_unit.currency().is_some() {
        catalog.volume_tickers(&client).await?
    } else {
        Vec::new()
    };
    let leaders = match config.leaders {
        Some(num) => catalog.rank_by_volume(&tickers).into_iter().take(num).collect(),
        None => Vec::new(),
    };
    let symbols = select_symbols(&catalog, &config.pairs, leaders)?;
    let markets = catalog.markets(&symbols)?;
    let board = config.board.with_usd_rates(catalog.usd_rates(&tickers));

    info!(
        exchange = %config.exchange,
        symbols = %symbols.iter().join(","),
        "starting coin ticker"
    );

    let registry = Arc::new(Registry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut feed = match config.exchange {
        ExchangeId::Binance => spawn_feed(
            Binance::new(markets)?,
            &registry,
            config.supervisor,
            shutdown_rx.clone(),
        ),
        ExchangeId::HitBtc => spawn_feed(
            HitBtc::new(markets)?,
            &registry,
            config.supervisor,
            shutdown_rx.clone(),
        ),
    };

    terminal::install_panic_hook();
    let session = TerminalSession::enter()?;

    let renderer = Renderer::new(board.color, board.direction_indicator, config.exchange.to_string());
    let mut clock = RefreshClock::new(
        Arc::clone(&registry),
        board,
        renderer,
        BufWriter::with_capacity(FRAME_BUFFER_CAPACITY, io::stdout()),
        shutdown_rx,
    )
    .spawn();

    // A feed ending early (eg/ rejected subscription) leaves the board on its last state
    shutdown_signal().await?;
    info!("shutdown requested");
    shutdown_tx.send_replace(true);

    let grace = config.supervisor.shutdown_grace;
    let joined = tokio::time::timeout(grace, async { ((&mut feed).await, (&mut clock).await) }).await;
    let (feed, clock) = match joined {
        Ok(joined) => joined,
        Err(_) => {
            warn!(?grace, "tasks did not stop within shutdown grace, aborting");
            feed.abort();
            clock.abort();
            return Ok(());
        }
    };
    drop(session);

    if let Ok(Err(error)) = feed {
        warn!(%error, "feed had terminated");
    }
    if let Ok(Err(error)) = clock {
        error!(%error, "failed to draw board");
    }

    Ok(())
}

/// Canonical symbols to subscribe: explicit pairs first, then volume leaders, without
/// duplicates.
fn select_symbols(
    catalog: &SymbolCatalog,
    pairs: &[String],
    leaders: Vec<SmolStr>,
) -> Result<Vec<SmolStr>, ConfigError> {
    let explicit = pairs
        .iter()
        .map(|pair| catalog.canonicalize(pair))
        .collect::<Result<Vec<_>, FeedError>>()?;

    let symbols = explicit.into_iter().chain(leaders).unique().collect::<Vec<_>>();
    if symbols.is_empty() {
        return Err(ConfigError::NoPairs);
    }

    Ok(symbols)
}

fn spawn_feed<A>(
    adapter: A,
    registry: &Arc<Registry>,
    config: SupervisorConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<Result<(), FeedError>>
where
    A: FeedAdapter,
{
    FeedSupervisor::new(adapter, WsConnector, Arc::clone(registry), config, shutdown).spawn()
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
