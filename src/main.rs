use std::pin::pin;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgAction, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hockey_score_notifier::config::{Config, NotifierConfig, StateBackend};
use hockey_score_notifier::discord::Discord;
use hockey_score_notifier::fleet::FleetController;
use hockey_score_notifier::monitor::{MonitorContext, MonitorSettings};
use hockey_score_notifier::nhl::NhlApi;
use hockey_score_notifier::notify::{LogNotifier, NotificationDispatcher, Notifier};
use hockey_score_notifier::store::{FileStore, MemoryStore, StateStore};
use hockey_score_notifier::team_cache::TeamCache;
use hockey_score_notifier::twilio::Twilio;

#[derive(Debug, Parser)]
#[command(name = "hockey-score-notifier")]
#[command(about = "Watch today's NHL games and text pre-game and scoring updates", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    // RUST_LOG wins over the command-line flags.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn open_store(backend: &StateBackend) -> anyhow::Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match backend {
        StateBackend::Memory => {
            warn!("Using in-memory state; progress will not survive a restart");
            Arc::new(MemoryStore::new())
        }
        StateBackend::File(path) => Arc::new(
            FileStore::open(path).with_context(|| format!("failed to open state file {}", path.display()))?,
        ),
        #[cfg(feature = "redis-store")]
        StateBackend::Redis(url) => Arc::new(
            hockey_score_notifier::store::RedisStore::connect(url).context("failed to connect to Redis")?,
        ),
        #[cfg(not(feature = "redis-store"))]
        StateBackend::Redis(_) => anyhow::bail!("this build has no Redis support; enable the redis-store feature"),
    };
    Ok(store)
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match &config.notifier {
        NotifierConfig::Twilio { account_sid, auth_token } => {
            Arc::new(Twilio::new(account_sid, auth_token, config.http_timeout))
        }
        NotifierConfig::Discord => Arc::new(Discord::new(config.http_timeout)),
        NotifierConfig::Log => {
            warn!("No SMS credentials configured; notifications are only logged");
            Arc::new(LogNotifier)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli);

    let config = Config::from_env()?;
    info!(team_id = %config.team_id, all_games = config.watch_all_games, state = ?config.state, notifier = ?config.notifier, "Starting");
    if config.recipients.is_empty() {
        warn!("PHONEBOOK is empty; notifications will have no recipients");
    }

    let api = Arc::new(NhlApi::new(&config.api_base_url, config.http_timeout));
    let ctx = MonitorContext {
        teams: Arc::new(TeamCache::new(api.clone())),
        live: api.clone(),
        store: open_store(&config.state)?,
        dispatcher: Arc::new(NotificationDispatcher::new(build_notifier(&config), config.sender.clone())),
        settings: MonitorSettings {
            tracked_team: Some(config.team_id),
            timezone: config.timezone,
            pre_game_hour: config.pre_game_hour,
            cycle_interval: config.cycle_interval,
            recipients: config.recipients.clone(),
        },
    };
    let fleet = FleetController::new(api, ctx, config.team_filter()).with_workers(config.discovery_workers);

    let mut shutdown = pin!(tokio::signal::ctrl_c());
    loop {
        let today = Utc::now().with_timezone(&config.timezone).date_naive();
        info!(%today, "Checking for games");

        let games = tokio::select! {
            discovered = fleet.discover(today) => discovered,
            _ = &mut shutdown => break,
        };
        match games {
            Ok(games) if games.is_empty() => info!(%today, "No game scheduled today"),
            Ok(games) => {
                let handle = fleet.spawn_all(games);
                let canceller = handle.canceller();
                let mut finished = pin!(handle.wait());
                tokio::select! {
                    joined = &mut finished => {
                        if let Err(e) = joined {
                            error!(error = %e, "Fleet supervisor failed");
                        }
                    }
                    _ = &mut shutdown => {
                        canceller.cancel();
                        if let Err(e) = finished.await {
                            error!(error = %e, "Fleet supervisor failed during shutdown");
                        }
                        break;
                    }
                }
            }
            Err(e) => error!(error = %e, "Discovery failed; retrying"),
        }

        tokio::select! {
            _ = tokio::time::sleep(config.discovery_interval) => {}
            _ = &mut shutdown => break,
        }
    }

    info!("Shutting down");
    Ok(())
}
