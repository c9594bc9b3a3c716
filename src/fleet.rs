use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, instrument, warn};

use crate::error::MonitorError;
use crate::game::{CancelFlag, Game, TeamId};
use crate::monitor::{GameMonitor, MonitorContext};
use crate::source::ScheduleSource;

/// Default bound on concurrent game initializations during discovery.
pub const DEFAULT_DISCOVERY_WORKERS: usize = 100;

/// Discovers a day's games and runs one monitor per game.
pub struct FleetController {
    schedule: Arc<dyn ScheduleSource>,
    ctx: MonitorContext,
    team_filter: Option<TeamId>,
    workers: usize,
}

impl FleetController {
    pub fn new(schedule: Arc<dyn ScheduleSource>, ctx: MonitorContext, team_filter: Option<TeamId>) -> Self {
        Self { schedule, ctx, team_filter, workers: DEFAULT_DISCOVERY_WORKERS }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Initialize every game scheduled on `date`. An empty schedule yields an empty list.
    ///
    /// A game that fails to initialize is logged and left out; the rest are still returned.
    #[instrument(level = "info", skip(self))]
    pub async fn discover(&self, date: NaiveDate) -> Result<Vec<Game>, MonitorError> {
        let source = Arc::clone(&self.schedule);
        let filter = self.team_filter;
        let schedule = tokio::task::spawn_blocking(move || source.fetch_schedule(date, filter)).await??;
        if schedule.is_empty() {
            info!(%date, "No game scheduled");
            return Ok(Vec::new());
        }

        let results: Vec<_> = stream::iter(schedule.games)
            .map(|entry| {
                let ctx = self.ctx.clone();
                async move {
                    let id = entry.id;
                    (id, GameMonitor::from_scheduled(ctx, date, &entry).await)
                }
            })
            .buffered(self.workers)
            .collect()
            .await;

        let mut games = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(monitor) => games.push(monitor.into_game()),
                Err(e) => warn!(game_id = %id, error = %e, "Skipping game that failed to initialize"),
            }
        }
        info!(%date, count = games.len(), "Discovered games");
        Ok(games)
    }

    /// Run one monitor per game and return once every monitor has exited.
    pub async fn run_all(&self, games: Vec<Game>) -> Vec<Game> {
        run_monitors(self.ctx.clone(), games).await
    }

    /// Launch [`FleetController::run_all`] in the background.
    pub fn spawn_all(&self, games: Vec<Game>) -> FleetHandle {
        let canceller = FleetCanceller(games.iter().map(|g| g.cancel_flag().clone()).collect());
        let join = tokio::spawn(run_monitors(self.ctx.clone(), games));
        FleetHandle { canceller, join }
    }
}

async fn run_monitors(ctx: MonitorContext, games: Vec<Game>) -> Vec<Game> {
    let handles: Vec<(String, JoinHandle<Game>)> = games
        .into_iter()
        .map(|game| {
            let label = game.to_string();
            let monitor = GameMonitor::new(game, ctx.clone());
            (label, tokio::task::spawn_blocking(move || monitor.run()))
        })
        .collect();

    let mut finished = Vec::with_capacity(handles.len());
    for (label, handle) in handles {
        match handle.await {
            Ok(game) => finished.push(game),
            Err(e) => error!(game = %label, error = %e, "Monitor task failed"),
        }
    }
    info!(count = finished.len(), "All games have finished");
    finished
}

/// Sets the cancellation flag of every game in a fleet.
#[derive(Debug, Clone)]
pub struct FleetCanceller(Vec<CancelFlag>);

impl FleetCanceller {
    pub fn cancel(&self) {
        for flag in &self.0 {
            flag.cancel();
        }
        info!(games = self.0.len(), "Cancellation requested for all games");
    }
}

/// Handle to a fleet running in the background.
#[derive(Debug)]
pub struct FleetHandle {
    canceller: FleetCanceller,
    join: JoinHandle<Vec<Game>>,
}

impl FleetHandle {
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> FleetCanceller {
        self.canceller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for every monitor to exit.
    pub async fn wait(self) -> Result<Vec<Game>, JoinError> {
        self.join.await
    }
}
