use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument};

use crate::error::UpstreamError;
use crate::game::{Team, TeamId};
use crate::source::TeamSource;

/// Default size of the worker pool used for league-wide team resolution.
pub const DEFAULT_TEAM_WORKERS: usize = 50;

/// Memoizing team resolver.
///
/// Concurrent lookups of the same uncached id may both reach the source; the second insert
/// simply overwrites an identical value.
pub struct TeamCache {
    source: Arc<dyn TeamSource>,
    teams: DashMap<TeamId, Team>,
    workers: usize,
}

impl TeamCache {
    pub fn new(source: Arc<dyn TeamSource>) -> Self {
        Self { source, teams: DashMap::new(), workers: DEFAULT_TEAM_WORKERS }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn resolve(&self, id: TeamId) -> Result<Team, UpstreamError> {
        if let Some(team) = self.teams.get(&id) {
            return Ok(team.clone());
        }
        let team = self.source.fetch_team(id)?;
        debug!(team_id = %id, name = %team.name, "Resolved team");
        self.teams.insert(id, team.clone());
        Ok(team)
    }

    pub fn cached(&self, id: TeamId) -> Option<Team> {
        self.teams.get(&id).map(|t| t.clone())
    }

    /// Prime the cache with a team restored from elsewhere, e.g. the state store.
    pub fn seed(&self, team: Team) {
        self.teams.entry(team.id).or_insert(team);
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Resolve both sides of a matchup concurrently; fails if either side fails.
    pub async fn resolve_pair(self: &Arc<Self>, home: TeamId, away: TeamId) -> Result<(Team, Team), UpstreamError> {
        let home_cache = Arc::clone(self);
        let away_cache = Arc::clone(self);
        let home_task = tokio::task::spawn_blocking(move || home_cache.resolve(home));
        let away_task = tokio::task::spawn_blocking(move || away_cache.resolve(away));
        let (home, away) = tokio::try_join!(home_task, away_task)?;
        Ok((home?, away?))
    }

    /// Resolve many ids through a bounded worker pool. Output order follows `ids`.
    pub async fn resolve_many(self: &Arc<Self>, ids: Vec<TeamId>) -> Result<Vec<Team>, UpstreamError> {
        let results: Vec<_> = stream::iter(ids)
            .map(|id| {
                let cache = Arc::clone(self);
                tokio::task::spawn_blocking(move || cache.resolve(id))
            })
            .buffered(self.workers)
            .collect()
            .await;
        results
            .into_iter()
            .map(|joined| joined.map_err(UpstreamError::from).and_then(|team| team))
            .collect()
    }

    /// Resolve every team in the league.
    #[instrument(level = "info", skip(self))]
    pub async fn all_teams(self: &Arc<Self>) -> Result<Vec<Team>, UpstreamError> {
        let source = Arc::clone(&self.source);
        let ids = tokio::task::spawn_blocking(move || source.all_team_ids()).await??;
        let teams = self.resolve_many(ids).await?;
        info!(count = teams.len(), "Resolved all league teams");
        Ok(teams)
    }
}
