#![forbid(unsafe_code)]
//! Session context and the three forecasting stages.
//!
//! A [`ForecastSession`] owns the store, the agent invoker and every cache the
//! dashboard used to keep in component state. At most one stage is in flight
//! per session; a second stage call is rejected with [`StageError::Busy`]
//! before any agent is contacted.

pub mod config;

use std::sync::{Mutex, MutexGuard, PoisonError};

use nhl_forecast_core::lenient::{decode_payload, empty_object};
use nhl_forecast_core::projection::select_players;
use nhl_forecast_core::store::{read_json, write_json_swallowed};
use nhl_forecast_core::{
    history_record, now_utc, parse_iso_date, pattern_instruction, projection_instruction,
    reconciliation_instruction, sample, today_local, FlatRow, ForecastError, HistoryFilter,
    HistoryLedger, KeyValueStore, LedgerMetrics, PatternAnalysis, PlayerProjection, PlayerQuery,
    ProjectionBuild, ProjectionSet, ReconciliationReport, HISTORY_KEY, PROJECTIONS_KEY,
};
use nhl_forecast_provider::{AgentInvoker, AgentResponse, AgentRoster, InvocationRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

pub use config::{load_config_from_path, parse_config_yaml, ForecastConfig, StoreConfig};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Projections,
    Reconciliation,
    Patterns,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Projections => "projections",
            Self::Reconciliation => "reconciliation",
            Self::Patterns => "patterns",
        }
    }

    #[must_use]
    pub fn agent_id(self, roster: &AgentRoster) -> &str {
        match self {
            Self::Projections => &roster.projection,
            Self::Reconciliation => &roster.results,
            Self::Patterns => &roster.patterns,
        }
    }

    /// Shown when the agent fails without giving a reason.
    #[must_use]
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Projections => "Failed to generate projections",
            Self::Reconciliation => "Failed to fetch results",
            Self::Patterns => "Failed to analyze patterns",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StageError {
    #[error("{} stage is already in progress", .0.as_str())]
    Busy(Stage),
    #[error("invalid reconciliation date: {0}")]
    InvalidDate(String),
    #[error("{0}")]
    Agent(String),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

#[derive(Debug, Default)]
struct SessionState {
    projections: ProjectionSet,
    reconciliation: Option<ReconciliationReport>,
    patterns: Option<PatternAnalysis>,
    ledger: HistoryLedger,
    invocations: Vec<InvocationRecord>,
    show_sample: bool,
}

pub struct ForecastSession<S, A> {
    store: Mutex<S>,
    invoker: A,
    roster: AgentRoster,
    active: Mutex<Option<Stage>>,
    state: Mutex<SessionState>,
}

/// Clears the active-stage indicator on every exit path.
struct StageGuard<'a> {
    active: &'a Mutex<Option<Stage>>,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        *lock(self.active) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S, A> ForecastSession<S, A>
where
    S: KeyValueStore,
    A: AgentInvoker,
{
    /// Builds a session and hydrates the projection and ledger caches from
    /// the store.
    pub fn new(store: S, invoker: A, roster: AgentRoster) -> Self {
        let state = SessionState {
            projections: ProjectionSet::load(&store),
            ledger: HistoryLedger::load(&store),
            ..SessionState::default()
        };
        Self {
            store: Mutex::new(store),
            invoker,
            roster,
            active: Mutex::new(None),
            state: Mutex::new(state),
        }
    }

    #[must_use]
    pub fn with_show_sample(self, show_sample: bool) -> Self {
        self.set_show_sample(show_sample);
        self
    }

    pub fn set_show_sample(&self, show_sample: bool) {
        lock(&self.state).show_sample = show_sample;
    }

    #[must_use]
    pub fn show_sample(&self) -> bool {
        lock(&self.state).show_sample
    }

    #[must_use]
    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    #[must_use]
    pub fn active_stage(&self) -> Option<Stage> {
        *lock(&self.active)
    }

    /// Identifier of the agent currently being called, if any.
    #[must_use]
    pub fn active_agent_id(&self) -> Option<String> {
        self.active_stage()
            .map(|stage| stage.agent_id(&self.roster).to_string())
    }

    /// Runs `f` against the underlying store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.store))
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<InvocationRecord> {
        lock(&self.state).invocations.clone()
    }

    fn begin(&self, stage: Stage) -> Result<StageGuard<'_>, StageError> {
        let mut active = lock(&self.active);
        if let Some(current) = *active {
            tracing::warn!(requested = stage.as_str(), active = current.as_str(), "stage rejected; session busy");
            return Err(StageError::Busy(current));
        }
        *active = Some(stage);
        tracing::info!(stage = stage.as_str(), "stage started");
        Ok(StageGuard {
            active: &self.active,
        })
    }

    /// Calls the stage's agent and returns the `result` payload of a
    /// successful response.
    fn call_agent(&self, stage: Stage, instruction: &str) -> Result<Value, StageError> {
        let agent_id = stage.agent_id(&self.roster);
        tracing::info!(stage = stage.as_str(), agent_id, "agent call dispatched");

        let invocation = self.invoker.invoke(instruction, agent_id).map_err(|err| {
            tracing::warn!(stage = stage.as_str(), error = %err, "agent call failed");
            StageError::Agent(err.to_string())
        })?;
        lock(&self.state).invocations.push(invocation.record);

        let AgentResponse {
            success,
            response,
            error,
        } = invocation.response;
        if !success {
            let message = error.unwrap_or_else(|| stage.failure_message().to_string());
            tracing::warn!(stage = stage.as_str(), error = %message, "agent reported failure");
            return Err(StageError::Agent(message));
        }
        Ok(response.map_or(Value::Null, |payload| payload.result))
    }

    /// Projection generation for today's slate on the local clock.
    ///
    /// # Errors
    /// Same as [`ForecastSession::generate_projections_for`].
    pub fn generate_projections(&self) -> Result<ProjectionSet, StageError> {
        self.generate_projections_for(today_local())
    }

    /// Projection generation: asks the projection agent for the slate of
    /// `today` and replaces the stored projection set.
    ///
    /// # Errors
    /// [`StageError::Busy`] when another stage is running,
    /// [`StageError::Agent`] when the agent call fails.
    pub fn generate_projections_for(&self, today: Date) -> Result<ProjectionSet, StageError> {
        let _guard = self.begin(Stage::Projections)?;
        let instruction = projection_instruction(today)?;
        let result = self.call_agent(Stage::Projections, &instruction)?;

        let ProjectionBuild { set, record } = ProjectionBuild::from_agent_result(&result, now_utc())?;
        let persisted = write_json_swallowed(&mut *lock(&self.store), PROJECTIONS_KEY, &record);
        tracing::info!(
            games = set.games.len(),
            players = set.players.len(),
            persisted,
            "projection set replaced"
        );
        lock(&self.state).projections = set.clone();
        Ok(set)
    }

    /// Result reconciliation for `date` (`YYYY-MM-DD`). A successful
    /// response is appended to the history ledger.
    ///
    /// # Errors
    /// [`StageError::InvalidDate`] before any agent call for a bad date,
    /// [`StageError::Busy`] when another stage is running,
    /// [`StageError::Agent`] when the agent call fails. The ledger is left
    /// untouched on every error.
    pub fn reconcile_results(&self, date: &str) -> Result<ReconciliationReport, StageError> {
        let date = date.trim();
        parse_iso_date(date).map_err(|err| StageError::InvalidDate(err.to_string()))?;
        let _guard = self.begin(Stage::Reconciliation)?;

        let stored = read_json(&*lock(&self.store), PROJECTIONS_KEY, empty_object());
        let result = self.call_agent(
            Stage::Reconciliation,
            &reconciliation_instruction(date, &stored),
        )?;

        let payload = decode_payload(&result);
        let report = ReconciliationReport::from_agent_result(&payload);
        for (name, violation) in report.flag_violations() {
            tracing::debug!(%name, ?violation, "agent flag buckets are inconsistent");
        }

        let record = history_record(date, &payload);
        let mut store = lock(&self.store);
        let mut state = lock(&self.state);
        state.ledger.append_record(&mut *store, record);
        state.reconciliation = Some(report.clone());
        Ok(report)
    }

    /// Pattern analysis over the full stored ledger. Nothing is persisted.
    ///
    /// # Errors
    /// [`StageError::Busy`] when another stage is running,
    /// [`StageError::Agent`] when the agent call fails.
    pub fn analyze_patterns(&self) -> Result<PatternAnalysis, StageError> {
        let _guard = self.begin(Stage::Patterns)?;

        let history = read_json(&*lock(&self.store), HISTORY_KEY, Value::Array(Vec::new()));
        let result = self.call_agent(Stage::Patterns, &pattern_instruction(&history))?;

        let analysis = PatternAnalysis::from_agent_result(&result);
        tracing::info!(
            patterns = analysis.patterns.len(),
            anti_patterns = analysis.anti_patterns.len(),
            "pattern analysis completed"
        );
        lock(&self.state).patterns = Some(analysis.clone());
        Ok(analysis)
    }

    /// Deletes the stored ledger and empties the cache.
    pub fn clear_history(&self) -> bool {
        let mut store = lock(&self.store);
        lock(&self.state).ledger.clear(&mut *store)
    }

    /// The current projection set, with sample games/players standing in
    /// for empty lists when the sample toggle is on.
    #[must_use]
    pub fn projections_view(&self) -> ProjectionSet {
        let state = lock(&self.state);
        let mut view = state.projections.clone();
        if state.show_sample {
            let demo = sample::projections();
            if view.games.is_empty() {
                view.games = demo.games;
            }
            if view.players.is_empty() {
                view.players = demo.players;
            }
        }
        view
    }

    #[must_use]
    pub fn players_view(&self, query: &PlayerQuery) -> Vec<PlayerProjection> {
        select_players(&self.projections_view().players, query)
    }

    /// The last reconciliation, or `None` when nothing has been reconciled
    /// in this session and the sample toggle is off.
    #[must_use]
    pub fn reconciliation_view(&self) -> Option<ReconciliationReport> {
        let state = lock(&self.state);
        let live = state.reconciliation.clone();
        if !state.show_sample {
            return live;
        }
        let demo = sample::reconciliation();
        let mut view = live.unwrap_or_default();
        if view.game_results.is_empty() {
            view.game_results = demo.game_results;
        }
        if view.player_results.is_empty() {
            view.player_results = demo.player_results;
        }
        if view.accuracy.is_none() {
            view.accuracy = demo.accuracy;
        }
        if view.learning_insights.is_empty() {
            view.learning_insights = demo.learning_insights;
        }
        Some(view)
    }

    #[must_use]
    pub fn patterns_view(&self) -> Option<PatternAnalysis> {
        let state = lock(&self.state);
        let live = state.patterns.clone();
        if !state.show_sample {
            return live;
        }
        let demo = sample::patterns();
        let mut view = live.unwrap_or_default();
        if view.patterns.is_empty() {
            view.patterns = demo.patterns;
        }
        if view.anti_patterns.is_empty() {
            view.anti_patterns = demo.anti_patterns;
        }
        if view.summary.is_none() {
            view.summary = demo.summary;
        }
        Some(view)
    }

    #[must_use]
    pub fn history_view(&self) -> HistoryLedger {
        let state = lock(&self.state);
        if state.show_sample && state.ledger.is_empty() {
            return sample::history();
        }
        state.ledger.clone()
    }

    /// Flattened, filtered history rows plus their metrics.
    #[must_use]
    pub fn history_rows(&self, filter: &HistoryFilter) -> (Vec<FlatRow>, LedgerMetrics) {
        let rows = filter.apply(&self.history_view().flatten());
        let metrics = LedgerMetrics::from_rows(&rows);
        (rows, metrics)
    }
}
