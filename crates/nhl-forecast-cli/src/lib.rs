//! `nhlf` command surface.
//!
//! Hosts embed the CLI through [`run_cli`]; the binary in `main.rs` only
//! installs logging and forwards parsed arguments.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nhl_forecast_core::accuracy::format_rate;
use nhl_forecast_core::{
    parse_iso_date, AccuracyData, FlagOutcome, HistoryFilter, KeyValueStore, PatternAnalysis,
    PlayerQuery, PlayerSort, ProjectionSet, ReconciliationReport,
};
use nhl_forecast_pipeline::{load_config_from_path, ForecastConfig, ForecastSession};
use nhl_forecast_provider::{AgentInvoker, HttpAgentInvoker, MockAgentInvoker};
use nhl_forecast_store_sqlite::SqliteKvStore;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "nhlf")]
#[command(about = "NHL projection, reconciliation and pattern analysis CLI")]
pub struct Cli {
    #[arg(long, default_value = "./nhl_forecast.sqlite3")]
    db: PathBuf,

    /// Optional YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show sample data wherever live data is empty.
    #[arg(long)]
    sample: bool,

    #[arg(long, value_enum, default_value_t = ProviderArg::Http)]
    provider: ProviderArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderArg {
    Mock,
    Http,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Projections {
        #[command(subcommand)]
        command: ProjectionsCommand,
    },
    Results {
        #[command(subcommand)]
        command: ResultsCommand,
    },
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    Patterns {
        #[command(subcommand)]
        command: PatternsCommand,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Projections { .. } => "projections",
            Self::Results { .. } => "results",
            Self::History { .. } => "history",
            Self::Patterns { .. } => "patterns",
        }
    }

    fn calls_agent(&self) -> bool {
        matches!(
            self,
            Self::Projections {
                command: ProjectionsCommand::Generate(_)
            } | Self::Results { .. }
                | Self::Patterns { .. }
        )
    }
}

#[derive(Debug, Subcommand)]
pub enum ProjectionsCommand {
    Generate(GenerateArgs),
    Show(ProjectionsShowArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Slate date, `YYYY-MM-DD`. Defaults to today on the local clock.
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ProjectionsShowArgs {
    #[arg(long, value_enum, default_value_t = SortArg::Sog)]
    sort: SortArg,
    /// Fixture in `AWAY@HOME` form.
    #[arg(long)]
    game: Option<String>,
    #[arg(long)]
    hide_under_risk: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Sog,
    Pts,
    Sure2,
    Risk,
}

#[derive(Debug, Subcommand)]
pub enum ResultsCommand {
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Game date, `YYYY-MM-DD`.
    #[arg(long)]
    date: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    List(HistoryListArgs),
    Clear,
}

#[derive(Debug, Args)]
pub struct HistoryListArgs {
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum PatternsCommand {
    Analyze(JsonArgs),
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when configuration or store setup fails, when the HTTP
/// provider is selected without an endpoint, or when an agent stage fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => ForecastConfig::default(),
    };
    let store = SqliteKvStore::open_and_migrate(&cli.db, config.store.max_value_bytes)
        .with_context(|| format!("failed to prepare store at {}", cli.db.display()))?;
    let show_sample = cli.sample || config.show_sample;
    tracing::debug!(
        db = %cli.db.display(),
        provider = ?cli.provider,
        show_sample,
        "store opened"
    );

    // Read-only commands never reach the invoker, so they run without an
    // endpoint configured.
    match cli.provider {
        ProviderArg::Http if cli.command.calls_agent() => {
            let invoker = HttpAgentInvoker::new(config.endpoint.clone())?;
            run_command(open_session(store, invoker, &config, show_sample), cli.command)
        }
        _ => {
            let invoker = MockAgentInvoker::new(config.agents.clone());
            run_command(open_session(store, invoker, &config, show_sample), cli.command)
        }
    }
}

fn open_session<A: AgentInvoker>(
    store: SqliteKvStore,
    invoker: A,
    config: &ForecastConfig,
    show_sample: bool,
) -> ForecastSession<SqliteKvStore, A> {
    ForecastSession::new(store, invoker, config.agents.clone()).with_show_sample(show_sample)
}

/// Executes one command against an open session.
///
/// # Errors
/// Returns an error when a stage fails or output cannot be serialized.
pub fn run_command<S, A>(session: ForecastSession<S, A>, command: Command) -> Result<()>
where
    S: KeyValueStore,
    A: AgentInvoker,
{
    let name = command.name();
    let outcome = match command {
        Command::Projections { command } => run_projections(&session, command),
        Command::Results { command } => run_results(&session, command),
        Command::History { command } => run_history(&session, command),
        Command::Patterns { command } => run_patterns(&session, command),
    };
    match &outcome {
        Ok(()) => tracing::debug!(command = name, "command completed"),
        Err(err) => tracing::warn!(command = name, error = %err, "command failed"),
    }
    outcome
}

fn run_projections<S, A>(session: &ForecastSession<S, A>, command: ProjectionsCommand) -> Result<()>
where
    S: KeyValueStore,
    A: AgentInvoker,
{
    match command {
        ProjectionsCommand::Generate(args) => {
            let set = match args.date.as_deref() {
                Some(date) => session.generate_projections_for(parse_iso_date(date)?)?,
                None => session.generate_projections()?,
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&set)?);
            } else {
                print_projection_set(&set, &set.players);
            }
            Ok(())
        }
        ProjectionsCommand::Show(args) => {
            let query = PlayerQuery {
                sort: map_sort(args.sort),
                game: args.game.filter(|game| !game.trim().is_empty()),
                hide_under_risk: args.hide_under_risk,
            };
            let view = session.projections_view();
            let players = session.players_view(&query);
            if args.json {
                let payload = json!({
                    "date": &view.date,
                    "metadata": &view.metadata,
                    "game_options": view.game_options(),
                    "games": &view.games,
                    "players": &players,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_projection_set(&view, &players);
            }
            Ok(())
        }
    }
}

fn run_results<S, A>(session: &ForecastSession<S, A>, command: ResultsCommand) -> Result<()>
where
    S: KeyValueStore,
    A: AgentInvoker,
{
    match command {
        ResultsCommand::Reconcile(args) => {
            let report = session.reconcile_results(&args.date)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_reconciliation(&args.date, &report);
            }
            Ok(())
        }
    }
}

fn run_history<S, A>(session: &ForecastSession<S, A>, command: HistoryCommand) -> Result<()>
where
    S: KeyValueStore,
    A: AgentInvoker,
{
    match command {
        HistoryCommand::List(args) => {
            let filter = HistoryFilter {
                date_from: args.from,
                date_to: args.to,
                search: args.search,
            };
            let (rows, metrics) = session.history_rows(&filter);
            if args.json {
                let payload = json!({
                    "rows": &rows,
                    "metrics": &metrics,
                    "hit_rate": metrics.hit_rate_display(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            println!(
                "entries={} hits={} hit_rate={} dates={} unflagged={}",
                metrics.total,
                metrics.hits,
                metrics.hit_rate_display(),
                metrics.distinct_dates,
                metrics.unflagged
            );
            for row in &rows {
                println!(
                    "{:<10} {:<6} {:<16} {:<4} {:<22} {:<22} {:<3} {}",
                    row.date,
                    row.kind.as_str(),
                    row.name,
                    row.team,
                    row.projected,
                    row.actual,
                    if row.hit { "yes" } else { "no" },
                    row.flags.join(",")
                );
            }
            Ok(())
        }
        HistoryCommand::Clear => {
            if !session.clear_history() {
                return Err(anyhow!("failed to clear prediction history"));
            }
            println!("history cleared");
            Ok(())
        }
    }
}

fn run_patterns<S, A>(session: &ForecastSession<S, A>, command: PatternsCommand) -> Result<()>
where
    S: KeyValueStore,
    A: AgentInvoker,
{
    match command {
        PatternsCommand::Analyze(args) => {
            let analysis = session.analyze_patterns()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_patterns(&analysis);
            }
            Ok(())
        }
    }
}

fn map_sort(sort: SortArg) -> PlayerSort {
    match sort {
        SortArg::Sog => PlayerSort::Sog,
        SortArg::Pts => PlayerSort::Pts,
        SortArg::Sure2 => PlayerSort::Sure2,
        SortArg::Risk => PlayerSort::Risk,
    }
}

fn num(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.1}"))
}

fn signed(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:+.1}"))
}

fn text(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn print_projection_set(set: &ProjectionSet, players: &[nhl_forecast_core::PlayerProjection]) {
    println!(
        "generated_at={} games={} players={}",
        text(set.date.as_deref()),
        set.games.len(),
        players.len()
    );
    for game in &set.games {
        println!(
            "game {:<10} env={:<10} sog={}-{} goals={}-{} total={} flags={}",
            text(game.game.as_deref()),
            text(game.env.as_deref()),
            num(game.away_sog),
            num(game.home_sog),
            num(game.away_goals),
            num(game.home_goals),
            num(game.total),
            game.flags.join(",")
        );
    }
    for player in players {
        println!(
            "player {:<16} {}@{} line={} pp={} sog={} p2+={} pts={} p1+={} flags={}",
            text(player.player.as_deref()),
            text(player.team.as_deref()),
            text(player.opp.as_deref()),
            text(player.line.as_deref()),
            text(player.pp.as_deref()),
            num(player.sog),
            format_rate(player.p_2plus_sog),
            num(player.pts),
            format_rate(player.p_1plus_pts),
            player.flags.join(",")
        );
    }
}

fn print_accuracy(accuracy: &AccuracyData) {
    let strip = accuracy
        .kpis()
        .iter()
        .map(|kpi| format!("{}={} ({})", kpi.label, kpi.display, kpi.tier.as_str()))
        .collect::<Vec<_>>()
        .join(" ");
    println!("accuracy {strip}");
    for bucket in accuracy.calibration_buckets() {
        for entry in &bucket.entries {
            println!(
                "calibration range={} accuracy={} samples={}",
                bucket.range,
                format_rate(entry.accuracy),
                entry
                    .sample_size
                    .map_or_else(|| "-".to_string(), |size| size.to_string())
            );
        }
    }
}

fn print_reconciliation(date: &str, report: &ReconciliationReport) {
    let meta = report.metadata.clone().unwrap_or_default();
    println!(
        "date={} games_analyzed={} players_analyzed={}",
        meta.date.as_deref().unwrap_or(date),
        meta.games_analyzed.unwrap_or_default(),
        meta.players_analyzed.unwrap_or_default()
    );
    if let Some(accuracy) = &report.accuracy {
        print_accuracy(accuracy);
    }
    for game in &report.game_results {
        println!(
            "game {:<10} total={}->{} ({}) hit={} hit_flags={} missed_flags={}",
            text(game.game.as_deref()),
            num(game.projected_total),
            num(game.actual_total),
            signed(game.total_delta()),
            if game.is_hit() { "yes" } else { "no" },
            game.flags_hit.join(","),
            game.flags_missed.join(",")
        );
    }
    for player in &report.player_results {
        println!(
            "player {:<16} sog={}->{} ({}) pts={}->{} ({}) hit={}",
            text(player.player.as_deref()),
            num(player.projected_sog),
            num(player.actual_sog),
            signed(player.sog_delta()),
            num(player.projected_pts),
            num(player.actual_pts),
            signed(player.pts_delta()),
            if player.is_hit() { "yes" } else { "no" }
        );
    }
    for insight in &report.learning_insights {
        println!(
            "insight [{}] {} => {}",
            text(insight.category.as_deref()),
            text(insight.insight.as_deref()),
            text(insight.suggested_action.as_deref())
        );
    }
}

fn print_patterns(analysis: &PatternAnalysis) {
    if let Some(summary) = &analysis.summary {
        println!(
            "patterns_found={} top_hit_rate={} most_reliable={}",
            summary
                .total_patterns_found
                .map_or_else(|| "-".to_string(), |count| count.to_string()),
            summary.top_hit_rate_display(),
            text(summary.most_reliable_category.as_deref())
        );
        if let Some(recommendation) = &summary.overall_recommendation {
            println!("recommendation {recommendation}");
        }
    }
    for pattern in &analysis.patterns {
        println!(
            "pattern {} {:<28} hit_rate={} samples={} confidence={:?} risk={:?} signals={}",
            text(pattern.id.as_deref()),
            text(pattern.name.as_deref()),
            format_rate(pattern.hit_rate),
            pattern.sample_size.unwrap_or_default(),
            pattern.confidence_tier(),
            pattern.risk_tier(),
            pattern.signals.join(",")
        );
    }
    for anti in &analysis.anti_patterns {
        println!(
            "avoid {} {:<28} fail_rate={} warning={}",
            text(anti.id.as_deref()),
            text(anti.name.as_deref()),
            format_rate(anti.fail_rate),
            text(anti.warning.as_deref())
        );
    }
}
