//! CLI command definitions for harness-bench.
//!
//! The `run` command is the orchestrator's entry point; the remaining
//! commands are read-only views over the definition catalog and the
//! result store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use crate::adapters::AdapterRegistry;
use crate::loader::{load_harnesses, load_suites, load_tasks};
use crate::orchestrator::{Orchestrator, RunPlan, RunProgress};
use crate::storage::{BenchStore, RunQuery};

/// Default per-run timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Database file name inside the data directory.
const DB_FILE: &str = "harness-bench.db";

/// Benchmark AI coding harnesses against standardized tasks.
#[derive(Parser, Debug)]
#[command(name = "harness-bench")]
#[command(about = "Benchmark AI coding harnesses against standardized tasks")]
#[command(version)]
#[command(
    long_about = "harness-bench runs external AI coding agents against benchmark tasks in isolated workspaces, grades the outcomes, and records runs and results for leaderboard ranking.\n\nExample usage:\n  harness-bench run --harness claude-code,aider --model claude-opus-4 --tasks typescript-challenges"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run benchmarks for the given harnesses against the task set.
    Run(RunArgs),

    /// List available benchmark tasks and suites.
    ListTasks(CatalogArgs),

    /// List harness definitions.
    ListHarnesses(CatalogArgs),

    /// View stored results and the leaderboard.
    Results(ResultsArgs),
}

/// Arguments for `harness-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Comma-separated harness ids (e.g. claude-code,aider).
    #[arg(long)]
    pub harness: String,

    /// Model id to run with (e.g. claude-opus-4).
    #[arg(long)]
    pub model: String,

    /// Restrict the run to one suite id.
    #[arg(long)]
    pub tasks: Option<String>,

    /// Per-task timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,

    /// Data directory with task/harness/model definitions.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,
}

/// Arguments for the catalog listing commands.
#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Data directory with task/harness/model definitions.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,
}

/// Arguments for `harness-bench results`.
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    /// Show the last N results.
    #[arg(long, default_value_t = 10)]
    pub last: i64,

    /// Filter by harness id.
    #[arg(long)]
    pub harness: Option<String>,

    /// Filter by model id.
    #[arg(long)]
    pub model: Option<String>,

    /// Data directory holding the result database.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,
}

/// Parses CLI arguments. Exits with a descriptive message on invalid or
/// missing required flags.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::ListTasks(args) => cmd_list_tasks(&args.data_dir),
        Commands::ListHarnesses(args) => cmd_list_harnesses(&args.data_dir),
        Commands::Results(args) => cmd_results(args).await,
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let harness_ids: Vec<String> = args
        .harness
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if harness_ids.is_empty() {
        bail!("--harness must name at least one harness id (e.g. --harness claude-code,aider)");
    }

    let all_tasks = load_tasks(&args.data_dir).context("loading tasks")?;
    let tasks: Vec<_> = match args.tasks {
        Some(ref suite_id) => all_tasks
            .into_iter()
            .filter(|t| t.suite_id == *suite_id)
            .collect(),
        None => all_tasks,
    };

    if tasks.is_empty() {
        bail!("No tasks found. Use --tasks <suite-id> or add tasks to data/tasks/");
    }

    println!(
        "Running {} task(s) x {} harness(es)",
        tasks.len(),
        harness_ids.len()
    );
    println!("Model: {}", args.model);
    println!("Timeout: {}ms", args.timeout);
    println!();

    let store = BenchStore::open(&args.data_dir.join(DB_FILE))
        .await
        .context("opening result store")?;
    let artifacts_dir = args.data_dir.join("artifacts");

    let plan = RunPlan {
        tasks,
        harness_ids,
        model_id: args.model,
        timeout: Duration::from_millis(args.timeout),
        env: BTreeMap::new(),
        data_dir: Some(args.data_dir.clone()),
    };

    let orchestrator = Orchestrator::new(AdapterRegistry::with_builtin());

    let mut print_progress = |progress: &RunProgress| {
        if let Some(ref current) = progress.current {
            println!(
                "[{}/{}] {} -> {}",
                progress.completed + 1,
                progress.total,
                current.harness_id,
                current.task_id
            );
        }
    };

    let reports = orchestrator
        .execute(&plan, &store, &artifacts_dir, Some(&mut print_progress))
        .await;

    println!();
    println!("Results:");
    println!("{}", "─".repeat(80));

    for report in &reports {
        let status = if report.result.passed { "PASS" } else { "FAIL" };
        println!(
            "  {}  {:<15} {:<30} score={:<6.1} cost=${:<8.4} {:.1}s",
            status,
            report.run.harness_id,
            report.run.task_id,
            report.result.score,
            report.result.metrics.cost_usd,
            report.result.metrics.wall_clock_ms as f64 / 1000.0
        );
    }

    info!("Batch finished with {} run(s)", reports.len());
    store.close().await;
    Ok(())
}

fn cmd_list_tasks(data_dir: &Path) -> anyhow::Result<()> {
    let tasks = load_tasks(data_dir).context("loading tasks")?;
    let suites = load_suites(data_dir).context("loading suites")?;

    if tasks.is_empty() {
        println!("No tasks found in {}", data_dir.join("tasks").display());
        return Ok(());
    }

    if !suites.is_empty() {
        println!("Task Suites:");
        println!();
        for suite in &suites {
            println!("  {:<25} {}", suite.id, suite.name);
            println!("  {:<25} {}", "", suite.description);
            println!();
        }
    }

    println!("Tasks:");
    println!();
    for task in &tasks {
        println!("  {:<35} {}", task.id, task.title);
        println!(
            "  {:<35} suite: {}  difficulty: {}  validation: {}",
            "", task.suite_id, task.difficulty, task.validation.kind
        );
        println!("  {:<35} tags: {}", "", task.tags.join(", "));
        println!();
    }

    Ok(())
}

fn cmd_list_harnesses(data_dir: &Path) -> anyhow::Result<()> {
    let harnesses = load_harnesses(data_dir).context("loading harnesses")?;

    if harnesses.is_empty() {
        println!(
            "No harnesses found in {}",
            data_dir.join("harnesses").display()
        );
        return Ok(());
    }

    println!("Available harnesses:");
    println!();
    for harness in &harnesses {
        println!("  {:<20} {}", harness.id, harness.name);
        println!(
            "  {:<20} provider: {}  executor: {}",
            "", harness.provider, harness.executor
        );
        println!(
            "  {:<20} capabilities: {}",
            "",
            harness.capabilities.enabled().join(", ")
        );
        println!();
    }

    Ok(())
}

async fn cmd_results(args: ResultsArgs) -> anyhow::Result<()> {
    let store = BenchStore::open(&args.data_dir.join(DB_FILE))
        .await
        .context("opening result store")?;

    let mut query = RunQuery::new().with_limit(args.last);
    if let Some(harness) = args.harness {
        query = query.with_harness(harness);
    }
    if let Some(model) = args.model {
        query = query.with_model(model);
    }

    let rows = store.get_runs_with_results(&query).await?;

    if rows.is_empty() {
        println!("No results found. Run benchmarks first with: harness-bench run");
        store.close().await;
        return Ok(());
    }

    println!("Recent Results:");
    println!("{}", "─".repeat(100));
    println!(
        "  {:<6} {:<15} {:<30} {:<8} {:<10} {:<10} {:<12}",
        "Status", "Harness", "Task", "Score", "Cost", "Duration", "Tokens"
    );
    println!("{}", "─".repeat(100));

    for row in &rows {
        let result = match row.result {
            Some(ref result) => result,
            None => continue,
        };
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!(
            "  {:<6} {:<15} {:<30} {:<8.1} ${:<9.4} {:<9.1}s {:<12}",
            status,
            row.run.harness_id,
            row.run.task_id,
            result.score,
            result.metrics.cost_usd,
            result.metrics.wall_clock_ms as f64 / 1000.0,
            result.metrics.tokens_input + result.metrics.tokens_output
        );
    }

    let leaderboard = store.get_leaderboard().await?;
    if !leaderboard.is_empty() {
        println!();
        println!("Leaderboard:");
        println!("{}", "─".repeat(80));
        println!(
            "  {:<15} {:<20} {:<10} {:<10} {:<10} {:<6}",
            "Harness", "Model", "Avg Score", "Pass Rate", "Avg Cost", "Runs"
        );
        println!("{}", "─".repeat(80));

        for entry in &leaderboard {
            println!(
                "  {:<15} {:<20} {:<10.1} {:<9.0}% ${:<9.4} {:<6}",
                entry.harness_id,
                entry.model_id,
                entry.avg_score,
                entry.pass_rate * 100.0,
                entry.avg_cost,
                entry.total_runs
            );
        }
    }

    store.close().await;
    Ok(())
}
