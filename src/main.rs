//! Tree Runner - hierarchical test-tree runner
//!
//! Runs the built-in test plans under any of the four execution strategies
//! and renders a summary table, JSON, and optionally a JUnit XML report.
//!
//! ## Usage
//!
//! ```bash
//! # Run a plan in discovery order
//! tree-runner run --plan arithmetic
//!
//! # Reproducible random order
//! tree-runner run --plan nested --strategy shuffled --seed 42
//!
//! # Four threads, JUnit report
//! tree-runner run --plan bulk --strategy parallel --workers 4 --xml junit.xml
//!
//! # Four worker processes, only the parser subtree
//! tree-runner run --plan nested --strategy distributed -w 4 --filter nested.parser
//!
//! # List plans and their cases
//! tree-runner list --detailed
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, ListArgs, RunArgs, WorkerArgs};
use tree_runner::config::{EnvConfig, RunConfig};
use tree_runner::executor::worker::serve_stdio;
use tree_runner::executor::{Strategy, WorkerCommand};
use tree_runner::output::{format_listing, OutputFormat, ResultFormatter};
use tree_runner::plans;
use tree_runner::scheduler::Scheduler;
use tree_runner::utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let level = match (&args.command, args.verbose) {
        (_, true) => LogLevel::Debug,
        (Command::Worker(_), false) => LogLevel::Warn,
        _ => LogLevel::Info,
    };
    let level = match args.log_level.as_deref() {
        Some(name) => LogLevel::parse(name).ok_or_else(|| anyhow!("Unknown log level: {name}"))?,
        None => level,
    };
    init_logger(level);

    match args.command {
        Command::Run(run_args) => run_plan(run_args).await,
        Command::List(list_args) => {
            list_plans(list_args)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Worker(worker_args) => {
            serve_worker(worker_args).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Layer file, environment and flags into one run configuration
fn resolve_config(args: &RunArgs) -> Result<RunConfig> {
    let env = EnvConfig::load();
    if env.has_any() {
        debug!("Applying TREE_RUNNER_* environment overrides");
    }

    let config = match args.config.as_ref().or(env.config_file.as_ref()) {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::load_default()?,
    };
    let mut config = config.apply_env(&env)?;

    if let Some(strategy) = &args.strategy {
        config.strategy = strategy.parse::<Strategy>().context("Invalid --strategy")?;
    }
    if args.workers.is_some() {
        config.worker_count = args.workers;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.filter.is_some() {
        config.filter = args.filter.clone();
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.xml.is_some() {
        config.xml_output_path = args.xml.clone();
    }
    if let Some(format) = &args.format {
        config.format = format.clone();
    }

    if config.strategy == Strategy::Distributed && config.worker_command.is_none() {
        let command = WorkerCommand::current_exe(["worker", "--plan", args.plan.as_str()])
            .context("Failed to locate the running executable for worker processes")?;
        config.worker_command = Some(command);
    }

    config.validate()?;
    Ok(config)
}

async fn run_plan(args: RunArgs) -> Result<ExitCode> {
    let config = resolve_config(&args)?;

    let format = OutputFormat::parse(&config.format).ok_or_else(|| {
        anyhow!(
            "Unknown output format: {} (expected one of {})",
            config.format,
            OutputFormat::names().join(", ")
        )
    })?;

    let tree = plans::build(&args.plan).ok_or_else(|| {
        anyhow!(
            "Unknown plan: {} (available: {})",
            args.plan,
            plans::names().join(", ")
        )
    })?;

    info!(
        "Running plan '{}' ({} cases) with {} strategy",
        args.plan,
        tree.pending().len(),
        config.strategy
    );

    let scheduler = Scheduler::new(config);
    let abort = scheduler.abort_signal();

    let on_interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; letting in-flight cases finish");
            on_interrupt.abort();
        }
    });

    let outcome = scheduler.run_until(tree, abort).await?;

    let mut formatter = ResultFormatter::new(format);
    if args.no_color || !std::io::stdout().is_terminal() {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_run(&outcome)?);

    Ok(if outcome.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_plans(args: ListArgs) -> Result<()> {
    let names = match &args.plan {
        Some(plan) => vec![plan.as_str()],
        None => plans::names(),
    };

    for name in names {
        let tree = plans::build(name).with_context(|| format!("Unknown plan: {name}"))?;
        println!(
            "\n{} ({} cases) - {}",
            name,
            tree.pending().len(),
            plans::describe(name).unwrap_or_default()
        );
        println!("{:-<72}", "");
        print!("{}", format_listing(&tree, args.detailed));
    }
    println!();

    Ok(())
}

async fn serve_worker(args: WorkerArgs) -> Result<()> {
    let tree = plans::build(&args.plan).with_context(|| format!("Unknown plan: {}", args.plan))?;

    let served = tokio::task::spawn_blocking(move || serve_stdio(&tree))
        .await
        .context("Worker task failed")??;

    debug!("Worker for '{}' served {} cases", args.plan, served);
    Ok(())
}
