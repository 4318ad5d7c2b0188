//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hierarchical test-tree runner
#[derive(Parser, Debug)]
#[command(name = "tree-runner")]
#[command(version)]
#[command(about = "Run test trees sequentially, shuffled, on threads or across processes")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test plan
    Run(RunArgs),

    /// List available plans and their cases
    List(ListArgs),

    /// Serve cases to a distributed coordinator over stdin/stdout
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Plan to run
    #[arg(short, long, default_value = "arithmetic")]
    pub plan: String,

    /// Execution strategy (sequential, shuffled, parallel, distributed)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Worker threads or processes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Seed for the shuffled strategy
    #[arg(long)]
    pub seed: Option<u64>,

    /// Path prefix (root.math) or glob (*.parser.*) selecting cases
    #[arg(long)]
    pub filter: Option<String>,

    /// Stop starting new cases after this many seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Write a JUnit XML report to this path
    #[arg(short, long)]
    pub xml: Option<PathBuf>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list this plan
    #[arg(short, long)]
    pub plan: Option<String>,

    /// Show the suite hierarchy instead of flat case paths
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the worker command
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Plan to rebuild; must match the coordinator's
    #[arg(short, long)]
    pub plan: String,
}
