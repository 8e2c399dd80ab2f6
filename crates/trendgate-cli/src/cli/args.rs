use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use trendgate_core::gate::GateMode;

#[derive(Parser)]
#[command(
    name = "trendgate",
    version,
    about = "Track build metrics across CI runs, gate pull requests against a baseline, render trend reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Record one CI run's metrics in the database
    Record(RecordArgs),
    /// Evaluate the quality gate for the current run against the reference-branch baseline
    Gate(GateArgs),
    /// Render the HTML trend report
    Report(ReportArgs),
    Version,
}

#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    /// Config file (defaults to trendgate.yaml when present)
    #[arg(long, env = "TRENDGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path or object-store URL; overrides `database` from the config
    #[arg(long, env = "TRENDGATE_DATABASE")]
    pub database: Option<String>,
}

/// Identity of the current run plus its collected values.
#[derive(Args, Clone, Debug)]
pub struct BuildArgs {
    /// Collector output: JSON array of {name, type?, unit?, description?, value}. `-` reads stdin
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Inline metric as NAME=VALUE (repeatable)
    #[arg(long = "metric", value_name = "NAME=VALUE")]
    pub metrics: Vec<String>,

    #[arg(long, env = "GITHUB_SHA")]
    pub commit: Option<String>,

    #[arg(long, env = "GITHUB_REF_NAME")]
    pub branch: Option<String>,

    #[arg(long, env = "GITHUB_RUN_ID")]
    pub run_id: Option<String>,

    #[arg(long, env = "GITHUB_RUN_NUMBER", default_value_t = 0)]
    pub run_number: u64,

    /// Build timestamp (RFC 3339); defaults to now
    #[arg(long)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Parser, Clone, Debug)]
pub struct RecordArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub build: BuildArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum GateModeArg {
    Off,
    Soft,
    Hard,
}

impl From<GateModeArg> for GateMode {
    fn from(mode: GateModeArg) -> Self {
        match mode {
            GateModeArg::Off => GateMode::Off,
            GateModeArg::Soft => GateMode::Soft,
            GateModeArg::Hard => GateMode::Hard,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct GateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub build: BuildArgs,

    /// Override quality_gate.mode
    #[arg(long, value_enum)]
    pub mode: Option<GateModeArg>,

    /// Override baseline.reference_branch
    #[arg(long)]
    pub reference_branch: Option<String>,

    /// Write the gate result as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Write the gate result as a Markdown PR comment
    #[arg(long)]
    pub markdown: Option<PathBuf>,

    /// Record this run after evaluating it (its values never enter its own baseline)
    #[arg(long)]
    pub record: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Output path; overrides report.output
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// Restrict the report to one branch (defaults to the baseline reference branch)
    #[arg(long, conflicts_with = "all_branches")]
    pub branch: Option<String>,

    /// Report every recorded branch, including pull-request runs
    #[arg(long)]
    pub all_branches: bool,

    /// Plot only recorded points instead of aligning every series to the build list
    #[arg(long)]
    pub no_fill_gaps: bool,
}
