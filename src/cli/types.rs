//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::services::TriggerKind;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - continuous verification scheduler", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to vigil.yaml plus VIGIL_* overrides)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one scheduler entry point for an account
    Trigger {
        #[command(subcommand)]
        entry: TriggerCommands,

        /// Account to run the entry point for
        #[arg(short, long, global = true)]
        account: Option<String>,
    },

    /// Run every entry point for the configured accounts on each tick
    Run,

    /// Monitored configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Analysis task inspection
    #[command(subcommand)]
    Tasks(TaskCommands),

    /// Workflow context data collection
    #[command(subcommand)]
    Workflow(WorkflowCommands),

    /// Apply embedded database migrations
    Migrate,
}

#[derive(Subcommand, Clone, Copy)]
pub enum TriggerCommands {
    /// Collect the next metric window
    MetricCollection,
    /// Collect the next log window
    LogCollection,
    /// Queue time-series analysis tasks
    TimeSeriesAnalysis,
    /// Queue L1 log clustering tasks
    LogL1Clustering,
    /// Queue L2 log clustering tasks
    LogL2Clustering,
    /// Queue log-ML analysis tasks
    LogAnalysis,
    /// Queue feedback analysis tasks
    FeedbackAnalysis,
    /// Hand queued collection tasks to the collector
    ProcessNextTasks,
    /// Time out collection tasks running too long
    ExpireLongRunningTasks,
    /// Requeue failed collection tasks
    RetryTasks,
    /// Remove stuck lock records
    CleanupStuckLocks,
}

impl TriggerCommands {
    pub fn kind(self) -> TriggerKind {
        match self {
            Self::MetricCollection => TriggerKind::MetricCollection,
            Self::LogCollection => TriggerKind::LogCollection,
            Self::TimeSeriesAnalysis => TriggerKind::TimeSeriesAnalysis,
            Self::LogL1Clustering => TriggerKind::LogL1Clustering,
            Self::LogL2Clustering => TriggerKind::LogL2Clustering,
            Self::LogAnalysis => TriggerKind::LogAnalysis,
            Self::FeedbackAnalysis => TriggerKind::FeedbackAnalysis,
            Self::ProcessNextTasks => TriggerKind::ProcessNextTasks,
            Self::ExpireLongRunningTasks => TriggerKind::ExpireLongRunningTasks,
            Self::RetryTasks => TriggerKind::RetryTasks,
            Self::CleanupStuckLocks => TriggerKind::CleanupStuckLocks,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Import monitored configurations from a YAML file
    Import {
        /// YAML file with a `configurations` list
        file: PathBuf,
    },

    /// List monitored configurations
    List {
        /// Only show enabled configurations
        #[arg(long)]
        enabled_only: bool,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List analysis tasks
    List {
        /// Filter by status (queued, running, success, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by configuration id
        #[arg(long)]
        config_id: Option<String>,

        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Trigger collection of the next minute for a context
    Collect {
        /// Analysis context id
        context_id: String,
    },

    /// Mark a context's per-minute collection finished
    Done {
        /// Analysis context id
        context_id: String,
    },
}
