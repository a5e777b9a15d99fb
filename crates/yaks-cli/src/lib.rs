//! YAKS command line library

pub mod client;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use yaks_common::telemetry::LogFormat;

use crate::commands::run::operator::DEFAULT_OPERATOR_IMAGE;
use crate::console::Console;

/// YAKS - declarative tests for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "yaks")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Namespace to run in, defaults to the kubeconfig context namespace
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Operator image installed into temporary namespaces
    #[arg(long, global = true, env = "YAKS_IMAGE", default_value = DEFAULT_OPERATOR_IMAGE)]
    pub operator_image: String,

    /// Format of diagnostic logs written to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy and execute tests on the cluster
    Run(commands::run::RunArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self, console: Console, cancel: CancellationToken) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args, &self.globals, console, cancel).await,
        }
    }
}
