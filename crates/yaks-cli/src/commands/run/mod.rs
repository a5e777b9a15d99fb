//! `yaks run`: deploy and execute tests
//!
//! A run resolves the configuration next to the source, prepares the
//! namespace (optionally a temporary one with its own operator), runs the pre
//! steps, submits a `Test` resource per feature file, waits for the operator to
//! drive it to a terminal phase and always runs the post steps.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use yaks_common::kube_utils::create_client;

use crate::client::KubeTestClient;
use crate::console::Console;
use crate::{GlobalArgs, Result};

pub mod coordinator;
pub mod hooks;
pub mod namespace;
pub mod operator;
pub mod reconcile;
pub mod report;
pub mod watch;

pub use coordinator::Runner;

/// Namespace the test runs in
pub const NAMESPACE_ENV: &str = "YAKS_NAMESPACE";
/// Comma separated Maven repositories
pub const REPOSITORIES_ENV: &str = "YAKS_REPOSITORIES";
/// Comma separated Maven dependencies
pub const DEPENDENCIES_ENV: &str = "YAKS_DEPENDENCIES";
/// Comma separated `name=level` logger settings
pub const LOGGERS_ENV: &str = "YAKS_LOGGERS";
pub const CUCUMBER_OPTIONS_ENV: &str = "CUCUMBER_OPTIONS";
pub const CUCUMBER_GLUE_ENV: &str = "CUCUMBER_GLUE";
pub const CUCUMBER_FEATURES_ENV: &str = "CUCUMBER_FEATURES";
pub const CUCUMBER_FILTER_TAGS_ENV: &str = "CUCUMBER_FILTER_TAGS";

/// Format of the report written after a waiting run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Print the summary only
    #[default]
    Summary,
    /// Also write the results as JSON under `_output/`
    Json,
}

/// Arguments of `yaks run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Test to execute: a .feature file or a directory of them
    pub source: PathBuf,

    /// Maven repository URL added to the runtime
    #[arg(long = "maven-repository")]
    pub repositories: Vec<String>,

    /// Logger configuration, e.g. `org.example=DEBUG`
    #[arg(short = 'l', long = "logger")]
    pub loggers: Vec<String>,

    /// Runtime dependency loaded before the test runs, e.g. `groupId:artifactId:version`
    #[arg(short = 'd', long = "dependency")]
    pub dependencies: Vec<String>,

    /// Runtime settings file added to the test
    #[arg(short = 's', long)]
    pub settings: Option<String>,

    /// Environment variable of the test runtime, e.g. `-e MY_VAR=my-value`
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    /// Only run scenarios matching the tag expression
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,

    /// Feature file to include in the test run
    #[arg(short = 'f', long = "feature")]
    pub features: Vec<String>,

    /// Resource file added to the test
    #[arg(long = "resource")]
    pub resources: Vec<String>,

    /// Property file bound to the test
    #[arg(long = "property-file")]
    pub property_files: Vec<String>,

    /// Additional glue path of the Cucumber runtime
    #[arg(short = 'g', long = "glue")]
    pub glue: Vec<String>,

    /// Local library to upload for use by the tests. Not supported: publish
    /// the library to a Maven repository and pass it with `--dependency`
    #[arg(short = 'u', long = "upload")]
    pub uploads: Vec<String>,

    /// Cucumber runtime options
    #[arg(short = 'o', long)]
    pub options: Option<String>,

    /// Print the Test resource instead of running it. One of: yaml|json
    #[arg(long)]
    pub dump: Option<String>,

    /// Report produced after the run
    #[arg(short = 'r', long, value_enum, default_value_t = ReportFormat::Summary)]
    pub report: ReportFormat,

    /// Time to wait for each test to complete, e.g. `10m`
    #[arg(long)]
    pub timeout: Option<String>,

    /// Wait for tests to complete
    #[arg(short = 'w', long, action = ArgAction::Set, num_args = 0..=1,
          default_value_t = true, default_missing_value = "true")]
    pub wait: bool,

    /// Print test logs while waiting
    #[arg(long, action = ArgAction::Set, num_args = 0..=1,
          default_value_t = true, default_missing_value = "true")]
    pub logs: bool,

    /// Expose the test through a route for interactive scenario development
    #[arg(long)]
    pub dev: bool,

    /// Record a timeout as a test error instead of keeping the last observed phase
    #[arg(long)]
    pub fail_on_timeout: bool,
}

/// Execute `yaks run`
pub async fn run(
    args: RunArgs,
    globals: &GlobalArgs,
    console: Console,
    cancel: CancellationToken,
) -> Result<()> {
    let client = create_client(globals.kubeconfig.as_deref()).await?;
    let default_namespace = globals
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());
    info!(namespace = %default_namespace, source = %args.source.display(), "starting run");

    let runner = Runner::new(
        Arc::new(KubeTestClient::new(client)),
        console,
        args,
        default_namespace,
        globals.operator_image.clone(),
        cancel,
    );
    let results = runner.run_all().await;
    runner.finish(&results)
}

#[cfg(test)]
pub(crate) fn parse_args(argv: &[&str]) -> RunArgs {
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    Harness::parse_from(std::iter::once("yaks").chain(argv.iter().copied())).args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_and_logs_default_to_true() {
        let args = parse_args(&["hello.feature"]);
        assert!(args.wait);
        assert!(args.logs);
        assert!(!args.dev);
        assert_eq!(args.report, ReportFormat::Summary);
        assert_eq!(args.source, PathBuf::from("hello.feature"));
    }

    #[test]
    fn wait_can_be_disabled() {
        let args = parse_args(&["hello.feature", "--wait=false", "--logs", "false"]);
        assert!(!args.wait);
        assert!(!args.logs);
    }

    #[test]
    fn repeatable_flags_collect_values() {
        let args = parse_args(&[
            "tests/",
            "-t",
            "@smoke",
            "--tag",
            "@fast",
            "-e",
            "A=1",
            "--maven-repository",
            "https://repo.example/maven",
            "--report",
            "json",
        ]);
        assert_eq!(args.tags, vec!["@smoke", "@fast"]);
        assert_eq!(args.env, vec!["A=1"]);
        assert_eq!(args.repositories.len(), 1);
        assert_eq!(args.report, ReportFormat::Json);
    }

    #[test]
    fn upload_flag_is_accepted() {
        let args = parse_args(&["tests/", "-u", "lib/steps", "--upload", "lib/more"]);
        assert_eq!(args.uploads, vec!["lib/steps", "lib/more"]);
    }
}
