//! Run coordination and result aggregation
//!
//! A source is either a single feature file or a directory. Each source gets
//! its configuration, namespace, operator and hooks once; every feature file
//! below it is then submitted and awaited one after another. Failures are
//! recorded per file so one broken test never stops the rest of a group.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use yaks_common::crd::{TestResults, TestSuite};

use super::hooks::HookRunner;
use super::namespace::NamespaceManager;
use super::operator::OperatorBootstrapper;
use super::reconcile::{build_test, create_or_update, dump_test};
use super::report::{print_summary, write_json_report, REPORT_DIR};
use super::watch::{resolve_timeout, PhaseWatcher, WaitOutcome, WaitStrategy};
use super::{ReportFormat, RunArgs};
use crate::client::TestClient;
use crate::config::{load_run_config, RunConfig, FEATURE_SUFFIX};
use crate::console::Console;
use crate::error::PhaseExt;
use crate::{Error, Result};

/// What happened to a single feature file
enum TestRun {
    /// The resource was printed, not submitted
    Dumped,
    /// The resource was submitted; `outcome` is the verdict on the test
    Completed {
        reported: Option<TestSuite>,
        outcome: Result<()>,
    },
}

pub struct Runner<C: ?Sized> {
    client: Arc<C>,
    console: Console,
    args: RunArgs,
    default_namespace: String,
    operator_image: String,
    cancel: CancellationToken,
    report_dir: PathBuf,
}

impl<C: TestClient + ?Sized + 'static> Runner<C> {
    pub fn new(
        client: Arc<C>,
        console: Console,
        args: RunArgs,
        default_namespace: String,
        operator_image: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            console,
            args,
            default_namespace,
            operator_image,
            cancel,
            report_dir: PathBuf::from(REPORT_DIR),
        }
    }

    /// Write report files below `dir` instead of `_output`
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Run the configured source, collecting one suite per feature file
    pub async fn run_all(&self) -> TestResults {
        let mut results = TestResults::default();
        let source = self.args.source.clone();

        if source.is_dir() {
            self.run_group(&source, &mut results).await;
        } else {
            self.run_with_environment(&source, &mut results).await;
        }

        info!(suites = results.suites.len(), "run finished");
        results
    }

    /// Report the results; fails when any suite recorded errors
    pub fn finish(&self, results: &TestResults) -> Result<()> {
        let show = if self.args.dump.is_some() {
            results.has_errors()
        } else {
            self.args.wait
        };

        if show {
            print_summary(&self.console, results);
            if self.args.report == ReportFormat::Json {
                let path = write_json_report(results, &self.report_dir)?;
                self.console
                    .println(format!("Results written to {}", path.display()));
            }
        }

        if results.has_errors() {
            return Err(Error::TestFailures);
        }
        Ok(())
    }

    fn run_group<'a>(
        &'a self,
        dir: &'a Path,
        results: &'a mut TestResults,
    ) -> LocalBoxFuture<'a, ()> {
        async move { self.run_with_environment(dir, results).await }.boxed_local()
    }

    /// Prepare configuration, namespace and operator for `source`, run it and tear down
    #[instrument(skip_all, fields(source = %source.display()))]
    async fn run_with_environment(&self, source: &Path, results: &mut TestResults) {
        if self.stop_if_cancelled(source, results) {
            return;
        }

        let mut config = match load_run_config(source, &self.default_namespace) {
            Ok(config) => config,
            Err(e) => return record_error(results, source, &e),
        };

        if self.args.dump.is_some() {
            return self.run_target(source, &config, results).await;
        }

        if !self.args.uploads.is_empty() {
            let e = Error::config(format!(
                "uploading local artifacts is not supported ({}): publish them to a Maven \
                 repository and pass them with --dependency",
                self.args.uploads.join(", ")
            ));
            return record_error(results, source, &e);
        }

        let namespaces = NamespaceManager::new(&*self.client, &self.console);
        let handle = match namespaces.ensure_namespace(&mut config).await {
            Ok(handle) => handle,
            Err(e) => return record_error(results, source, &e),
        };

        let operator = match &handle {
            Some(handle) => {
                OperatorBootstrapper::new(
                    &*self.client,
                    &self.console,
                    &self.operator_image,
                    &self.default_namespace,
                )
                .ensure_operator(&config, handle.flavor)
                .await
            }
            None => Ok(()),
        };

        match operator {
            Ok(()) => self.run_hooked(source, &config, results).await,
            Err(e) => record_error(results, source, &e),
        }

        if let Some(handle) = handle {
            if config.config.namespace.auto_remove && self.args.wait {
                namespaces.remove_namespace(&handle).await;
            }
        }
    }

    /// Run the pre steps, the tests and finally the post steps
    async fn run_hooked(&self, source: &Path, config: &RunConfig, results: &mut TestResults) {
        if self.stop_if_cancelled(source, results) {
            return;
        }
        let hooks = HookRunner::new(&self.console, config.namespace(), &config.base_dir);

        match hooks.run_steps(&config.pre).await {
            Ok(()) => self.run_target(source, config, results).await,
            Err(e) => record_error(results, source, &e),
        }

        if let Err(e) = hooks.run_steps(&config.post).await {
            warn!(error = %e, "post steps failed");
            self.console
                .eprintln(format!("Failed to run post steps: {}", e));
        }
    }

    async fn run_target(&self, source: &Path, config: &RunConfig, results: &mut TestResults) {
        if !source.is_dir() {
            if self.stop_if_cancelled(source, results) {
                return;
            }
            return self.run_one(source, config, results).await;
        }

        let entries = match sorted_entries(source) {
            Ok(entries) => entries,
            Err(e) => return record_error(results, source, &e),
        };

        for entry in entries {
            if self.stop_if_cancelled(source, results) {
                break;
            }
            if entry.is_dir() {
                if config.is_recursive() {
                    self.run_group(&entry, results).await;
                } else {
                    debug!(dir = %entry.display(), "skipping subdirectory");
                }
            } else if is_feature(&entry) {
                self.run_one(&entry, config, results).await;
            }
        }
    }

    async fn run_one(&self, source: &Path, config: &RunConfig, results: &mut TestResults) {
        let name = source.display().to_string();

        match self.submit(source, config).await {
            Ok(TestRun::Dumped) => {}
            Ok(TestRun::Completed { reported, outcome }) => {
                let mut suite = TestSuite::new(name);
                if let Some(reported) = &reported {
                    suite.append_results(reported);
                }
                if let Err(e) = outcome {
                    suite.errors.push(e.to_string());
                }
                results.push(suite);
            }
            Err(e) => record_error(results, source, &e),
        }
    }

    /// Build, submit and await the Test of one feature file
    async fn submit(&self, source: &Path, config: &RunConfig) -> Result<TestRun> {
        let test = build_test(source, config, &self.args)?;

        if let Some(format) = &self.args.dump {
            dump_test(&test, format, &self.console)?;
            return Ok(TestRun::Dumped);
        }

        let test = create_or_update(&*self.client, &self.console, &test).await?;
        let name = test.name_any();

        if !self.args.wait {
            self.console.println(format!("Test '{}' started", name));
            return Ok(TestRun::Completed {
                reported: None,
                outcome: Ok(()),
            });
        }

        let strategy = if self.args.dev {
            WaitStrategy::Route
        } else {
            WaitStrategy::Phase {
                timeout: resolve_timeout(
                    self.args.timeout.as_deref(),
                    &config.config.timeout,
                    &self.console,
                ),
            }
        };

        let watched = PhaseWatcher::new(self.client.clone(), self.console.clone())
            .await_terminal_state(
                config.namespace(),
                &name,
                strategy,
                self.args.logs,
                &self.cancel,
            )
            .await;

        let phase = watched.outcome.phase();
        let outcome = match watched.outcome {
            WaitOutcome::ExternallyCancelled { .. } => {
                self.console
                    .println(format!("Test '{}' interrupted with status: {}", name, phase));
                return Ok(TestRun::Completed {
                    reported: watched.results,
                    outcome: Err(Error::interrupted(format!(
                        "stopped waiting for test '{}' in status {}",
                        name, phase
                    ))),
                });
            }
            WaitOutcome::TimedOut { .. } if self.args.fail_on_timeout => Err(Error::timeout(
                format!("test '{}' did not finish in time, last status {}", name, phase),
            )),
            _ => phase.as_error(&name),
        };
        self.console
            .println(format!("Test '{}' finished with status: {}", name, phase));

        Ok(TestRun::Completed {
            reported: watched.results,
            outcome,
        })
    }
}

impl<C: ?Sized> Runner<C> {
    /// Record an interruption for `source` once the run has been cancelled
    fn stop_if_cancelled(&self, source: &Path, results: &mut TestResults) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        record_error(
            results,
            source,
            &Error::interrupted("remaining tests were not started"),
        );
        true
    }
}

fn record_error(results: &mut TestResults, source: &Path, err: &Error) {
    warn!(source = %source.display(), error = %err, "test setup failed");
    results.push(TestSuite::from_error(
        source.display().to_string(),
        err.suite_line(),
    ));
}

fn is_feature(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(FEATURE_SUFFIX))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
