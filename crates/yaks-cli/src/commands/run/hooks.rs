//! Pre and post steps of a run
//!
//! A step executes a script file or an inline command block with the test
//! namespace exported as `YAKS_NAMESPACE` and the base directory as working
//! directory. Its `if` expression is parsed into [`StepConditions`] that must
//! all hold for the step to run.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use yaks_common::duration::parse_duration;
use yaks_common::DEFAULT_TIMEOUT;

use super::NAMESPACE_ENV;
use crate::config::StepConfig;
use crate::console::Console;
use crate::{Error, Result};

/// Header of the temporary script an inline `run` block is written to
const INLINE_SCRIPT_HEADER: &str = "#!/bin/bash\n\nset -e\n\n";

/// How long output of an exited script is still forwarded
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Operating system name as used in step conditions and script paths
pub fn platform_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// CPU architecture name as used in script paths
pub fn platform_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Substitute `{{os.type}}` and `{{os.arch}}` in a script path
pub fn resolve_placeholders(path: &str) -> String {
    path.replace("{{os.type}}", platform_os())
        .replace("{{os.arch}}", platform_arch())
}

/// One clause of a step's `if` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepCondition {
    /// `os=<name>`
    OsEquals(String),
    /// `env:<NAME>`, the variable must be set, its value is ignored
    EnvPresent(String),
    /// `env:<NAME>=<value>`
    EnvEquals { name: String, value: String },
    /// Any other clause; never causes a skip
    Unrecognized(String),
}

impl StepCondition {
    pub fn holds(&self, os: &str, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        match self {
            StepCondition::OsEquals(expected) => expected == os,
            StepCondition::EnvPresent(name) => lookup(name).is_some(),
            StepCondition::EnvEquals { name, value } => lookup(name).as_deref() == Some(value),
            StepCondition::Unrecognized(_) => true,
        }
    }
}

impl StepCondition {
    /// Parse one clause; clauses other than `os=` and `env:` are kept as unrecognized
    pub fn parse(clause: &str) -> Self {
        let clause = clause.trim();
        if let Some(os) = clause.strip_prefix("os=") {
            return StepCondition::OsEquals(os.to_string());
        }
        if let Some(env) = clause.strip_prefix("env:") {
            return match env.split_once('=') {
                Some((name, value)) => StepCondition::EnvEquals {
                    name: name.to_string(),
                    value: value.to_string(),
                },
                None => StepCondition::EnvPresent(env.to_string()),
            };
        }
        StepCondition::Unrecognized(clause.to_string())
    }
}

/// Conjunction of step conditions, empty means always run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepConditions(Vec<StepCondition>);

impl StepConditions {
    pub fn holds(&self, os: &str, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        self.0.iter().all(|condition| condition.holds(os, lookup))
    }
}

impl StepConditions {
    /// Parse a ` && ` separated expression
    pub fn parse(expr: &str) -> Self {
        if expr.trim().is_empty() {
            return Self::default();
        }
        Self(expr.split(" && ").map(StepCondition::parse).collect())
    }

    /// Clauses that are ignored when the step is evaluated
    pub fn unrecognized(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|condition| match condition {
            StepCondition::Unrecognized(clause) => Some(clause.as_str()),
            _ => None,
        })
    }
}

/// Runs step lists for one namespace and base directory
pub struct HookRunner<'a> {
    console: &'a Console,
    namespace: &'a str,
    base_dir: &'a Path,
}

impl<'a> HookRunner<'a> {
    pub fn new(console: &'a Console, namespace: &'a str, base_dir: &'a Path) -> Self {
        Self {
            console,
            namespace,
            base_dir,
        }
    }

    /// Run steps in order, stopping at the first failure
    #[instrument(skip(self, steps), fields(namespace = %self.namespace, steps = steps.len()))]
    pub async fn run_steps(&self, steps: &[StepConfig]) -> Result<()> {
        let lookup = |name: &str| std::env::var(name).ok();

        for (idx, step) in steps.iter().enumerate() {
            let name = if step.name.is_empty() {
                format!("step-{}", idx)
            } else {
                step.name.clone()
            };

            let conditions = StepConditions::parse(&step.condition);
            for clause in conditions.unrecognized() {
                warn!(step = %name, clause = %clause, "ignoring unrecognized step condition");
            }
            if !conditions.holds(platform_os(), &lookup) {
                self.console.println(format!("Skip {}", name));
                continue;
            }

            if !step.script.is_empty() {
                let script = resolve_placeholders(&step.script);
                self.run_script(Path::new(&script), &name, &step.timeout)
                    .await?;
            }

            if !step.run.is_empty() {
                let script = write_inline_script(&step.run)
                    .map_err(|e| Error::hook(format!("Failed to run {}: {}", name, e)))?;
                self.run_script(script.path(), &name, &step.timeout).await?;
            }
        }

        Ok(())
    }

    async fn run_script(&self, script: &Path, desc: &str, timeout: &str) -> Result<()> {
        let timeout = step_timeout(timeout)
            .map_err(|e| Error::hook(format!("Failed to run {}: {}", desc, e)))?;

        self.console.println(format!("Running {}:", desc));
        debug!(script = %script.display(), ?timeout, "running step");

        let mut child = Command::new(interpreter())
            .arg(script)
            .current_dir(self.base_dir)
            .env(NAMESPACE_ENV, self.namespace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::hook(format!("Failed to run {}: {}", desc, e)))?;

        let forwarders = [
            tokio::spawn(forward_lines(child.stdout.take(), self.console.clone(), false)),
            tokio::spawn(forward_lines(child.stderr.take(), self.console.clone(), true)),
        ];

        // background jobs of the script may keep the pipes open after it exits
        let finished = tokio::time::timeout(timeout, child.wait()).await;
        if finished.is_err() {
            let _ = child.kill().await;
        }
        for mut forwarder in forwarders {
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut forwarder)
                .await
                .is_err()
            {
                forwarder.abort();
            }
        }

        let failure = match finished {
            Ok(Ok(status)) if status.success() => return Ok(()),
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", timeout),
        };

        let message = format!("Failed to run {}: {}", desc, failure);
        self.console.eprintln(&message);
        Err(Error::hook(message))
    }
}

fn step_timeout(timeout: &str) -> Result<Duration> {
    let timeout = if timeout.is_empty() {
        DEFAULT_TIMEOUT
    } else {
        timeout
    };
    Ok(parse_duration(timeout)?)
}

fn interpreter() -> &'static str {
    if cfg!(windows) {
        "powershell.exe"
    } else {
        "/bin/bash"
    }
}

/// Materialize an inline command block as an executable temporary script
fn write_inline_script(commands: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("yaks-script-")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(INLINE_SCRIPT_HEADER.as_bytes())?;
    file.write_all(commands.as_bytes())?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o777))?;
    }

    Ok(file)
}

async fn forward_lines<R>(pipe: Option<R>, console: Console, to_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if to_stderr {
            console.eprintln(line);
        } else {
            console.println(line);
        }
    }
}
