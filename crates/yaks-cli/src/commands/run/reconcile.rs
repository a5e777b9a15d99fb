//! Building and submitting the `Test` resource of a source

use std::path::Path;

use kube::ResourceExt;
use tracing::{debug, instrument};
use yaks_common::crd::{
    KubeDockSpec, Language, ResourceSpec, SeleniumSpec, SettingsSpec, SourceSpec, Test, TestPhase,
    TestSpec, TestStatus,
};
use yaks_common::sanitize::{sanitize_file_name, sanitize_name};

use super::{
    RunArgs, CUCUMBER_FEATURES_ENV, CUCUMBER_FILTER_TAGS_ENV, CUCUMBER_GLUE_ENV,
    CUCUMBER_OPTIONS_ENV, DEPENDENCIES_ENV, LOGGERS_ENV, NAMESPACE_ENV, REPOSITORIES_ENV,
};
use crate::client::TestClient;
use crate::config::RunConfig;
use crate::console::Console;
use crate::{Error, Result};

/// Name of the settings synthesized from the run configuration
pub const SETTINGS_FILE: &str = "yaks.settings.yaml";

/// Sidecar image giving tests a Docker API when testcontainers is enabled
pub const KUBEDOCK_IMAGE: &str = "joyrex2001/kubedock:0.7.0";

/// Build the Test resource for a source without touching the cluster
pub fn build_test(source: &Path, config: &RunConfig, args: &RunArgs) -> Result<Test> {
    let raw = source.to_string_lossy();
    let name = sanitize_name(&raw);
    if name.is_empty() {
        return Err(Error::config(format!(
            "unable to determine test name for {}",
            source.display()
        )));
    }

    let runtime = &config.config.runtime;
    let mut spec = TestSpec {
        source: SourceSpec {
            name: sanitize_file_name(&raw),
            content: load_data(source)?,
            language: Language::Gherkin,
        },
        dev: args.dev,
        ..Default::default()
    };

    for resource in runtime
        .resources
        .iter()
        .chain(&args.resources)
        .chain(&args.property_files)
    {
        spec.resources.push(ResourceSpec {
            name: base_name(resource),
            content: load_data(&config.resolve_path(resource))?,
        });
    }

    spec.settings = build_settings(config, args)?;
    spec.env = build_env(config, args);

    if !runtime.secret.is_empty() {
        spec.secret = Some(runtime.secret.clone());
    }
    if !runtime.selenium.image.is_empty() {
        spec.selenium = Some(SeleniumSpec {
            image: runtime.selenium.image.clone(),
        });
    }
    if runtime.test_containers.enabled {
        spec.kube_dock = Some(KubeDockSpec {
            image: KUBEDOCK_IMAGE.to_string(),
        });
    }

    let mut test = Test::new(&name, spec);
    // a temporary namespace has no name until the run creates it
    if !config.namespace().is_empty() {
        test.metadata.namespace = Some(config.namespace().to_string());
    }
    Ok(test)
}

/// Settings of the test: an explicit settings file wins over configured settings
pub fn build_settings(config: &RunConfig, args: &RunArgs) -> Result<Option<SettingsSpec>> {
    if let Some(file) = &args.settings {
        return Ok(Some(SettingsSpec {
            name: sanitize_file_name(file),
            content: load_data(&config.resolve_path(file))?,
        }));
    }

    let settings = &config.config.runtime.settings;
    if settings.is_empty() {
        return Ok(None);
    }
    Ok(Some(SettingsSpec {
        name: SETTINGS_FILE.to_string(),
        content: serde_yaml::to_string(settings)?,
    }))
}

/// Environment of the test runtime as `KEY=VALUE` entries.
///
/// Later entries replace earlier ones with the same key, so `-e` flags win.
pub fn build_env(config: &RunConfig, args: &RunArgs) -> Vec<String> {
    let cucumber = &config.config.runtime.cucumber;
    let mut env = Vec::new();

    if !config.namespace().is_empty() {
        push_env(&mut env, NAMESPACE_ENV, config.namespace());
    }

    if !args.tags.is_empty() {
        push_env(&mut env, CUCUMBER_FILTER_TAGS_ENV, &args.tags.join(","));
    } else if !cucumber.tags.is_empty() {
        push_env(&mut env, CUCUMBER_FILTER_TAGS_ENV, &cucumber.tags.join(","));
    }

    if !args.features.is_empty() {
        push_env(&mut env, CUCUMBER_FEATURES_ENV, &args.features.join(","));
    }

    if !args.glue.is_empty() {
        push_env(&mut env, CUCUMBER_GLUE_ENV, &args.glue.join(","));
    } else if !cucumber.glue.is_empty() {
        push_env(&mut env, CUCUMBER_GLUE_ENV, &cucumber.glue.join(","));
    }

    match args.options.as_deref() {
        Some(options) if !options.is_empty() => push_env(&mut env, CUCUMBER_OPTIONS_ENV, options),
        _ if !cucumber.options.is_empty() => {
            push_env(&mut env, CUCUMBER_OPTIONS_ENV, &cucumber.options)
        }
        _ => {}
    }

    if !args.repositories.is_empty() {
        push_env(&mut env, REPOSITORIES_ENV, &args.repositories.join(","));
    }
    if !args.dependencies.is_empty() {
        push_env(&mut env, DEPENDENCIES_ENV, &args.dependencies.join(","));
    }
    if !args.loggers.is_empty() {
        push_env(&mut env, LOGGERS_ENV, &args.loggers.join(","));
    }

    for entry in &config.config.runtime.env {
        push_env(&mut env, &entry.name, &entry.value);
    }

    for entry in &args.env {
        let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
        push_env(&mut env, key, value);
    }

    env
}

fn push_env(env: &mut Vec<String>, key: &str, value: &str) {
    let entry = format!("{}={}", key, value);
    let prefix = format!("{}=", key);
    match env.iter_mut().find(|existing| existing.starts_with(&prefix)) {
        Some(existing) => *existing = entry,
        None => env.push(entry),
    }
}

/// Print the Test resource in the requested format instead of submitting it
pub fn dump_test(test: &Test, format: &str, console: &Console) -> Result<()> {
    match format {
        "yaml" => console.print(&serde_yaml::to_string(test)?),
        "json" => console.println(serde_json::to_string_pretty(test)?),
        other => {
            return Err(Error::format(format!(
                "invalid dump output format option '{}', should be one of: yaml|json",
                other
            )))
        }
    }
    Ok(())
}

/// Create the Test, or update it in place when it already exists.
///
/// An update holds the resource by setting its phase to `Updating`, replaces
/// spec and metadata under the held resource version and finally resets the
/// status so the operator starts from a clean state. A version conflict during
/// the update is retried once.
#[instrument(skip_all, fields(test = %test.name_any()))]
pub async fn create_or_update<C: TestClient + ?Sized>(
    client: &C,
    console: &Console,
    test: &Test,
) -> Result<Test> {
    let name = test.name_any();

    match client.create_test(test).await {
        Ok(created) => {
            console.println(format!("Test '{}' created", name));
            return Ok(created);
        }
        Err(e) if e.is_already_exists() => debug!("test exists, updating"),
        Err(e) => return Err(e),
    }

    let updated = match update_existing(client, test).await {
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "update conflicted, retrying once");
            update_existing(client, test).await?
        }
        other => other?,
    };

    console.println(format!("Test '{}' updated", name));
    Ok(updated)
}

async fn update_existing<C: TestClient + ?Sized>(client: &C, desired: &Test) -> Result<Test> {
    let namespace = desired.namespace().unwrap_or_default();
    let mut current = client.get_test(&namespace, &desired.name_any()).await?;

    current.status.get_or_insert_with(TestStatus::default).phase = TestPhase::Updating;
    let held = client.replace_test_status(&current).await?;

    let mut replacement = desired.clone();
    replacement.metadata.resource_version = held.resource_version();
    let mut updated = client.replace_test(&replacement).await?;

    updated.status = Some(TestStatus::default());
    client.replace_test_status(&updated).await
}

fn load_data(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))
}

fn base_name(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}
