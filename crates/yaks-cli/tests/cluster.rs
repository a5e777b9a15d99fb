//! Integration tests against a live cluster
//!
//! These tests need a Kubernetes cluster with the YAKS operator watching the
//! target namespace, so they are ignored by default:
//!
//! ```bash
//! YAKS_TEST_NAMESPACE=yaks cargo test -p yaks-cli --test cluster -- --ignored
//! ```

use std::sync::Arc;

use clap::Parser;
use kube::api::{Api, DeleteParams};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

use yaks_cli::client::{KubeTestClient, TestClient};
use yaks_cli::commands::run::reconcile::build_test;
use yaks_cli::commands::run::Runner;
use yaks_cli::config::load_run_config;
use yaks_cli::console::Console;
use yaks_cli::{Cli, Commands};
use yaks_common::crd::Test;
use yaks_common::kube_utils::create_client;

const FEATURE: &str = "Feature: hello\n  Scenario: hi\n    Given print 'hi'\n";

fn namespace() -> String {
    std::env::var("YAKS_TEST_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

fn run_args(argv: &[&str]) -> yaks_cli::commands::run::RunArgs {
    let cli = Cli::parse_from(std::iter::once("yaks").chain(argv.iter().copied()));
    let Commands::Run(args) = cli.command;
    args
}

/// Submitting the same source twice updates the Test in place with a fresh status
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn resubmitting_a_source_updates_the_test() {
    let kube = create_client(None).await.unwrap();
    let client = KubeTestClient::new(kube.clone());
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("resubmit.feature");
    std::fs::write(&source, FEATURE).unwrap();
    let args = run_args(&["run", source.to_str().unwrap(), "--wait=false"]);
    let config = load_run_config(&source, &namespace()).unwrap();
    let (console, output) = Console::captured();

    let test = build_test(&source, &config, &args).unwrap();
    yaks_cli::commands::run::reconcile::create_or_update(&client, &console, &test)
        .await
        .unwrap();
    let updated = yaks_cli::commands::run::reconcile::create_or_update(&client, &console, &test)
        .await
        .unwrap();

    assert_eq!(updated.name_any(), "resubmit");
    assert!(output.contents().contains("Test 'resubmit' updated"));
    let current = client.get_test(&namespace(), "resubmit").await.unwrap();
    assert_eq!(current.metadata.uid, updated.metadata.uid);

    let tests: Api<Test> = Api::namespaced(kube, &namespace());
    tests
        .delete("resubmit", &DeleteParams::default())
        .await
        .unwrap();
}

/// A passing feature produces one suite without errors
#[tokio::test]
#[ignore = "requires a Kubernetes cluster with the YAKS operator"]
async fn passing_feature_completes() {
    let kube = create_client(None).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("hello.feature");
    std::fs::write(&source, FEATURE).unwrap();
    let (console, output) = Console::captured();

    let runner = Runner::new(
        Arc::new(KubeTestClient::new(kube)),
        console,
        run_args(&["run", source.to_str().unwrap(), "--timeout", "5m"]),
        namespace(),
        "yaks/yaks:0.0.1".to_string(),
        CancellationToken::new(),
    );
    let results = runner.run_all().await;

    assert_eq!(results.suites.len(), 1);
    assert!(!results.has_errors(), "{}", output.contents());
    assert!(output
        .contents()
        .contains("Test 'hello' finished with status: Passed"));
}
