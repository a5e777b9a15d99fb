//! Waiting for a submitted test
//!
//! A wait runs two tasks sharing one cancellation token: a watcher (phase
//! polling, or route polling in dev mode) and an optional log follower. The
//! watcher cancels the token when it is done, the log follower stops on that
//! signal, and the wait returns once both tasks have finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use yaks_common::crd::{TestPhase, TestSuite};
use yaks_common::duration::parse_duration;
use yaks_common::DEFAULT_TIMEOUT;

use crate::client::TestClient;
use crate::console::Console;

/// Interval between reads of the test status
pub const PHASE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between route lookups in dev mode
pub const ROUTE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Route lookups before dev mode gives up
pub const ROUTE_POLL_LIMIT: u32 = 1000;

/// Why a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The test reached `Passed`, `Failed`, `Error` or `Deleting`
    TerminalPhase(TestPhase),
    /// The wait budget ran out
    TimedOut { last_phase: TestPhase },
    /// The run was cancelled from outside
    ExternallyCancelled { last_phase: TestPhase },
}

impl WaitOutcome {
    /// Phase reported for the test: the terminal one or the last observed
    pub fn phase(&self) -> TestPhase {
        match *self {
            WaitOutcome::TerminalPhase(phase)
            | WaitOutcome::TimedOut { last_phase: phase }
            | WaitOutcome::ExternallyCancelled { last_phase: phase } => phase,
        }
    }
}

/// What to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// A terminal phase, bounded by a timeout
    Phase { timeout: Duration },
    /// The dev mode route, bounded by [`ROUTE_POLL_LIMIT`] lookups
    Route,
}

/// Result of a wait
#[derive(Debug, Clone, PartialEq)]
pub struct Watched {
    pub outcome: WaitOutcome,
    /// Latest results reported in the test status
    pub results: Option<TestSuite>,
}

impl Watched {
    fn new(outcome: WaitOutcome) -> Self {
        Self {
            outcome,
            results: None,
        }
    }
}

/// Wait timeout: the flag, else the configured timeout, else the default.
///
/// A malformed value falls back to the default.
pub fn resolve_timeout(flag: Option<&str>, configured: &str, console: &Console) -> Duration {
    let timeout = flag
        .filter(|t| !t.is_empty())
        .or(Some(configured).filter(|t| !t.is_empty()))
        .unwrap_or(DEFAULT_TIMEOUT);

    parse_duration(timeout).unwrap_or_else(|e| {
        warn!(timeout = %timeout, error = %e, "invalid test timeout, using default");
        console.println(format!("Failed to parse test timeout setting - {}", e));
        parse_duration(DEFAULT_TIMEOUT).unwrap_or(Duration::from_secs(30 * 60))
    })
}

pub struct PhaseWatcher<C: ?Sized> {
    client: Arc<C>,
    console: Console,
}

impl<C: TestClient + ?Sized + 'static> PhaseWatcher<C> {
    pub fn new(client: Arc<C>, console: Console) -> Self {
        Self { client, console }
    }

    /// Wait for the test `namespace/name` according to `strategy`.
    ///
    /// `parent` cancels the wait from outside; the returned outcome then is
    /// [`WaitOutcome::ExternallyCancelled`].
    #[instrument(skip(self, parent))]
    pub async fn await_terminal_state(
        &self,
        namespace: &str,
        name: &str,
        strategy: WaitStrategy,
        follow_logs: bool,
        parent: &CancellationToken,
    ) -> Watched {
        let token = parent.child_token();

        let watcher = {
            let client = self.client.clone();
            let console = self.console.clone();
            let token = token.clone();
            let (namespace, name) = (namespace.to_string(), name.to_string());
            tokio::spawn(async move {
                match strategy {
                    WaitStrategy::Phase { timeout } => {
                        watch_phase(&*client, &namespace, &name, timeout, &token).await
                    }
                    WaitStrategy::Route => {
                        watch_route(&*client, &console, &namespace, &name, &token).await
                    }
                }
            })
        };

        let logs = follow_logs.then(|| {
            let client = self.client.clone();
            let console = self.console.clone();
            let token = token.clone();
            let (namespace, name) = (namespace.to_string(), name.to_string());
            tokio::spawn(async move { client.follow_logs(&namespace, &name, console, token).await })
        });

        let watched = watcher.await.unwrap_or_else(|e| {
            warn!(error = %e, "watcher task failed");
            Watched::new(WaitOutcome::ExternallyCancelled {
                last_phase: TestPhase::New,
            })
        });
        token.cancel();

        if let Some(logs) = logs {
            match logs.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to follow test logs"),
                Err(e) => warn!(error = %e, "log follower task failed"),
            }
        }

        debug!(outcome = ?watched.outcome, "wait finished");
        watched
    }
}

async fn watch_phase<C: TestClient + ?Sized>(
    client: &C,
    namespace: &str,
    name: &str,
    timeout: Duration,
    token: &CancellationToken,
) -> Watched {
    let deadline = Instant::now() + timeout;
    let mut last_phase = TestPhase::New;
    let mut results = None;

    loop {
        let observed = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            _ = tokio::time::sleep_until(deadline) => None,
            observed = client.get_test(namespace, name) => Some(observed),
        };

        match observed {
            Some(Ok(test)) => {
                let phase = test.phase();
                if phase != TestPhase::None {
                    last_phase = phase;
                }
                if let Some(reported) = test.status.and_then(|status| status.results) {
                    results = Some(reported);
                }
                if phase.is_terminal() {
                    token.cancel();
                    return Watched {
                        outcome: WaitOutcome::TerminalPhase(phase),
                        results,
                    };
                }
            }
            Some(Err(e)) => debug!(error = %e, "failed to read test status"),
            None => {}
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Watched {
                    outcome: WaitOutcome::ExternallyCancelled { last_phase },
                    results,
                };
            }
            _ = tokio::time::sleep_until(deadline) => {
                token.cancel();
                return Watched {
                    outcome: WaitOutcome::TimedOut { last_phase },
                    results,
                };
            }
            _ = tokio::time::sleep(PHASE_POLL_INTERVAL) => {}
        }
    }
}

async fn watch_route<C: TestClient + ?Sized>(
    client: &C,
    console: &Console,
    namespace: &str,
    name: &str,
    token: &CancellationToken,
) -> Watched {
    let cancelled = || {
        Watched::new(WaitOutcome::ExternallyCancelled {
            last_phase: TestPhase::New,
        })
    };

    for _ in 0..ROUTE_POLL_LIMIT {
        let host = tokio::select! {
            biased;
            _ = token.cancelled() => return cancelled(),
            host = client.route_host(namespace, name) => host,
        };

        match host {
            Ok(Some(host)) => {
                console.println(format!("Route is provisioned {}", host));
                // dev sessions last until the run is cancelled
                token.cancelled().await;
                return cancelled();
            }
            Ok(None) => debug!("waiting for the route to provision"),
            Err(e) => debug!(error = %e, "failed to read route"),
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return cancelled(),
            _ = tokio::time::sleep(ROUTE_POLL_INTERVAL) => {}
        }
    }

    token.cancel();
    Watched::new(WaitOutcome::TimedOut {
        last_phase: TestPhase::New,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockTestClient;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yaks_common::crd::{Test, TestSpec, TestStatus};

    fn test_in(phase: Option<TestPhase>) -> Test {
        let mut test = Test::new("hello", TestSpec::default());
        test.status = phase.map(|phase| TestStatus {
            phase,
            results: None,
        });
        test
    }

    /// Client whose `get_test` walks through `phases`, repeating the last one
    fn client_with_phases(phases: Vec<Option<TestPhase>>) -> MockTestClient {
        let calls = AtomicUsize::new(0);
        let mut client = MockTestClient::new();
        client.expect_get_test().returning(move |_, _| {
            let idx = calls.fetch_add(1, Ordering::SeqCst).min(phases.len() - 1);
            Ok(test_in(phases[idx]))
        });
        client
    }

    fn phase_wait(timeout: u64) -> WaitStrategy {
        WaitStrategy::Phase {
            timeout: Duration::from_secs(timeout),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_terminal_phase_and_stops_logs() {
        let mut client = client_with_phases(vec![
            Some(TestPhase::New),
            Some(TestPhase::Running),
            Some(TestPhase::Passed),
        ]);
        client
            .expect_follow_logs()
            .withf(|namespace, name, _, _| namespace == "ns" && name == "hello")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let (console, _) = Console::captured();
        let parent = CancellationToken::new();

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", phase_wait(60), true, &parent)
            .await;

        assert_eq!(watched.outcome, WaitOutcome::TerminalPhase(TestPhase::Passed));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_last_observed_phase() {
        let client = client_with_phases(vec![Some(TestPhase::Running), None]);
        let (console, _) = Console::captured();

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", phase_wait(30), false, &CancellationToken::new())
            .await;

        assert_eq!(
            watched.outcome,
            WaitOutcome::TimedOut {
                last_phase: TestPhase::Running
            }
        );
        assert_eq!(watched.outcome.phase(), TestPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_keep_polling() {
        let calls = AtomicUsize::new(0);
        let mut client = MockTestClient::new();
        client.expect_get_test().returning(move |_, name| {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(Error::resource("Test", name, "ServiceUnavailable", "try again")),
                _ => Ok(test_in(Some(TestPhase::Failed))),
            }
        });
        let (console, _) = Console::captured();

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", phase_wait(60), false, &CancellationToken::new())
            .await;

        assert_eq!(watched.outcome, WaitOutcome::TerminalPhase(TestPhase::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancellation_is_reported() {
        let parent = CancellationToken::new();
        let trigger = parent.clone();
        let calls = AtomicUsize::new(0);
        let mut client = MockTestClient::new();
        client.expect_get_test().returning(move |_, _| {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                trigger.cancel();
            }
            Ok(test_in(Some(TestPhase::Running)))
        });
        let (console, _) = Console::captured();

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", phase_wait(600), false, &parent)
            .await;

        assert_eq!(
            watched.outcome,
            WaitOutcome::ExternallyCancelled {
                last_phase: TestPhase::Running
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reported_results_are_kept() {
        let mut client = MockTestClient::new();
        client.expect_get_test().returning(|_, _| {
            let mut test = test_in(Some(TestPhase::Passed));
            if let Some(status) = test.status.as_mut() {
                status.results = Some(TestSuite::new("hello"));
            }
            Ok(test)
        });
        let (console, _) = Console::captured();

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", phase_wait(60), false, &CancellationToken::new())
            .await;

        assert_eq!(watched.results.unwrap().name, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn dev_mode_prints_route_and_waits_for_cancellation() {
        let calls = AtomicUsize::new(0);
        let mut client = MockTestClient::new();
        client.expect_route_host().returning(move |_, _| {
            Ok((calls.fetch_add(1, Ordering::SeqCst) >= 2).then(|| "hello.apps.example".to_string()))
        });
        let (console, output) = Console::captured();
        let parent = CancellationToken::new();
        let stopper = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            stopper.cancel();
        });

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", WaitStrategy::Route, false, &parent)
            .await;

        assert!(output
            .contents()
            .contains("Route is provisioned hello.apps.example"));
        assert_eq!(
            watched.outcome,
            WaitOutcome::ExternallyCancelled {
                last_phase: TestPhase::New
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dev_mode_gives_up_after_poll_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut client = MockTestClient::new();
        client.expect_route_host().returning(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
        let (console, _) = Console::captured();

        let watched = PhaseWatcher::new(Arc::new(client), console)
            .await_terminal_state("ns", "hello", WaitStrategy::Route, false, &CancellationToken::new())
            .await;

        assert_eq!(
            watched.outcome,
            WaitOutcome::TimedOut {
                last_phase: TestPhase::New
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), ROUTE_POLL_LIMIT as usize);
    }

    #[test]
    fn timeout_resolution_prefers_flag_then_config() {
        let (console, output) = Console::captured();
        assert_eq!(
            resolve_timeout(Some("5m"), "10m", &console),
            Duration::from_secs(300)
        );
        assert_eq!(resolve_timeout(None, "10m", &console), Duration::from_secs(600));
        assert_eq!(resolve_timeout(None, "", &console), Duration::from_secs(1800));
        assert!(output.contents().is_empty());
    }

    #[test]
    fn malformed_timeout_falls_back_to_default() {
        let (console, output) = Console::captured();
        assert_eq!(
            resolve_timeout(Some("soon"), "10m", &console),
            Duration::from_secs(1800)
        );
        assert!(output
            .contents()
            .contains("Failed to parse test timeout setting"));
    }
}
