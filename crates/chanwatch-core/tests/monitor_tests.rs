//! Monitor loop tests
//!
//! Drive the monitor with scripted agents under tokio's paused clock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chanwatch_core::agent::{Agent, EventStream, ResponseEvent};
use chanwatch_core::error::{Error, Result};
use chanwatch_core::monitor::{Monitor, MonitorContext, TurnOutcome};
use chanwatch_core::prompt::{TurnKind, TurnRequest};
use chanwatch_core::session::Session;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const CHANNEL: &str = "C08TEST";

/// What the scripted agent does for one submission
enum Reply {
    Events(Vec<Result<ResponseEvent>>),
    Reject(String),
    Panic,
}

impl Reply {
    fn texts(texts: &[&str]) -> Self {
        Reply::Events(
            texts
                .iter()
                .map(|t| Ok(ResponseEvent::text("assistant", *t)))
                .collect(),
        )
    }
}

struct Submission {
    kind: TurnKind,
    text: String,
    at: Instant,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptedAgent {
    script: Mutex<VecDeque<Reply>>,
    submissions: Mutex<Vec<Submission>>,
    /// Delay before each stream item
    step: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    drained: AtomicUsize,
    checks: AtomicUsize,
    /// Cancel this token when the nth check is submitted
    cancel_on_check: Option<(usize, CancellationToken)>,
}

impl ScriptedAgent {
    fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            submissions: Mutex::new(Vec::new()),
            step: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            drained: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
            cancel_on_check: None,
        }
    }

    fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    fn cancel_on_check(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_check = Some((n, token));
        self
    }

    fn kinds(&self) -> Vec<TurnKind> {
        self.submissions.lock().iter().map(|s| s.kind).collect()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit<'a>(
        &'a self,
        _session: &'a Session,
        request: TurnRequest,
    ) -> Result<EventStream<'a>> {
        self.submissions.lock().push(Submission {
            kind: request.kind,
            text: request.text.clone(),
            at: Instant::now(),
        });

        if request.kind == TurnKind::Check {
            let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, token)) = &self.cancel_on_check
                && n == *after
            {
                token.cancel();
            }
        }

        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::texts(&["ok"]));

        let events = match reply {
            Reply::Events(events) => events,
            Reply::Reject(message) => return Err(Error::Agent(message)),
            Reply::Panic => panic!("agent exploded"),
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        let step = self.step;
        let drained = &self.drained;

        let events: VecDeque<_> = events.into();
        Ok(stream::unfold((events, guard), move |(mut events, guard)| async move {
            tokio::time::sleep(step).await;
            match events.pop_front() {
                Some(item) => Some((item, (events, guard))),
                None => {
                    drained.fetch_add(1, Ordering::SeqCst);
                    None
                }
            }
        })
        .boxed())
    }
}

fn monitor(agent: Arc<ScriptedAgent>, interval: Duration) -> Monitor {
    let ctx = MonitorContext::new(
        agent,
        Session::new("app", "user", "session", 20),
        CHANNEL,
        interval,
    );
    Monitor::new(ctx)
}

mod turn_tests {
    use super::*;

    #[tokio::test]
    async fn test_fragments_concatenate_without_separator() {
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::texts(&["Hello", " world"])]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let report = monitor.run_once().await.unwrap();

        assert_eq!(report.fragments, vec!["Hello", " world"]);
        assert_eq!(report.text, "Hello world");
        assert_eq!(report.length, 11);
        assert_eq!(report.outcome, TurnOutcome::Responded);
        assert_eq!(agent.kinds(), vec![TurnKind::Check]);
    }

    #[tokio::test]
    async fn test_check_request_names_channel_and_time() {
        let agent = Arc::new(ScriptedAgent::new(vec![]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let report = monitor.run_once().await.unwrap();

        let submissions = agent.submissions.lock();
        assert!(submissions[0].text.contains(CHANNEL));
        assert!(submissions[0].text.contains(&report.time));
    }

    #[tokio::test]
    async fn test_empty_stream_is_no_response_not_error() {
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::Events(vec![])]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let report = monitor.run_once().await.unwrap();

        assert_eq!(report.outcome, TurnOutcome::NoResponse);
        assert_eq!(report.length, 0);
        assert_eq!(agent.kinds(), vec![TurnKind::Check]);
    }

    #[tokio::test]
    async fn test_submission_failure_triggers_one_recovery() {
        let agent = Arc::new(ScriptedAgent::new(vec![
            Reply::Reject("model unavailable".to_string()),
            Reply::Reject("still unavailable".to_string()),
        ]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let report = monitor.run_once().await.unwrap();

        assert!(matches!(report.outcome, TurnOutcome::Failed { ref error } if error.contains("model unavailable")));
        assert_eq!(agent.kinds(), vec![TurnKind::Check, TurnKind::ErrorNotice]);
        let submissions = agent.submissions.lock();
        assert!(submissions[1].text.contains("model unavailable"));
        assert!(submissions[1].text.contains(CHANNEL));
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_partial_fragments() {
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::Events(vec![
            Ok(ResponseEvent::text("assistant", "Looking")),
            Err(Error::Provider("stream reset".to_string())),
            Ok(ResponseEvent::text("assistant", "never seen")),
        ])]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let report = monitor.run_once().await.unwrap();

        assert_eq!(report.fragments, vec!["Looking"]);
        assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));
        assert_eq!(agent.kinds(), vec![TurnKind::Check, TurnKind::ErrorNotice]);
    }

    #[tokio::test]
    async fn test_error_excerpt_truncated_to_100_chars() {
        let long = "e".repeat(300);
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::Reject(long.clone())]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        monitor.run_once().await.unwrap();

        let full = Error::Agent(long).to_string();
        let excerpt: String = full.chars().take(100).collect();
        let submissions = agent.submissions.lock();
        let notice = &submissions[1].text;
        assert!(notice.contains(&format!("{excerpt}'")));
        assert!(!notice.contains(&full));
    }

    #[tokio::test]
    async fn test_successful_turn_sends_no_notice() {
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::texts(&["All quiet"])]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        monitor.run_once().await.unwrap();
        assert_eq!(agent.kinds(), vec![TurnKind::Check]);
    }

    #[tokio::test]
    async fn test_panic_in_turn_is_fatal() {
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::Panic]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let err = monitor.run_once().await.unwrap_err();
        assert!(matches!(err, Error::Agent(ref msg) if msg.contains("agent exploded")));
    }
}

mod loop_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_turns_are_spaced_by_interval() {
        let token = CancellationToken::new();
        let agent = Arc::new(
            ScriptedAgent::new(vec![])
                .with_step(Duration::from_secs(2))
                .cancel_on_check(3, token.clone()),
        );
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30)).with_cancellation(token);

        let summary = monitor.run().await.unwrap();

        assert_eq!(summary.turns, 3);
        let submissions = agent.submissions.lock();
        assert_eq!(submissions.len(), 3);
        for pair in submissions.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_secs(30));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_never_overlap() {
        let token = CancellationToken::new();
        let agent = Arc::new(
            ScriptedAgent::new(vec![
                Reply::texts(&["a", "b", "c"]),
                Reply::Reject("boom".to_string()),
                Reply::texts(&["notice"]),
                Reply::texts(&["d", "e"]),
            ])
            .with_step(Duration::from_secs(5))
            .cancel_on_check(4, token.clone()),
        );
        let mut monitor = monitor(agent.clone(), Duration::from_secs(1)).with_cancellation(token);

        let summary = monitor.run().await.unwrap();

        assert_eq!(summary.turns, 4);
        assert_eq!(summary.recovered, 1);
        assert_eq!(agent.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(agent.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_sleep_exits_without_new_turn() {
        let agent = Arc::new(ScriptedAgent::new(vec![]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));
        let token = monitor.cancellation_token();
        let start = Instant::now();

        let (summary, ()) = tokio::join!(monitor.run(), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            token.cancel();
        });

        assert_eq!(summary.unwrap().turns, 1);
        assert_eq!(agent.kinds(), vec![TurnKind::Check]);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_turn_lets_it_finish() {
        let token = CancellationToken::new();
        let agent = Arc::new(
            ScriptedAgent::new(vec![Reply::texts(&["slow", " answer"])])
                .with_step(Duration::from_secs(5))
                .cancel_on_check(1, token.clone()),
        );
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30)).with_cancellation(token);

        let summary = monitor.run().await.unwrap();

        assert_eq!(summary.turns, 1);
        assert_eq!(agent.drained.load(Ordering::SeqCst), 1);
        assert_eq!(agent.kinds(), vec![TurnKind::Check]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_runs_nothing() {
        let agent = Arc::new(ScriptedAgent::new(vec![]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));
        monitor.cancellation_token().cancel();

        let summary = monitor.run().await.unwrap();

        assert_eq!(summary.turns, 0);
        assert!(agent.kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_failure_does_not_stop_loop() {
        let token = CancellationToken::new();
        let agent = Arc::new(
            ScriptedAgent::new(vec![
                Reply::Reject("first".to_string()),
                Reply::Reject("notice failed too".to_string()),
            ])
            .cancel_on_check(2, token.clone()),
        );
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30)).with_cancellation(token);

        let summary = monitor.run().await.unwrap();

        assert_eq!(summary.turns, 2);
        assert_eq!(summary.recovered, 1);
        assert_eq!(
            agent.kinds(),
            vec![TurnKind::Check, TurnKind::ErrorNotice, TurnKind::Check]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_stops_loop() {
        let agent = Arc::new(ScriptedAgent::new(vec![Reply::texts(&["fine"]), Reply::Panic]));
        let mut monitor = monitor(agent.clone(), Duration::from_secs(30));

        let result = monitor.run().await;

        assert!(matches!(result, Err(Error::Agent(_))));
        assert_eq!(agent.kinds(), vec![TurnKind::Check, TurnKind::Check]);
    }
}

mod init_tests {
    use super::*;
    use chanwatch_core::config::{Config, McpServerConfig};

    fn ollama_config() -> Config {
        let mut config = Config::default();
        config.agent.provider = "ollama".to_string();
        config.monitor.channel_id = Some(CHANNEL.to_string());
        config.mcp_servers.clear();
        config
    }

    #[tokio::test]
    async fn test_initialize_fails_when_tool_server_cannot_start() {
        let mut config = ollama_config();
        config.mcp_servers.insert(
            "lights".to_string(),
            McpServerConfig::new("/nonexistent/chanwatch-light-server"),
        );

        let result = Monitor::initialize(&config).await;

        match result {
            Err(Error::Mcp { server, .. }) => assert_eq!(server, "lights"),
            Err(e) => panic!("expected a tool server error, got {e}"),
            Ok(_) => panic!("initialize should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_initialize_fails_on_missing_credential_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");

        let mut config = ollama_config();
        config.mcp_servers.insert(
            "calendar".to_string(),
            McpServerConfig::new("sh")
                .with_args(vec!["-c".to_string(), format!("touch '{}'", marker.display())])
                .with_env("CALENDAR_TOKEN", "${CHANWATCH_TEST_UNSET_CALENDAR_TOKEN}"),
        );

        let result = Monitor::initialize(&config).await;

        match result {
            Err(Error::Config(msg)) => {
                assert!(msg.contains("CHANWATCH_TEST_UNSET_CALENDAR_TOKEN"), "{msg}")
            }
            Err(e) => panic!("expected a configuration error, got {e}"),
            Ok(_) => panic!("initialize should fail"),
        }
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_initialize_without_tool_servers() {
        let monitor = Monitor::initialize(&ollama_config()).await.unwrap();

        assert_eq!(monitor.context().channel_id, CHANNEL);
        assert_eq!(monitor.context().interval, Duration::from_secs(30));
        monitor.shutdown().await;
    }
}
