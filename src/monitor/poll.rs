//! The polling state machine.
//!
//! `Idle → Fetching → {Success, Failed}`. Fetches are started by the regular
//! interval, by retries, by the user and by host pushes; whichever trigger
//! arrives while a fetch is in flight is a no-op. Each fetch runs as a
//! spawned task tagged with a generation number and reports back exactly
//! once; the source's own deadline guarantees that report arrives.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::backoff::{deadline_after, BackoffPolicy, BackoffScheduler};
use super::dedup::{Deduplicator, LastSeen};
use super::source::FeedSource;
use crate::aqi::{Category, FetchError, Observation, Snapshot};
use crate::bridge::BridgeClient;
use crate::storage::Preferences;

/// Regular polling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// What asked for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Interval,
    Retry,
    /// Refresh requested in the readout.
    User,
    /// Refresh pushed by the host (tray menu).
    External,
}

/// Commands accepted by [`PollLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Refresh(Trigger),
    Shutdown,
}

/// Updates for render targets.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    FetchStarted(Trigger),
    Updated {
        snapshot: Snapshot,
        next_poll: Duration,
    },
    Failed {
        error: FetchError,
        /// Time until the pending retry, if one is armed.
        retry_in: Option<Duration>,
        consecutive_failures: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Success,
    Failed,
}

/// State owned by the poll loop. Only its own transitions mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    pub phase: Phase,
    /// Last successful observation; kept across failures.
    pub last_observation: Option<Observation>,
    pub last_category_seen: Option<Category>,
    pub in_flight: bool,
    pub consecutive_failures: u32,
    /// Delay of the retry armed by the last failure.
    pub next_retry_delay: Option<Duration>,
}

impl PollState {
    /// `Idle → Fetching`. Returns false if a fetch is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        self.phase = Phase::Fetching;
        true
    }

    /// `Fetching → Success`.
    pub fn succeed(&mut self, observation: Observation, category: Option<Category>) {
        self.phase = Phase::Success;
        self.last_observation = Some(observation);
        if category.is_some() {
            self.last_category_seen = category;
        }
        self.in_flight = false;
        self.consecutive_failures = 0;
        self.next_retry_delay = None;
    }

    /// `Fetching → Failed`. The last observation is kept.
    pub fn fail(&mut self, retry: Option<Duration>) {
        self.phase = Phase::Failed;
        self.in_flight = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if retry.is_some() {
            self.next_retry_delay = retry;
        }
    }
}

struct FetchDone {
    generation: u64,
    result: Result<Observation, FetchError>,
}

pub struct PollLoop {
    source: Arc<dyn FeedSource>,
    state: PollState,
    backoff: BackoffScheduler,
    dedup: Deduplicator,
    bridge: BridgeClient,
    prefs: watch::Receiver<Preferences>,
    events: mpsc::Sender<MonitorEvent>,
    interval: Duration,
    next_tick: Instant,
    generation: u64,
    done_tx: mpsc::Sender<FetchDone>,
    done_rx: mpsc::Receiver<FetchDone>,
    task: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn FeedSource>,
        bridge: BridgeClient,
        prefs: watch::Receiver<Preferences>,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel(4);
        let dedup = Deduplicator::in_memory(LastSeen::default());
        Self {
            source,
            state: PollState {
                last_category_seen: dedup.last_category(),
                ..PollState::default()
            },
            backoff: BackoffScheduler::new(BackoffPolicy::default()),
            dedup,
            bridge,
            prefs,
            events,
            interval: DEFAULT_INTERVAL,
            next_tick: deadline_after(Instant::now(), DEFAULT_INTERVAL),
            generation: 0,
            done_tx,
            done_rx,
            task: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffScheduler) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_dedup(mut self, dedup: Deduplicator) -> Self {
        self.state.last_category_seen = dedup.last_category();
        self.dedup = dedup;
        self
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Runs until `Shutdown` or until every command sender is dropped, and
    /// returns the final state. A fetch is started immediately.
    pub async fn run(mut self, mut commands: mpsc::Receiver<LoopCommand>) -> PollState {
        self.next_tick = deadline_after(Instant::now(), self.interval);
        self.trigger(Trigger::Startup).await;

        loop {
            let retry_at = self.backoff.retry_deadline();

            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(LoopCommand::Refresh(trigger)) => {
                        self.trigger(trigger).await;
                    }
                    Some(LoopCommand::Shutdown) | None => break,
                },

                Some(done) = self.done_rx.recv() => {
                    self.complete(done).await;
                }

                _ = sleep_until(retry_at.unwrap_or(self.next_tick)), if retry_at.is_some() => {
                    if self.backoff.fire(Instant::now()) {
                        self.trigger(Trigger::Retry).await;
                    }
                }

                _ = sleep_until(self.next_tick) => {
                    self.next_tick = deadline_after(Instant::now(), self.interval);
                    self.trigger(Trigger::Interval).await;
                }
            }
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::debug!("Poll loop stopped");
        self.state
    }

    /// Starts a fetch unless one is already in flight.
    async fn trigger(&mut self, trigger: Trigger) -> bool {
        if !self.state.begin() {
            tracing::debug!(?trigger, "Fetch already in flight, ignoring trigger");
            return false;
        }

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let done = self.done_tx.clone();

        tracing::debug!(?trigger, generation, "Starting fetch");
        self.task = Some(tokio::spawn(async move {
            let result = source.fetch().await;
            let _ = done.send(FetchDone { generation, result }).await;
        }));

        self.emit(MonitorEvent::FetchStarted(trigger)).await;
        true
    }

    async fn complete(&mut self, done: FetchDone) {
        if done.generation != self.generation || !self.state.in_flight {
            tracing::debug!(
                generation = done.generation,
                current = self.generation,
                "Discarding stale fetch result"
            );
            return;
        }
        self.task = None;

        match done.result {
            Ok(observation) => self.on_success(observation).await,
            Err(error) => self.on_failure(error).await,
        }
    }

    async fn on_success(&mut self, observation: Observation) {
        let notify_enabled = self.prefs.borrow().notify_on_high_severity;

        // Dedup record and displayed state change together, before any await.
        let alert = self.dedup.observe(&observation, notify_enabled);
        let snapshot = Snapshot::new(observation.clone());
        self.state.succeed(observation, self.dedup.last_category());
        self.backoff.on_success();
        self.next_tick = deadline_after(Instant::now(), self.interval);

        tracing::info!(
            aqi = %snapshot.observation.index,
            category = ?snapshot.category,
            location = %snapshot.observation.location,
            "Observation updated"
        );

        if let Err(e) = self.bridge.set_status_icon(snapshot.observation.index).await {
            tracing::warn!(error = %e, "Status icon update skipped");
        }

        if let Some(alert) = alert {
            match self.bridge.notify(&alert.title, &alert.body).await {
                Ok(delivered) => {
                    tracing::debug!(delivered, category = ?alert.category, "Notification requested")
                }
                Err(e) => tracing::warn!(error = %e, "Notification skipped"),
            }
        }

        self.emit(MonitorEvent::Updated {
            snapshot,
            next_poll: self.interval,
        })
        .await;
    }

    async fn on_failure(&mut self, error: FetchError) {
        let now = Instant::now();
        let armed = self.backoff.on_failure(now);
        self.state.fail(armed);

        let retry_in = self
            .backoff
            .retry_deadline()
            .map(|deadline| deadline.saturating_duration_since(now));

        tracing::warn!(
            error = %error,
            failures = self.state.consecutive_failures,
            retry_in_ms = retry_in.map(|d| d.as_millis() as u64),
            "Fetch failed"
        );

        self.emit(MonitorEvent::Failed {
            error,
            retry_in,
            consecutive_failures: self.state.consecutive_failures,
        })
        .await;
    }

    async fn emit(&self, event: MonitorEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("No render target listening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::{with_deadline, AqiIndex};
    use crate::bridge::{channel, Envelope, Request, Response};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DEADLINE: Duration = Duration::from_secs(10);

    enum Step {
        Ok(f64),
        Err(FetchError),
        Delay(Duration, f64),
        DelayErr(Duration, FetchError),
        Hang,
    }

    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn obs(value: f64) -> Observation {
        Observation {
            index: AqiIndex::Value(value),
            particulates: BTreeMap::new(),
            location: "X".to_string(),
            observed_at: Utc::now(),
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch(&self) -> Result<Observation, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Ok(10.0));
            with_deadline(DEADLINE, async move {
                match step {
                    Step::Ok(v) => Ok(obs(v)),
                    Step::Err(e) => Err(e),
                    Step::Delay(d, v) => {
                        tokio::time::sleep(d).await;
                        Ok(obs(v))
                    }
                    Step::DelayErr(d, e) => {
                        tokio::time::sleep(d).await;
                        Err(e)
                    }
                    Step::Hang => std::future::pending().await,
                }
            })
            .await
        }
    }

    /// Answers bridge requests like a permissive host and records them.
    fn fake_host() -> (BridgeClient, Arc<Mutex<Vec<Request>>>) {
        let (client, _pushes, mut port) = channel(16);
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        tokio::spawn(async move {
            while let Some(Envelope { request, reply }) = port.requests.recv().await {
                let response = match &request {
                    Request::Notify { .. } => Response::Delivered { delivered: true },
                    _ => Response::Ack,
                };
                seen.lock().unwrap().push(request);
                if let Some(reply) = reply {
                    let _ = reply.send(response);
                }
            }
        });
        (client, log)
    }

    struct Harness {
        events: mpsc::Receiver<MonitorEvent>,
        commands: mpsc::Sender<LoopCommand>,
        prefs: watch::Sender<Preferences>,
        task: JoinHandle<PollState>,
        requests: Arc<Mutex<Vec<Request>>>,
    }

    impl Harness {
        fn start(source: Arc<ScriptedSource>, jitter: f64) -> Self {
            Self::start_with_interval(source, jitter, DEFAULT_INTERVAL)
        }

        fn start_with_interval(
            source: Arc<ScriptedSource>,
            jitter: f64,
            interval: Duration,
        ) -> Self {
            let (bridge, requests) = fake_host();
            let (prefs_tx, prefs_rx) = watch::channel(Preferences::default());
            let (event_tx, events) = mpsc::channel(32);
            let (commands, cmd_rx) = mpsc::channel(8);
            let policy = BackoffPolicy {
                jitter,
                ..BackoffPolicy::default()
            };
            let poll = PollLoop::new(source, bridge, prefs_rx, event_tx)
                .with_interval(interval)
                .with_backoff(BackoffScheduler::with_seed(policy, 7));
            let task = tokio::spawn(poll.run(cmd_rx));
            Self {
                events,
                commands,
                prefs: prefs_tx,
                task,
                requests,
            }
        }

        async fn next(&mut self) -> MonitorEvent {
            self.events.recv().await.expect("poll loop ended")
        }

        async fn refresh(&self) {
            self.commands
                .send(LoopCommand::Refresh(Trigger::User))
                .await
                .unwrap();
        }

        async fn stop(self) -> PollState {
            self.commands.send(LoopCommand::Shutdown).await.unwrap();
            self.task.await.unwrap()
        }

        fn notifications(&self) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| matches!(r, Request::Notify { .. }))
                .count()
        }
    }

    fn is_updated(event: &MonitorEvent) -> bool {
        matches!(event, MonitorEvent::Updated { .. })
    }

    #[test]
    fn test_state_transitions() {
        let mut state = PollState::default();
        assert!(state.begin());
        assert!(!state.begin());
        state.fail(Some(Duration::from_secs(15)));
        assert_eq!(state.phase, Phase::Failed);
        assert!(!state.in_flight);
        assert_eq!(state.consecutive_failures, 1);

        assert!(state.begin());
        state.succeed(obs(42.0), Some(Category::Good));
        assert_eq!(state.phase, Phase::Success);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.next_retry_delay, None);
        assert_eq!(state.last_category_seen, Some(Category::Good));

        assert!(state.begin());
        state.fail(Some(Duration::from_secs(15)));
        assert_eq!(
            state.last_observation.as_ref().map(|o| o.index),
            Some(AqiIndex::Value(42.0))
        );
        assert_eq!(state.last_category_seen, Some(Category::Good));
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_fetch_then_regular_interval() {
        let source = ScriptedSource::new(vec![Step::Ok(20.0), Step::Ok(30.0)]);
        let mut h = Harness::start(source.clone(), 0.15);

        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Startup));
        assert!(is_updated(&h.next().await));

        let before = Instant::now();
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Interval));
        assert_eq!(before.elapsed(), DEFAULT_INTERVAL);
        assert!(is_updated(&h.next().await));

        assert_eq!(source.calls(), 2);
        let state = h.stop().await;
        assert_eq!(state.phase, Phase::Success);
        assert_eq!(state.last_category_seen, Some(Category::Good));
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_while_in_flight_are_ignored() {
        let source = ScriptedSource::new(vec![Step::Delay(Duration::from_secs(5), 20.0)]);
        let mut h = Harness::start(source.clone(), 0.15);

        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Startup));
        h.refresh().await;
        h.commands
            .send(LoopCommand::Refresh(Trigger::External))
            .await
            .unwrap();

        // The next event is the completion, not another start.
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 1);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_once_and_arms_initial_retry() {
        let source = ScriptedSource::new(vec![Step::Hang, Step::Ok(20.0)]);
        let mut h = Harness::start(source.clone(), 0.15);

        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Startup));
        let started = Instant::now();
        let retry_in = match h.next().await {
            MonitorEvent::Failed {
                error,
                retry_in,
                consecutive_failures,
            } => {
                assert_eq!(error, FetchError::Timeout);
                assert_eq!(consecutive_failures, 1);
                retry_in.unwrap()
            }
            e => panic!("Expected Failed, got {:?}", e),
        };
        assert_eq!(started.elapsed(), DEADLINE);
        assert!(retry_in >= Duration::from_millis(12_750), "{:?}", retry_in);
        assert!(retry_in <= Duration::from_millis(17_250), "{:?}", retry_in);

        // Exactly one failure, then the retry fetch.
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Retry));
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 2);

        let state = h.stop().await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.next_retry_delay, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_observation() {
        let source = ScriptedSource::new(vec![
            Step::Ok(175.0),
            Step::Err(FetchError::Transport("reset".into())),
        ]);
        let mut h = Harness::start(source, 0.0);

        h.next().await;
        assert!(is_updated(&h.next().await));
        h.refresh().await;
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::User));
        assert!(matches!(h.next().await, MonitorEvent::Failed { .. }));

        let state = h.stop().await;
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(
            state.last_observation.map(|o| o.index),
            Some(AqiIndex::Value(175.0))
        );
        assert_eq!(state.last_category_seen, Some(Category::Unhealthy));
        assert_eq!(state.next_retry_delay, Some(Duration::from_secs(15)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_then_resets_on_success() {
        let err = || Step::Err(FetchError::MalformedResponse("bad".into()));
        let source = ScriptedSource::new(vec![err(), err(), Step::Ok(20.0), err()]);
        let mut h = Harness::start(source, 0.0);

        let mut delays = Vec::new();
        loop {
            match h.next().await {
                MonitorEvent::Failed { retry_in, .. } => delays.push(retry_in.unwrap().as_secs()),
                MonitorEvent::Updated { .. } => break,
                MonitorEvent::FetchStarted(_) => {}
            }
        }
        assert_eq!(delays, vec![15, 30]);

        h.refresh().await;
        h.next().await;
        match h.next().await {
            MonitorEvent::Failed { retry_in, .. } => {
                assert_eq!(retry_in, Some(Duration::from_secs(15)))
            }
            e => panic!("Expected Failed, got {:?}", e),
        }
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_while_retry_armed_keeps_single_timer() {
        let err = || Step::Err(FetchError::Transport("down".into()));
        let source = ScriptedSource::new(vec![err(), err(), Step::Ok(20.0)]);
        let mut h = Harness::start(source.clone(), 0.0);

        h.next().await;
        assert!(matches!(h.next().await, MonitorEvent::Failed { .. }));

        tokio::time::advance(Duration::from_secs(5)).await;
        h.refresh().await;
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::User));
        match h.next().await {
            MonitorEvent::Failed { retry_in, .. } => {
                // Still the first retry, 10s left of 15s.
                assert_eq!(retry_in, Some(Duration::from_secs(10)));
            }
            e => panic!("Expected Failed, got {:?}", e),
        }

        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Retry));
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 3);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_deadline_during_user_fetch_starts_nothing() {
        let source = ScriptedSource::new(vec![
            Step::Err(FetchError::Transport("down".into())),
            Step::Delay(Duration::from_secs(20), 20.0),
        ]);
        let mut h = Harness::start(source.clone(), 0.0);

        h.next().await;
        match h.next().await {
            MonitorEvent::Failed { retry_in, .. } => {
                assert_eq!(retry_in, Some(Duration::from_secs(15)))
            }
            e => panic!("Expected Failed, got {:?}", e),
        }

        // The user fetch spans the retry deadline at 15s.
        tokio::time::advance(Duration::from_secs(5)).await;
        h.refresh().await;
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::User));
        let started = Instant::now();
        assert!(is_updated(&h.next().await));
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(source.calls(), 2);

        let state = h.stop().await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.next_retry_delay, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_spanning_retry_deadline_arms_one_retry() {
        let source = ScriptedSource::new(vec![
            Step::Err(FetchError::Transport("down".into())),
            Step::DelayErr(Duration::from_secs(20), FetchError::Transport("still down".into())),
            Step::Ok(20.0),
        ]);
        let mut h = Harness::start(source.clone(), 0.0);

        h.next().await;
        assert!(matches!(h.next().await, MonitorEvent::Failed { .. }));

        tokio::time::advance(Duration::from_secs(5)).await;
        h.refresh().await;
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::User));
        // The due retry was absorbed by the in-flight fetch; its failure
        // arms the next step of the backoff, not a second timer.
        match h.next().await {
            MonitorEvent::Failed {
                retry_in,
                consecutive_failures,
                ..
            } => {
                assert_eq!(retry_in, Some(Duration::from_secs(30)));
                assert_eq!(consecutive_failures, 2);
            }
            e => panic!("Expected Failed, got {:?}", e),
        }
        assert_eq!(source.calls(), 2);

        let failed_at = Instant::now();
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Retry));
        assert_eq!(failed_at.elapsed(), Duration::from_secs(30));
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 3);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_coinciding_retry_and_interval_start_one_fetch() {
        let interval = Duration::from_secs(15);
        let source = ScriptedSource::new(vec![
            Step::Err(FetchError::Transport("down".into())),
            Step::Ok(20.0),
            Step::Ok(30.0),
        ]);
        let mut h = Harness::start_with_interval(source.clone(), 0.0, interval);

        h.next().await;
        match h.next().await {
            MonitorEvent::Failed { retry_in, .. } => assert_eq!(retry_in, Some(interval)),
            e => panic!("Expected Failed, got {:?}", e),
        }

        // Retry and regular tick are both due at 15s.
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Retry));
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 2);

        let updated_at = Instant::now();
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Interval));
        assert_eq!(updated_at.elapsed(), interval);
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 3);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_interval_does_not_overflow() {
        let source = ScriptedSource::new(vec![Step::Ok(20.0), Step::Ok(30.0)]);
        let mut h = Harness::start_with_interval(source.clone(), 0.0, Duration::MAX);

        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::Startup));
        match h.next().await {
            MonitorEvent::Updated { next_poll, .. } => assert_eq!(next_poll, Duration::MAX),
            e => panic!("Expected Updated, got {:?}", e),
        }
        h.refresh().await;
        assert_eq!(h.next().await, MonitorEvent::FetchStarted(Trigger::User));
        assert!(is_updated(&h.next().await));
        assert_eq!(source.calls(), 2);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_follow_category_transitions() {
        let values = [20.0, 20.0, 175.0, 175.0, 75.0, 175.0];
        let source = ScriptedSource::new(values.iter().map(|v| Step::Ok(*v)).collect());
        let mut h = Harness::start(source, 0.0);

        for i in 0..values.len() {
            if i > 0 {
                h.refresh().await;
            }
            h.next().await;
            assert!(is_updated(&h.next().await));
        }

        assert_eq!(h.notifications(), 2);
        let icons = h
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, Request::SetStatusIcon { .. }))
            .count();
        assert_eq!(icons, values.len());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_respect_preference_cache() {
        let source = ScriptedSource::new(vec![Step::Ok(20.0), Step::Ok(175.0)]);
        let mut h = Harness::start(source, 0.0);
        h.next().await;
        h.next().await;

        h.prefs.send_modify(|p| p.notify_on_high_severity = false);
        h.refresh().await;
        h.next().await;
        assert!(is_updated(&h.next().await));

        assert_eq!(h.notifications(), 0);
        let state = h.stop().await;
        assert_eq!(state.last_category_seen, Some(Category::Unhealthy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_host_degrades_without_stopping() {
        let (bridge, _pushes, port) = channel(4);
        drop(port);
        let (_prefs_tx, prefs_rx) = watch::channel(Preferences::default());
        let (event_tx, mut events) = mpsc::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let source = ScriptedSource::new(vec![Step::Ok(250.0)]);
        let task = tokio::spawn(PollLoop::new(source, bridge, prefs_rx, event_tx).run(cmd_rx));

        events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            MonitorEvent::Updated { snapshot, .. } => {
                assert_eq!(snapshot.category, Category::VeryUnhealthy)
            }
            e => panic!("Expected Updated, got {:?}", e),
        }

        drop(cmd_tx);
        let state = task.await.unwrap();
        assert_eq!(state.phase, Phase::Success);
    }
}
