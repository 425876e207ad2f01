//! The poll–classify–notify state machine.
//!
//! ```text
//! Bootstrapping --rows found--> Polling --none available--> Waiting --timer--> Polling
//!       |                          |
//!       | attempts exhausted       +--some available--> Alerting (latched until reload)
//!       v
//!  Waiting (degraded, no timers)
//! ```
//!
//! Every timer and every snapshot fetch is a spawned task that reports back
//! through the main loop's channel ([`Action::Timer`], [`Action::Fetched`]),
//! so no handler ever awaits the network. All handles live in [`Timers`] and
//! are cancelled in one place; each report carries the epoch it was started
//! under, so one already queued before a cancellation is recognised and
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::config::Config;
use crate::error::MonitorError;
use crate::exam::{self, parse_sessions, SessionRecord, Snapshot, SnapshotSource};
use crate::notify::{NotificationDispatcher, VisualSurface};
use crate::status::{StatusRenderer, StatusView};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Bootstrapping,
    /// A cycle's fetch is in flight
    Polling,
    /// Between checks; `degraded` means bootstrap gave up and nothing is scheduled
    Waiting { degraded: bool },
    /// Availability found; terminal until reload
    Alerting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Recheck,
    BootstrapRetry,
    ElapsedTick,
    CountdownTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub epoch: u64,
}

/// A snapshot fetch finished; failures carry the rendered error chain
#[derive(Debug, Clone, PartialEq)]
pub struct FetchDone {
    pub epoch: u64,
    pub result: Result<Snapshot, String>,
}

/// Every pending timer and fetch handle the controller owns
struct Timers {
    tx: UnboundedSender<Action>,
    epoch: u64,
    recheck: Option<JoinHandle<()>>,
    bootstrap: Option<JoinHandle<()>>,
    elapsed: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
    fetch: Option<JoinHandle<()>>,
}

impl Timers {
    fn new(tx: UnboundedSender<Action>) -> Self {
        Self {
            tx,
            epoch: 0,
            recheck: None,
            bootstrap: None,
            elapsed: None,
            countdown: None,
            fetch: None,
        }
    }

    fn once(&self, kind: TimerKind, delay: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let fired = TimerFired {
            kind,
            epoch: self.epoch,
        };
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(Action::Timer(fired));
        })
    }

    fn every(&self, kind: TimerKind, period: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let fired = TimerFired {
            kind,
            epoch: self.epoch,
        };
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if tx.send(Action::Timer(fired)).is_err() {
                    break;
                }
            }
        })
    }

    fn schedule_recheck(&mut self, delay: Duration) {
        if let Some(old) = self.recheck.take() {
            old.abort();
        }
        self.recheck = Some(self.once(TimerKind::Recheck, delay));
        debug!("Next check in {}s", delay.as_secs());
    }

    fn schedule_bootstrap_retry(&mut self, delay: Duration) {
        if let Some(old) = self.bootstrap.take() {
            old.abort();
        }
        self.bootstrap = Some(self.once(TimerKind::BootstrapRetry, delay));
    }

    fn start_tickers(&mut self) {
        for old in [self.elapsed.take(), self.countdown.take()].into_iter().flatten() {
            old.abort();
        }
        self.elapsed = Some(self.every(TimerKind::ElapsedTick, TICK));
        self.countdown = Some(self.every(TimerKind::CountdownTick, TICK));
    }

    fn spawn_fetch(&mut self, source: Arc<dyn SnapshotSource>) {
        if let Some(old) = self.fetch.take() {
            old.abort();
        }
        let tx = self.tx.clone();
        let epoch = self.epoch;
        self.fetch = Some(tokio::spawn(async move {
            let result = source.fetch().await.map_err(|e| format!("{:#}", e));
            let _ = tx.send(Action::Fetched(FetchDone { epoch, result }));
        }));
    }

    fn cancel_all(&mut self) {
        self.epoch += 1;
        for handle in [
            self.recheck.take(),
            self.bootstrap.take(),
            self.elapsed.take(),
            self.countdown.take(),
            self.fetch.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch
    }

    fn timer_handles(&self) -> impl Iterator<Item = &JoinHandle<()>> {
        [&self.recheck, &self.bootstrap, &self.elapsed, &self.countdown]
            .into_iter()
            .flatten()
    }

    fn pending(&self) -> usize {
        self.timer_handles().filter(|h| !h.is_finished()).count()
    }

    fn has_pending_recheck(&self) -> bool {
        self.recheck.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn fetching(&self) -> bool {
        self.fetch.is_some()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Per-run state; replaced wholesale on every restart
#[derive(Debug, Default)]
struct RunState {
    state: MonitorState,
    bootstrap_attempt: u32,
    cycle: u64,
    sessions: Vec<SessionRecord>,
    available: Vec<SessionRecord>,
    last_error: Option<String>,
}

/// Owns the monitor state, every timer, and the alert/status outputs
pub struct PollController {
    config: Config,
    source: Arc<dyn SnapshotSource>,
    surface: Box<dyn VisualSurface>,
    dispatcher: NotificationDispatcher,
    status: StatusRenderer,
    timers: Timers,
    run: RunState,
}

impl PollController {
    pub fn new(
        config: Config,
        source: Box<dyn SnapshotSource>,
        surface: Box<dyn VisualSurface>,
        dispatcher: NotificationDispatcher,
        tx: UnboundedSender<Action>,
    ) -> Self {
        let status = StatusRenderer::new(config.poll_interval());
        Self {
            config,
            source: Arc::from(source),
            surface,
            dispatcher,
            status,
            timers: Timers::new(tx),
            run: RunState::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.run.state
    }

    /// Sessions seen by the most recent completed check
    pub fn sessions(&self) -> &[SessionRecord] {
        &self.run.sessions
    }

    /// Sessions that triggered the current alert
    pub fn available(&self) -> &[SessionRecord] {
        &self.run.available
    }

    pub fn cycle(&self) -> u64 {
        self.run.cycle
    }

    pub fn status(&self) -> &StatusRenderer {
        &self.status
    }

    pub fn source_label(&self) -> String {
        self.source.describe()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    pub fn has_pending_recheck(&self) -> bool {
        self.timers.has_pending_recheck()
    }

    /// A snapshot fetch has been started and its result not yet handled
    pub fn is_fetching(&self) -> bool {
        self.timers.fetching()
    }

    /// Enter Bootstrapping with fresh state and start the first attempt
    pub fn start(&mut self) {
        info!("Monitoring {}", self.source.describe());
        info!(
            "Interval: {}s, bootstrap budget: {} x {}ms",
            self.config.monitor.poll_interval_secs,
            self.config.bootstrap.max_attempts,
            self.config.bootstrap.retry_delay_ms
        );
        self.run = RunState::default();
        self.bootstrap_attempt();
    }

    /// Route a fired timer to its transition; stale firings are dropped
    pub fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.is_current(fired.epoch) {
            debug!("Dropping stale {:?} from epoch {}", fired.kind, fired.epoch);
            return;
        }

        match (fired.kind, self.run.state) {
            (TimerKind::Recheck, MonitorState::Waiting { degraded: false }) => {
                self.timers.recheck = None;
                self.poll();
            }
            (TimerKind::BootstrapRetry, MonitorState::Bootstrapping) => {
                self.timers.bootstrap = None;
                self.bootstrap_attempt();
            }
            (TimerKind::ElapsedTick, MonitorState::Waiting { degraded: false }) => {
                self.status.tick_elapsed();
                self.render_status();
            }
            (TimerKind::CountdownTick, MonitorState::Waiting { degraded: false }) => {
                self.status.tick_countdown();
                self.render_status();
            }
            (kind, state) => debug!("Ignoring {:?} while {:?}", kind, state),
        }
    }

    /// Finish the attempt or cycle whose fetch just completed; results from
    /// before a restart are dropped
    pub fn handle_fetch(&mut self, done: FetchDone) {
        if !self.timers.is_current(done.epoch) {
            debug!("Dropping stale fetch result from epoch {}", done.epoch);
            return;
        }
        self.timers.fetch = None;

        match self.run.state {
            MonitorState::Bootstrapping => self.finish_bootstrap_attempt(done.result),
            MonitorState::Polling => self.finish_cycle(done.result),
            state => debug!("Ignoring fetch result while {:?}", state),
        }
    }

    /// Operator-requested refresh. Refused while an alert is latched;
    /// returns whether the monitor restarted.
    pub fn force_refresh(&mut self) -> bool {
        if self.run.state == MonitorState::Alerting {
            info!("Force refresh ignored while alerting; reload to resume monitoring");
            return false;
        }
        info!("Force refresh requested");
        self.restart();
        true
    }

    /// The external reload: tears everything down, alert included, and
    /// starts over from Bootstrapping
    pub fn reload(&mut self) {
        info!("Reloading monitor");
        self.restart();
    }

    fn restart(&mut self) {
        self.timers.cancel_all();
        self.dispatcher.stand_down();
        self.surface.remove();
        self.status = StatusRenderer::new(self.config.poll_interval());
        self.start();
    }

    fn bootstrap_attempt(&mut self) {
        self.run.bootstrap_attempt += 1;
        self.render_status();
        self.timers.spawn_fetch(Arc::clone(&self.source));
    }

    fn finish_bootstrap_attempt(&mut self, result: Result<Snapshot, String>) {
        let attempt = self.run.bootstrap_attempt;
        let max_attempts = self.config.bootstrap.max_attempts;

        match result {
            Ok(snapshot) => {
                let sessions = parse_sessions(&snapshot);
                if !sessions.is_empty() {
                    info!("Session list ready after {} attempt(s)", attempt);
                    self.begin_cycle();
                    self.evaluate(sessions);
                    return;
                }
                debug!("Bootstrap attempt {}/{}: no rows yet", attempt, max_attempts);
            }
            Err(e) => warn!("Bootstrap attempt {}/{} failed: {}", attempt, max_attempts, e),
        }

        if attempt < max_attempts {
            self.timers.schedule_bootstrap_retry(self.config.bootstrap_delay());
        } else {
            self.enter_degraded();
        }
    }

    fn begin_cycle(&mut self) {
        self.run.state = MonitorState::Polling;
        self.run.cycle += 1;
        info!("--- Check #{} ---", self.run.cycle);
    }

    /// Start one Polling cycle; the result arrives through `handle_fetch`
    fn poll(&mut self) {
        self.begin_cycle();
        self.timers.spawn_fetch(Arc::clone(&self.source));
    }

    /// A failed fetch counts as nothing available
    fn finish_cycle(&mut self, result: Result<Snapshot, String>) {
        match result {
            Ok(snapshot) => self.evaluate(parse_sessions(&snapshot)),
            Err(e) => {
                let failure = MonitorError::Snapshot(e);
                warn!("Check #{} failed: {}", self.run.cycle, failure);
                self.run.last_error = Some(failure.to_string());
                self.enter_waiting();
            }
        }
    }

    fn evaluate(&mut self, sessions: Vec<SessionRecord>) {
        let available = exam::available(&sessions);
        info!("Parsed {} sessions.", sessions.len());
        self.run.sessions = sessions;
        self.run.last_error = None;

        if available.is_empty() {
            let sold_out = self.run.sessions.iter().filter(|s| s.is_sold_out()).count();
            info!(
                "No available slots. ({}/{} sold out)",
                sold_out,
                self.run.sessions.len()
            );
            self.enter_waiting();
        } else {
            info!("FOUND {} AVAILABLE SESSION(S)!", available.len());
            for session in &available {
                let note = if session.note.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", session.note)
                };
                info!("  -> {}{}", session.description, note);
            }
            self.enter_alerting(available);
        }
    }

    fn enter_waiting(&mut self) {
        self.timers.cancel_all();
        self.run.state = MonitorState::Waiting { degraded: false };
        self.status.reset();
        self.timers.schedule_recheck(self.config.poll_interval());
        self.timers.start_tickers();
        self.render_status();
    }

    fn enter_alerting(&mut self, available: Vec<SessionRecord>) {
        self.timers.cancel_all();
        self.run.state = MonitorState::Alerting;
        self.status.freeze();

        // the stale countdown must not linger when there is no alert banner
        if !self.dispatcher.channels().visual {
            self.surface.remove();
        }
        let report = self.dispatcher.dispatch(&available, self.surface.as_mut());
        if report.delivered.is_empty() {
            warn!("Alert raised but no channel delivered it");
        }
        self.run.available = available;
    }

    fn enter_degraded(&mut self) {
        let failure = MonitorError::BootstrapTimeout {
            attempts: self.run.bootstrap_attempt,
        };
        warn!("{}", failure);
        self.timers.cancel_all();
        self.run.state = MonitorState::Waiting { degraded: true };
        self.status.freeze();
        self.render_status();
    }

    fn render_status(&mut self) {
        let view = match self.run.state {
            MonitorState::Bootstrapping => StatusView::Bootstrapping {
                attempt: self.run.bootstrap_attempt,
                max_attempts: self.config.bootstrap.max_attempts,
            },
            MonitorState::Waiting { degraded: true } => StatusView::Degraded {
                attempts: self.run.bootstrap_attempt,
            },
            MonitorState::Waiting { degraded: false } | MonitorState::Polling => {
                StatusView::Waiting {
                    cycle: self.run.cycle,
                    total: self.run.sessions.len(),
                    sold_out: self.run.sessions.iter().filter(|s| s.is_sold_out()).count(),
                    last_error: self.run.last_error.clone(),
                }
            }
            MonitorState::Alerting => return,
        };

        if let Err(e) = self.surface.render(self.status.banner(&view)) {
            warn!("Status render failed: {:#}", e);
        }
    }
}
