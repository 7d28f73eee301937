use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::TypingConfig;
use crate::dispatch::{Dispatcher, Rejected, Request, Response};
use crate::keylog::{KeystrokeLog, LogEntry};
use crate::mistake::{MistakeChunk, MistakeInjector, BACKSPACE_GAP_MS, REVIEW_PAUSE_MIN_MS};
use crate::playback::OutputSink;
use crate::preprocess::preprocess;
use crate::scheduler::{Cooperative, CooperativeScheduler, Waited};
use crate::timing::TimingModel;

const SPACE_EXTRA_MS: RangeInclusive<u64> = 40..=140;
const PUNCTUATION_EXTRA_MS: RangeInclusive<u64> = 80..=220;
const NEWLINE_EXTRA_MS: RangeInclusive<u64> = 120..=320;
const THINKING_PAUSE_MS: RangeInclusive<u64> = 400..=1000;
const SETTLE_MS: RangeInclusive<u64> = 120..=420;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Stopped,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub outcome: Outcome,
    /// Source characters typed, corrections included.
    pub emitted: usize,
    pub total: usize,
    pub mistakes: usize,
    pub backspaces: usize,
    /// Session time with paused time taken out.
    pub active_ms: u64,
    pub paused_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub running: bool,
    pub paused: bool,
    pub sink_connected: bool,
    /// The pending configuration the next session will capture.
    pub config: TypingConfig,
    /// Timing of the active session, if any.
    pub effective: Option<TimingModel>,
    pub emitted: usize,
    pub total: usize,
    pub last_session: Option<SessionSummary>,
}

/// Why the session loop unwound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Stopped,
    Disconnected,
}

/// Everything one session owns. Built on Start, dropped when it ends.
struct Session {
    source: Vec<char>,
    cursor: usize,
    config: TypingConfig,
    timing: TimingModel,
    injector: MistakeInjector,
    rng: StdRng,
    started_at: Duration,
    paused: Duration,
    backspaces: usize,
}

/// The playback host: owns the sink, dispatcher and clock, holds the pending
/// configuration, and runs at most one session at a time.
pub struct Typist<S, D, C> {
    sink: S,
    dispatcher: D,
    clock: C,
    scheduler: CooperativeScheduler,
    config: TypingConfig,
    log: KeystrokeLog,
    state: SessionState,
    queued: Option<Session>,
    emitted: usize,
    total: usize,
    effective: Option<TimingModel>,
    last_session: Option<SessionSummary>,
    seeds: StdRng,
}

impl<S: OutputSink, D: Dispatcher, C: Clock> Typist<S, D, C> {
    pub fn new(sink: S, dispatcher: D, clock: C) -> Self {
        Self {
            sink,
            dispatcher,
            clock,
            scheduler: CooperativeScheduler::default(),
            config: TypingConfig::default(),
            log: KeystrokeLog::default(),
            state: SessionState::Idle,
            queued: None,
            emitted: 0,
            total: 0,
            effective: None,
            last_session: None,
            seeds: StdRng::from_entropy(),
        }
    }

    pub fn with_config(mut self, config: TypingConfig) -> Self {
        self.config = config.normalized();
        self
    }

    /// Make every session's random draws reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeds = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_scheduler(mut self, scheduler: CooperativeScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = KeystrokeLog::new(capacity);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &TypingConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn last_session(&self) -> Option<&SessionSummary> {
        self.last_session.as_ref()
    }

    pub fn keystroke_log(&self) -> &KeystrokeLog {
        &self.log
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            running: self.state.is_active(),
            paused: self.state == SessionState::Paused,
            sink_connected: self.sink.is_connected(),
            config: self.config.clone(),
            effective: self.effective,
            emitted: self.emitted,
            total: self.total,
            last_session: self.last_session.clone(),
        }
    }

    /// Apply one request to the host.
    ///
    /// An accepted Start moves the host to Running and queues the session;
    /// [`Self::serve_once`] runs it right after responding.
    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Start { text } => match self.accept(&text) {
                Ok(session) => {
                    let chars = session.source.len();
                    self.queued = Some(session);
                    Response::Started { chars }
                }
                Err(reason) => {
                    debug!(%reason, "start rejected");
                    Response::Rejected(reason)
                }
            },
            Request::Stop => {
                match self.state {
                    SessionState::Running | SessionState::Paused => {
                        info!("stop requested");
                        self.state = SessionState::Stopping;
                    }
                    SessionState::Completed => self.state = SessionState::Idle,
                    SessionState::Idle | SessionState::Stopping => {}
                }
                Response::StopRequested
            }
            Request::TogglePause => match self.state {
                SessionState::Running => {
                    info!(emitted = self.emitted, "paused");
                    self.state = SessionState::Paused;
                    Response::Paused
                }
                SessionState::Paused => {
                    info!(emitted = self.emitted, "resumed");
                    self.state = SessionState::Running;
                    Response::Resumed
                }
                _ => Response::Rejected(Rejected::NotTyping),
            },
            Request::Configure(update) => {
                if update.is_empty() {
                    return Response::Rejected(Rejected::EmptyConfig);
                }
                let changed = update.apply_to(&mut self.config);
                if changed {
                    info!(config = ?self.config, "config updated");
                }
                Response::ConfigApplied { changed }
            }
            Request::Status => Response::Status(Box::new(self.status())),
            Request::Log => Response::Log(self.log.entries()),
        }
    }

    /// Poll the dispatcher once. Runs the session inline if the request
    /// started one; sleeps one tick if nothing was queued.
    pub fn serve_once(&mut self) -> Option<SessionSummary> {
        let Some(request) = self.dispatcher.poll() else {
            self.clock.sleep(self.scheduler.tick());
            return None;
        };

        let response = self.handle(request);
        self.dispatcher.respond(response);
        self.queued.take().map(|session| self.run_session(session))
    }

    pub fn serve(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::SeqCst) {
            self.serve_once();
        }
    }

    /// Start a session directly and run it to the end. Control requests are
    /// still serviced while it runs.
    pub fn type_text(&mut self, text: &str) -> Result<SessionSummary, Rejected> {
        let session = self.accept(text)?;
        Ok(self.run_session(session))
    }

    fn accept(&mut self, text: &str) -> Result<Session, Rejected> {
        if self.state != SessionState::Idle {
            return Err(Rejected::Busy);
        }
        if text.is_empty() {
            return Err(Rejected::EmptyText);
        }
        if !self.sink.is_connected() {
            return Err(Rejected::SinkDisconnected);
        }

        let config = self.config.clone();
        let source: Vec<char> = preprocess(text, config.newline_mode, config.code_mode)
            .chars()
            .collect();
        if source.is_empty() {
            return Err(Rejected::NothingToType);
        }

        let mut rng = StdRng::seed_from_u64(self.seeds.gen());
        let timing = TimingModel::for_session(&config, &mut rng);

        self.state = SessionState::Running;
        self.emitted = 0;
        self.total = source.len();
        self.effective = Some(timing);

        Ok(Session {
            source,
            cursor: 0,
            config,
            timing,
            injector: MistakeInjector::new(),
            rng,
            started_at: self.clock.now(),
            paused: Duration::ZERO,
            backspaces: 0,
        })
    }

    fn run_session(&mut self, mut session: Session) -> SessionSummary {
        info!(
            chars = session.source.len(),
            wpm = session.timing.wpm,
            speed = session.timing.speed_multiplier,
            "session started"
        );

        let outcome = match self.type_all(&mut session) {
            Ok(()) => Outcome::Completed,
            Err(Halt::Stopped) => Outcome::Stopped,
            Err(Halt::Disconnected) => Outcome::Disconnected,
        };

        let summary = SessionSummary {
            outcome,
            emitted: self.emitted,
            total: self.total,
            mistakes: session.injector.injected(),
            backspaces: session.backspaces,
            active_ms: self.active_elapsed(&session).as_millis() as u64,
            paused_ms: session.paused.as_millis() as u64,
        };
        self.last_session = Some(summary.clone());

        match outcome {
            Outcome::Completed => {
                info!(emitted = summary.emitted, mistakes = summary.mistakes, "session completed");
                self.state = SessionState::Completed;
                let settle = session.rng.gen_range(SETTLE_MS);
                let scheduler = self.scheduler;
                scheduler.settle(self, settle);
            }
            Outcome::Stopped => {
                info!(emitted = summary.emitted, total = summary.total, "session stopped");
            }
            Outcome::Disconnected => {
                warn!(
                    emitted = summary.emitted,
                    total = summary.total,
                    "output sink disconnected; session aborted"
                );
            }
        }

        self.state = SessionState::Idle;
        self.effective = None;
        summary
    }

    fn type_all(&mut self, s: &mut Session) -> Result<(), Halt> {
        while s.cursor < s.source.len() {
            self.step(s)?;
        }
        Ok(())
    }

    /// One source character, or one whole mistake chunk.
    fn step(&mut self, s: &mut Session) -> Result<(), Halt> {
        if self.state == SessionState::Stopping {
            return Err(Halt::Stopped);
        }
        self.wait(s, 0)?;

        let c = s.source[s.cursor];
        let remaining = s.source.len() - s.cursor;
        let elapsed = self.active_elapsed(s);
        let next_ms = s
            .timing
            .next_delay_ms(elapsed, s.cursor, remaining, &mut s.rng) as u64;

        if s.config.code_mode && c == '\n' {
            self.send(c)?;
            self.record(s, LogEntry::char(c, 0));
            self.advance(s, 1);
            return self.wait(s, next_ms);
        }

        let lively = !s.config.strict_pace;
        let is_space = c == ' ';
        let long_pause = s.config.long_pause;

        if lively && is_space && long_pause.enabled && s.rng.gen_range(0..100u32) < long_pause.percent {
            let ms = s.rng.gen_range(long_pause.min_ms..=long_pause.max_ms);
            debug!(ms, "long pause");
            self.wait(s, ms)?;
        }

        if s.injector.should_trigger(c, &s.config, &mut s.rng) {
            self.type_mistake(s, next_ms)?;
        } else {
            self.send(c)?;
            let mut extra = 0;
            if lively {
                if is_space {
                    extra += s.rng.gen_range(SPACE_EXTRA_MS);
                }
                if s.config.punctuation_pause && is_sentence_punctuation(c) {
                    extra += s.rng.gen_range(PUNCTUATION_EXTRA_MS);
                }
                if c == '\n' || c == '\r' {
                    extra += s.rng.gen_range(NEWLINE_EXTRA_MS);
                }
            }
            let hold = s.rng.gen_range(s.config.hold_min_ms..=s.config.hold_max_ms);
            self.record(s, LogEntry::char(c, hold));
            self.advance(s, 1);
            self.wait(s, next_ms + extra + hold)?;
        }

        let think = s.config.thinking_space_chance;
        if lively && is_space && think > 0 && s.rng.gen_range(0..think) == 0 {
            let ms = s.rng.gen_range(THINKING_PAUSE_MS);
            debug!(ms, "thinking pause");
            self.wait(s, ms)?;
        }

        Ok(())
    }

    /// Type a decoy run, erase it, then type the correct characters. The
    /// cursor moves past the whole chunk only once the correction is done.
    fn type_mistake(&mut self, s: &mut Session, next_ms: u64) -> Result<(), Halt> {
        let chunk = s.injector.plan(&s.source, s.cursor, &s.config, &mut s.rng);
        let correct: String = chunk.correct().iter().collect();
        debug!(at = s.cursor, %correct, decoy = %chunk.decoy_string(), "mistake");

        s.injector.begin();
        let played = self.play_chunk(s, &chunk, next_ms);
        s.injector.finish();
        played?;

        s.cursor += chunk.len();
        Ok(())
    }

    fn play_chunk(&mut self, s: &mut Session, chunk: &MistakeChunk, next_ms: u64) -> Result<(), Halt> {
        for &wrong in chunk.decoy() {
            self.send(wrong)?;
            let hold = s.rng.gen_range(s.config.hold_min_ms..=s.config.hold_max_ms);
            self.record(s, LogEntry::char(wrong, hold));
            self.wait(s, hold)?;
        }
        self.record(s, LogEntry::mistake_sent(&chunk.decoy_string()));

        self.wait(s, next_ms.max(REVIEW_PAUSE_MIN_MS))?;

        for _ in 0..chunk.backspaces() {
            self.send_backspace()?;
            s.backspaces += 1;
            let gap = s.rng.gen_range(BACKSPACE_GAP_MS);
            self.wait(s, gap)?;
        }
        self.record(s, LogEntry::mistake_backspace(chunk.backspaces()));

        for &right in chunk.correct() {
            self.send(right)?;
            let hold = s.rng.gen_range(s.config.hold_min_ms..=s.config.hold_max_ms);
            self.record(s, LogEntry::char(right, hold));
            self.emitted += 1;
            self.wait(s, (next_ms / 2).max(hold))?;
        }
        Ok(())
    }

    fn send(&mut self, c: char) -> Result<(), Halt> {
        if !self.sink.is_connected() {
            return Err(Halt::Disconnected);
        }
        self.sink.send(c);
        Ok(())
    }

    fn send_backspace(&mut self) -> Result<(), Halt> {
        if !self.sink.is_connected() {
            return Err(Halt::Disconnected);
        }
        self.sink.send_backspace();
        Ok(())
    }

    fn advance(&mut self, s: &mut Session, n: usize) {
        s.cursor += n;
        self.emitted += n;
    }

    fn record(&mut self, s: &Session, entry: LogEntry) {
        if s.config.logging_enabled {
            self.log.append(entry);
        }
    }

    fn wait(&mut self, s: &mut Session, ms: u64) -> Result<(), Halt> {
        let scheduler = self.scheduler;
        match scheduler.wait(self, ms) {
            Waited::Done { paused } => {
                s.paused += paused;
                Ok(())
            }
            Waited::Stopped { paused } => {
                s.paused += paused;
                Err(Halt::Stopped)
            }
        }
    }

    fn active_elapsed(&self, s: &Session) -> Duration {
        self.clock
            .now()
            .saturating_sub(s.started_at)
            .saturating_sub(s.paused)
    }
}

impl<S: OutputSink, D: Dispatcher, C: Clock> Cooperative for Typist<S, D, C> {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn sleep(&mut self, duration: Duration) {
        self.clock.sleep(duration);
    }

    fn service(&mut self) {
        if let Some(request) = self.dispatcher.poll() {
            let response = self.handle(request);
            self.dispatcher.respond(response);
        }
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

fn is_sentence_punctuation(c: char) -> bool {
    matches!(c, '.' | ',' | '!' | '?' | ';' | ':')
}
