#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use typist::clock::{Clock, ManualClock};
use typist::config::TypingConfig;
use typist::dispatch::{Dispatcher, Request, Response};
use typist::sim::SimulatedEditor;
use typist::{SessionSummary, Typist};

/// Dispatcher that releases each request once virtual time reaches its mark.
pub struct ScriptedDispatcher {
    clock: ManualClock,
    script: VecDeque<(Duration, Request)>,
    responses: Vec<(Duration, Response)>,
}

impl ScriptedDispatcher {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            script: VecDeque::new(),
            responses: Vec::new(),
        }
    }

    /// Queue `request` for time `ms`. Marks must be non-decreasing.
    pub fn at(mut self, ms: u64, request: Request) -> Self {
        self.script.push_back((Duration::from_millis(ms), request));
        self
    }

    pub fn is_drained(&self) -> bool {
        self.script.is_empty()
    }

    pub fn responses(&self) -> &[(Duration, Response)] {
        &self.responses
    }

    pub fn response_to(&self, index: usize) -> &Response {
        &self.responses[index].1
    }
}

impl Dispatcher for ScriptedDispatcher {
    fn poll(&mut self) -> Option<Request> {
        let (at, _) = self.script.front()?;
        if *at > self.clock.now() {
            return None;
        }
        self.script.pop_front().map(|(_, request)| request)
    }

    fn respond(&mut self, response: Response) {
        self.responses.push((self.clock.now(), response));
    }
}

pub type SimTypist = Typist<SimulatedEditor, ScriptedDispatcher, ManualClock>;

pub fn quiet_config() -> TypingConfig {
    TypingConfig {
        mistake_chance_percent: 0,
        ..Default::default()
    }
}

pub fn sim_typist(
    editor: SimulatedEditor,
    script: impl FnOnce(ScriptedDispatcher) -> ScriptedDispatcher,
    config: TypingConfig,
    seed: u64,
) -> (SimTypist, ManualClock) {
    let clock = ManualClock::new();
    let dispatcher = script(ScriptedDispatcher::new(&clock));
    let typist = Typist::new(editor, dispatcher, clock.clone())
        .with_config(config)
        .with_seed(seed);
    (typist, clock)
}

/// Serve until every scripted request has been handled and the host is idle.
pub fn run_script(typist: &mut SimTypist) -> Vec<SessionSummary> {
    let mut summaries = Vec::new();
    for _ in 0..1_000_000 {
        if let Some(summary) = typist.serve_once() {
            summaries.push(summary);
        }
        if typist.dispatcher().is_drained() && typist.state() == typist::SessionState::Idle {
            return summaries;
        }
    }
    panic!("script did not finish");
}

pub fn start(text: &str) -> Request {
    Request::Start {
        text: text.to_string(),
    }
}
