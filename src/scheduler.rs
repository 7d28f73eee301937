use std::time::Duration;

use crate::engine::SessionState;

pub const DEFAULT_TICK: Duration = Duration::from_millis(2);

/// What the scheduler needs from its host: time, a way to service pending
/// requests, and the session state those requests may change.
pub trait Cooperative {
    fn now(&self) -> Duration;
    fn sleep(&mut self, duration: Duration);
    /// Handle whatever the dispatcher has queued. May change [`Self::state`].
    fn service(&mut self);
    fn state(&self) -> SessionState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waited {
    /// The full duration elapsed while running. `paused` is the wall time
    /// spent paused inside the wait, which did not count against it.
    Done { paused: Duration },
    /// The session left Running/Paused. `paused` still reports the paused
    /// time spent before that happened.
    Stopped { paused: Duration },
}

/// The only way the engine waits. Every slice services the dispatcher first,
/// so no single sleep is longer than one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooperativeScheduler {
    tick: Duration,
}

impl CooperativeScheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Wait `ms` milliseconds of running time.
    ///
    /// Paused slices are serviced but not counted. Anything other than
    /// Running or Paused ends the wait early. `wait(host, 0)` services once and
    /// holds for as long as the session stays paused.
    pub fn wait<H: Cooperative>(&self, host: &mut H, ms: u64) -> Waited {
        let target = Duration::from_millis(ms);
        let mut waited = Duration::ZERO;
        let mut paused = Duration::ZERO;

        loop {
            host.service();
            match host.state() {
                SessionState::Running => {
                    if waited >= target {
                        return Waited::Done { paused };
                    }
                    let step = (target - waited).min(self.tick);
                    let before = host.now();
                    host.sleep(step);
                    waited += host.now().saturating_sub(before).max(step);
                }
                SessionState::Paused => {
                    let before = host.now();
                    host.sleep(self.tick);
                    paused += host.now().saturating_sub(before);
                }
                _ => return Waited::Stopped { paused },
            }
        }
    }

    /// Post-completion settle: counts while the host stays Completed and
    /// returns as soon as anything moves it elsewhere.
    pub fn settle<H: Cooperative>(&self, host: &mut H, ms: u64) {
        let target = Duration::from_millis(ms);
        let mut waited = Duration::ZERO;

        loop {
            host.service();
            if host.state() != SessionState::Completed || waited >= target {
                return;
            }
            let step = (target - waited).min(self.tick);
            let before = host.now();
            host.sleep(step);
            waited += host.now().saturating_sub(before).max(step);
        }
    }
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted host: state changes fire when virtual time crosses a mark.
    struct ScriptedHost {
        now: Duration,
        state: SessionState,
        script: Vec<(Duration, SessionState)>,
        serviced: usize,
        longest_sleep: Duration,
    }

    impl ScriptedHost {
        fn new(script: &[(u64, SessionState)]) -> Self {
            Self {
                now: Duration::ZERO,
                state: SessionState::Running,
                script: script
                    .iter()
                    .rev()
                    .map(|&(ms, s)| (Duration::from_millis(ms), s))
                    .collect(),
                serviced: 0,
                longest_sleep: Duration::ZERO,
            }
        }
    }

    impl Cooperative for ScriptedHost {
        fn now(&self) -> Duration {
            self.now
        }

        fn sleep(&mut self, duration: Duration) {
            self.longest_sleep = self.longest_sleep.max(duration);
            self.now += duration;
        }

        fn service(&mut self) {
            self.serviced += 1;
            while let Some(&(at, state)) = self.script.last() {
                if at > self.now {
                    break;
                }
                self.state = state;
                self.script.pop();
            }
        }

        fn state(&self) -> SessionState {
            self.state
        }
    }

    #[test]
    fn plain_wait_runs_for_the_full_duration_in_ticks() {
        let scheduler = CooperativeScheduler::default();
        let mut host = ScriptedHost::new(&[]);

        let waited = scheduler.wait(&mut host, 15);
        assert_eq!(waited, Waited::Done { paused: Duration::ZERO });
        assert_eq!(host.now, Duration::from_millis(15));
        assert!(host.longest_sleep <= scheduler.tick());
        assert!(host.serviced >= 8);
    }

    #[test]
    fn stop_shortens_the_wait_to_one_tick() {
        let scheduler = CooperativeScheduler::default();
        let mut host = ScriptedHost::new(&[(10, SessionState::Stopping)]);

        assert_eq!(
            scheduler.wait(&mut host, 5_000),
            Waited::Stopped {
                paused: Duration::ZERO
            }
        );
        assert!(host.now <= Duration::from_millis(10) + scheduler.tick());
    }

    #[test]
    fn paused_time_does_not_count_against_the_wait() {
        let scheduler = CooperativeScheduler::default();
        let mut host = ScriptedHost::new(&[
            (4, SessionState::Paused),
            (504, SessionState::Running),
        ]);

        let waited = scheduler.wait(&mut host, 20);
        assert_eq!(
            waited,
            Waited::Done {
                paused: Duration::from_millis(500)
            }
        );
        assert_eq!(host.now, Duration::from_millis(520));
    }

    #[test]
    fn zero_wait_holds_while_paused() {
        let scheduler = CooperativeScheduler::default();
        let mut host = ScriptedHost::new(&[(0, SessionState::Paused), (30, SessionState::Running)]);

        let waited = scheduler.wait(&mut host, 0);
        assert_eq!(
            waited,
            Waited::Done {
                paused: Duration::from_millis(30)
            }
        );
    }

    #[test]
    fn stop_while_paused_ends_the_wait() {
        let scheduler = CooperativeScheduler::default();
        let mut host = ScriptedHost::new(&[(0, SessionState::Paused), (40, SessionState::Stopping)]);

        assert_eq!(
            scheduler.wait(&mut host, 100),
            Waited::Stopped {
                paused: Duration::from_millis(40)
            }
        );
        assert_eq!(host.now, Duration::from_millis(40));
    }

    #[test]
    fn settle_ends_when_state_leaves_completed() {
        let scheduler = CooperativeScheduler::default();

        let mut host = ScriptedHost::new(&[]);
        host.state = SessionState::Completed;
        scheduler.settle(&mut host, 300);
        assert_eq!(host.now, Duration::from_millis(300));

        let mut host = ScriptedHost::new(&[(50, SessionState::Idle)]);
        host.state = SessionState::Completed;
        scheduler.settle(&mut host, 300);
        assert_eq!(host.now, Duration::from_millis(50));
    }
}
