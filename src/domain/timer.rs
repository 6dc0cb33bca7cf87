use crate::domain::models::{
    CompletedCycle, Settings, StoredTimerState, TimerMode, TimerState, MIN_ROUNDS,
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    pub finished: TimerMode,
    pub next: TimerMode,
    pub cycle: Option<CompletedCycle>,
}

impl SessionTransition {
    pub fn entered_break(&self) -> bool {
        self.next.is_break()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer was paused when the tick arrived.
    Idle,
    Counted { checkpoint_due: bool },
    Completed(SessionTransition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomodoroTimer {
    state: TimerState,
    settings: Settings,
}

impl PomodoroTimer {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: TimerState::fresh(&settings),
            settings,
        }
    }

    pub fn restore(settings: Settings, saved: StoredTimerState) -> Self {
        Self {
            state: TimerState::restore(saved, &settings),
            settings,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns `true` when the call actually started the countdown.
    pub fn start(&mut self) -> bool {
        if self.state.is_running {
            return false;
        }
        self.state.is_running = true;
        true
    }

    /// Returns `true` when the call actually stopped a running countdown.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_running {
            return false;
        }
        self.state.is_running = false;
        true
    }

    pub fn reset(&mut self) {
        self.state = TimerState::fresh(&self.settings);
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if !self.state.is_running {
            return TickOutcome::Idle;
        }
        if self.state.time_left > 0 {
            self.state.time_left -= 1;
            return TickOutcome::Counted {
                checkpoint_due: self.state.time_left % 60 == 0,
            };
        }
        TickOutcome::Completed(self.complete_session(now))
    }

    pub fn complete_session(&mut self, now: DateTime<Utc>) -> SessionTransition {
        self.state.is_running = false;
        let finished = self.state.mode;

        let (next, cycle) = match finished {
            TimerMode::Focus if self.state.current_round < self.settings.rounds => {
                self.state.current_round += 1;
                (TimerMode::ShortBreak, None)
            }
            TimerMode::Focus => {
                self.state.current_round = 1;
                let cycle = CompletedCycle {
                    date: now,
                    rounds: self.settings.rounds,
                    duration: self.settings.focus_duration,
                    tasks_completed: None,
                };
                (TimerMode::LongBreak, Some(cycle))
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => (TimerMode::Focus, None),
        };

        self.state.mode = next;
        self.state.time_left = self.settings.duration_seconds(next);

        SessionTransition {
            finished,
            next,
            cycle,
        }
    }

    /// Swaps in already validated settings. A paused timer picks up the new duration
    /// for its current mode immediately; a running one keeps counting.
    pub fn apply_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.state.current_round = self
            .state
            .current_round
            .clamp(1, self.settings.rounds.max(MIN_ROUNDS));
        if !self.state.is_running {
            self.state.time_left = self.settings.duration_seconds(self.state.mode);
        }
    }
}
