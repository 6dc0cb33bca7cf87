use crate::domain::models::{Settings, Task, TimerMode, TimerState};
use crate::domain::timer::SessionTransition;
use serde::Serialize;

pub const APP_TITLE: &str = "PomoTask";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub mode: TimerMode,
    pub mode_label: &'static str,
    pub clock: String,
    pub round_label: String,
    pub is_running: bool,
    pub progress: f64,
    pub window_title: String,
}

impl TimerView {
    pub fn from_state(state: &TimerState, settings: &Settings) -> Self {
        let clock = format_clock(state.time_left);
        let total = settings.duration_seconds(state.mode);
        let progress = if total == 0 {
            0.0
        } else {
            (1.0 - f64::from(state.time_left) / f64::from(total)).clamp(0.0, 1.0)
        };
        let window_title = if state.is_running {
            format!("{clock} - {APP_TITLE}")
        } else {
            APP_TITLE.to_string()
        };

        Self {
            mode: state.mode,
            mode_label: state.mode.label(),
            round_label: format!("Round: {} / {}", state.current_round, settings.rounds),
            is_running: state.is_running,
            progress,
            window_title,
            clock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: u64,
    pub text_html: String,
    pub completed: bool,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            text_html: escape_html(&task.text),
            completed: task.completed,
        }
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn notification_for(transition: &SessionTransition) -> (&'static str, &'static str) {
    match transition.next {
        TimerMode::LongBreak => ("Cycle complete!", "Great work! Time for a long break."),
        TimerMode::ShortBreak => ("Focus complete!", "Time for a short break."),
        TimerMode::Focus => ("Break over!", "Back to focus."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(6000), "100:00");
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<img src=x onerror="alert('x')"> & more"#),
            "&lt;img src=x onerror=&quot;alert(&#39;x&#39;)&quot;&gt; &amp; more"
        );
    }

    #[test]
    fn view_reports_progress_round_and_title() {
        let settings = Settings::default();
        let state = TimerState {
            mode: TimerMode::ShortBreak,
            time_left: 150,
            is_running: true,
            current_round: 2,
        };
        let view = TimerView::from_state(&state, &settings);

        assert_eq!(view.clock, "02:30");
        assert_eq!(view.mode_label, "Short break");
        assert_eq!(view.round_label, "Round: 2 / 4");
        assert!((view.progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(view.window_title, "02:30 - PomoTask");
    }

    #[test]
    fn paused_view_uses_plain_title() {
        let settings = Settings::default();
        let view = TimerView::from_state(&TimerState::fresh(&settings), &settings);
        assert_eq!(view.window_title, "PomoTask");
        assert_eq!(view.progress, 0.0);
    }
}
