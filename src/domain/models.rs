use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MIN_FOCUS_MINUTES: u32 = 5;
pub const MIN_SHORT_BREAK_MINUTES: u32 = 1;
pub const LONG_BREAK_MARGIN_MINUTES: u32 = 5;
pub const MIN_ROUNDS: u32 = 1;
pub const SETTINGS_EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short break",
            Self::LongBreak => "Long break",
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Self::Focus)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub focus_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub rounds: u32,
    pub sound_alert: bool,
    pub auto_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_duration: 25,
            short_break_duration: 5,
            long_break_duration: 15,
            rounds: 4,
            sound_alert: false,
            auto_check: false,
        }
    }
}

impl Settings {
    /// Clamps every numeric field into its supported range.
    ///
    /// The long break is kept at least five minutes longer than the short break so the
    /// end of a cycle is always distinguishable from an ordinary pause.
    pub fn validate(&mut self) {
        self.focus_duration = self.focus_duration.max(MIN_FOCUS_MINUTES);
        self.short_break_duration = self.short_break_duration.max(MIN_SHORT_BREAK_MINUTES);
        self.long_break_duration = self
            .long_break_duration
            .max(self.short_break_duration.saturating_add(LONG_BREAK_MARGIN_MINUTES));
        self.rounds = self.rounds.max(MIN_ROUNDS);
    }

    pub fn validated(mut self) -> Self {
        self.validate();
        self
    }

    pub fn duration_minutes(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_duration,
            TimerMode::ShortBreak => self.short_break_duration,
            TimerMode::LongBreak => self.long_break_duration,
        }
    }

    pub fn duration_seconds(&self, mode: TimerMode) -> u32 {
        self.duration_minutes(mode).saturating_mul(60)
    }

    /// Replaces the four numeric fields from a named preset. Unknown names leave the
    /// settings untouched and return `false`.
    pub fn apply_preset(&mut self, name: &str) -> bool {
        let Some(preset) = Preset::from_name(name) else {
            return false;
        };
        let values = preset.values();
        self.focus_duration = values.focus_duration;
        self.short_break_duration = values.short_break_duration;
        self.long_break_duration = values.long_break_duration;
        self.rounds = values.rounds;
        true
    }

    pub fn merge(&mut self, patch: &SettingsPatch) {
        if let Some(value) = patch.focus_duration {
            self.focus_duration = value;
        }
        if let Some(value) = patch.short_break_duration {
            self.short_break_duration = value;
        }
        if let Some(value) = patch.long_break_duration {
            self.long_break_duration = value;
        }
        if let Some(value) = patch.rounds {
            self.rounds = value;
        }
        if let Some(value) = patch.sound_alert {
            self.sound_alert = value;
        }
        if let Some(value) = patch.auto_check {
            self.auto_check = value;
        }
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }

    pub fn export(&self, now: DateTime<Utc>) -> SettingsExport {
        SettingsExport {
            settings: self.clone(),
            exported_at: now,
            version: SETTINGS_EXPORT_VERSION.to_string(),
        }
    }

    /// Imports an exported payload. Only known fields whose JSON type matches the current
    /// field type are taken; everything else is dropped silently.
    pub fn import(&mut self, data: &Value) -> Result<(), String> {
        let incoming = data
            .get("settings")
            .and_then(Value::as_object)
            .ok_or_else(|| "settings export must contain a settings object".to_string())?;
        let accepted = self.accepted_fields(incoming)?;
        self.merge_fields(accepted)?;
        self.validate();
        Ok(())
    }

    /// Sets a single field by its camelCase name. Unknown keys and mismatched value
    /// types are ignored.
    pub fn update_field(&mut self, key: &str, value: Value) -> Result<bool, String> {
        let mut single = Map::new();
        single.insert(key.to_string(), value);
        let accepted = self.accepted_fields(&single)?;
        if accepted.is_empty() {
            return Ok(false);
        }
        self.merge_fields(accepted)?;
        self.validate();
        Ok(true)
    }

    fn accepted_fields(&self, incoming: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        let current = serde_json::to_value(&*self).map_err(|error| error.to_string())?;
        let Value::Object(current) = current else {
            return Err("settings did not serialize to an object".to_string());
        };

        Ok(current
            .iter()
            .filter_map(|(key, existing)| {
                let candidate = incoming.get(key)?;
                let same_kind = match existing {
                    Value::Bool(_) => candidate.is_boolean(),
                    Value::Number(_) => candidate
                        .as_u64()
                        .is_some_and(|number| number <= u64::from(u32::MAX)),
                    _ => false,
                };
                same_kind.then(|| (key.clone(), candidate.clone()))
            })
            .collect())
    }

    fn merge_fields(&mut self, fields: Map<String, Value>) -> Result<(), String> {
        let mut merged = serde_json::to_value(&*self).map_err(|error| error.to_string())?;
        if let Value::Object(object) = &mut merged {
            object.extend(fields);
        }
        *self = serde_json::from_value(merged).map_err(|error| error.to_string())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub focus_duration: Option<u32>,
    pub short_break_duration: Option<u32>,
    pub long_break_duration: Option<u32>,
    pub rounds: Option<u32>,
    pub sound_alert: Option<bool>,
    pub auto_check: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsExport {
    pub settings: Settings,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Classic,
    Short,
    Long,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetValues {
    pub focus_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub rounds: u32,
}

impl Preset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "classic" => Some(Self::Classic),
            "short" => Some(Self::Short),
            "long" => Some(Self::Long),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn values(self) -> PresetValues {
        let (focus_duration, short_break_duration, long_break_duration, rounds) = match self {
            Self::Classic => (25, 5, 15, 4),
            Self::Short => (15, 3, 10, 6),
            Self::Long => (45, 10, 30, 3),
            Self::Custom => (30, 7, 20, 4),
        };
        PresetValues {
            focus_duration,
            short_break_duration,
            long_break_duration,
            rounds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub mode: TimerMode,
    pub time_left: u32,
    pub is_running: bool,
    pub current_round: u32,
}

impl TimerState {
    pub fn fresh(settings: &Settings) -> Self {
        Self {
            mode: TimerMode::Focus,
            time_left: settings.duration_seconds(TimerMode::Focus),
            is_running: false,
            current_round: 1,
        }
    }

    /// Rebuilds a state from a checkpoint. A restored timer is never running, and any
    /// field that is missing or out of range falls back to what a fresh timer would use.
    pub fn restore(saved: StoredTimerState, settings: &Settings) -> Self {
        let mode = saved.mode.unwrap_or_default();
        let full = settings.duration_seconds(mode);
        let time_left = match saved.time_left {
            Some(value) if value > 0 => value.min(full),
            _ => full,
        };
        let current_round = saved
            .current_round
            .filter(|round| *round > 0)
            .unwrap_or(1)
            .min(settings.rounds.max(MIN_ROUNDS));

        Self {
            mode,
            time_left,
            is_running: false,
            current_round,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredTimerState {
    pub mode: Option<TimerMode>,
    pub time_left: Option<u32>,
    pub current_round: Option<u32>,
    pub is_running: Option<bool>,
}

/// Largest task id handed out by a counter: the largest integer a JSON number keeps
/// exactly in every client.
pub const MAX_TASK_ID: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    /// Fields written by other clients are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: u64, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.to_string(),
            completed: false,
            created_at: Some(now),
            updated_at: None,
            completed_at: None,
            synced_at: None,
            extra: Map::new(),
        }
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.completed_at = completed.then_some(now);
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedCycle {
    pub date: DateTime<Utc>,
    pub rounds: u32,
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<u32>,
}

pub fn normalize_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
