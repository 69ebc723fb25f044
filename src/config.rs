//! Application-level configuration loading: match timings, miss threshold and the seed question bank.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::{dao::models::QuestionEntity, state::match_state::Difficulty};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_DUEL_CONFIG_PATH";

const MATCH_DURATION_ENV: &str = "GAME_DURATION_MS";
const QUESTION_DURATION_ENV: &str = "QUESTION_DURATION_MS";
const MAX_WRONG_ENV: &str = "GAME_MAX_WRONG";
const DIFFICULTY_ENV: &str = "GAME_DIFFICULTY";

const DEFAULT_MATCH_DURATION: Duration = Duration::from_secs(10 * 60);
const DEFAULT_QUESTION_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_MAX_WRONG: u32 = 3;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Length of a match, fixed when it becomes active.
    pub match_duration: Duration,
    /// Time allowed to answer each question.
    pub question_duration: Duration,
    /// Misses after which a participant is disqualified.
    pub max_wrong: u32,
    /// Difficulty applied when a create request does not name one.
    pub default_difficulty: Option<Difficulty>,
    /// Seed content for the in-memory question bank.
    pub questions: Vec<QuestionEntity>,
}

impl AppConfig {
    /// Load the configuration from disk then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        questions = app_config.questions.len(),
                        "loaded configuration file"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Override timings, threshold and difficulty from `lookup`; unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = parse_var::<u64>(&lookup, MATCH_DURATION_ENV) {
            self.match_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, QUESTION_DURATION_ENV) {
            self.question_duration = Duration::from_millis(ms);
        }
        if let Some(max_wrong) = parse_var::<u32>(&lookup, MAX_WRONG_ENV) {
            if max_wrong >= 1 {
                self.max_wrong = max_wrong;
            } else {
                warn!(var = MAX_WRONG_ENV, "threshold must be at least 1; ignoring");
            }
        }
        if let Some(raw) = lookup(DIFFICULTY_ENV).filter(|raw| !raw.trim().is_empty()) {
            match serde_json::from_value::<Difficulty>(serde_json::Value::String(
                raw.trim().to_ascii_lowercase(),
            )) {
                Ok(difficulty) => self.default_difficulty = Some(difficulty),
                Err(err) => warn!(var = DIFFICULTY_ENV, value = %raw, error = %err, "ignoring unknown difficulty"),
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            match_duration: DEFAULT_MATCH_DURATION,
            question_duration: DEFAULT_QUESTION_DURATION,
            max_wrong: DEFAULT_MAX_WRONG,
            default_difficulty: None,
            questions: Vec::new(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    match_duration_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    question_duration_ms: Duration,
    max_wrong: u32,
    default_difficulty: Option<Difficulty>,
    questions: Vec<QuestionEntity>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let defaults = AppConfig::default();
        Self {
            match_duration_ms: defaults.match_duration,
            question_duration_ms: defaults.question_duration,
            max_wrong: defaults.max_wrong,
            default_difficulty: defaults.default_difficulty,
            questions: defaults.questions,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            match_duration: value.match_duration_ms,
            question_duration: value.question_duration_ms,
            max_wrong: value.max_wrong.max(1),
            default_difficulty: value.default_difficulty,
            questions: value.questions,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
