//! Application-level configuration loading: round timing, room codes, tokens and seed questions.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::{NewQuestion, UserId};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_BACK_CONFIG_PATH";

const DEFAULT_ANSWER_TIME_SECS: u32 = 20;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_ROOM_CODE_LENGTH: usize = 6;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    answer_time_secs: u32,
    tick_interval: Duration,
    room_code_length: usize,
    wrong_answer_ends_round: bool,
    auth_tokens: HashMap<String, UserId>,
    seed_questions: Vec<NewQuestion>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        answer_time_secs = app_config.answer_time_secs,
                        tokens = app_config.auth_tokens.len(),
                        "loaded configuration"
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

    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Seconds the selected player has to answer.
    pub fn answer_time_secs(&self) -> u32 {
        self.answer_time_secs
    }

    /// Period between two countdown ticks.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn room_code_length(&self) -> usize {
        self.room_code_length
    }

    /// Whether an incorrect answer ends the round instead of letting the clock run.
    pub fn wrong_answer_ends_round(&self) -> bool {
        self.wrong_answer_ends_round
    }

    /// Static bearer tokens; empty means tokens are plain user ids.
    pub fn auth_tokens(&self) -> &HashMap<String, UserId> {
        &self.auth_tokens
    }

    /// Questions added to the bank when it is empty.
    pub fn seed_questions(&self) -> &[NewQuestion] {
        &self.seed_questions
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    answer_time_secs: Option<u32>,
    tick_interval_ms: Option<u64>,
    room_code_length: Option<usize>,
    wrong_answer_ends_round: bool,
    auth_tokens: HashMap<String, UserId>,
    seed_questions: Option<Vec<NewQuestion>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            answer_time_secs: value
                .answer_time_secs
                .unwrap_or(DEFAULT_ANSWER_TIME_SECS)
                .max(1),
            tick_interval: Duration::from_millis(
                value
                    .tick_interval_ms
                    .unwrap_or(DEFAULT_TICK_INTERVAL_MS)
                    .max(1),
            ),
            room_code_length: value
                .room_code_length
                .unwrap_or(DEFAULT_ROOM_CODE_LENGTH)
                .clamp(4, 12),
            wrong_answer_ends_round: value.wrong_answer_ends_round,
            auth_tokens: value.auth_tokens,
            seed_questions: value.seed_questions.unwrap_or_else(default_seed_questions),
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

/// Built-in riddles shipped with the binary.
fn default_seed_questions() -> Vec<NewQuestion> {
    [
        ("What is the capital of France?", "Paris"),
        ("What has keys but can't open locks?", "Piano"),
        (
            "What comes once in a minute, twice in a moment, but never in a thousand years?",
            "The letter M",
        ),
        (
            "I speak without a mouth and hear without ears. I have no body, but I come alive with wind. What am I?",
            "Echo",
        ),
    ]
    .into_iter()
    .map(|(text, answer)| NewQuestion {
        text: text.into(),
        answer: answer.into(),
        category: None,
        difficulty: None,
    })
    .collect()
}
