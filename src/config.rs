use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::ConfigError;
use crate::types::{GameConfig, Question};

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_default(path: &Path, value: serde_json::Value) -> Result<(), ConfigError> {
    let body = serde_json::to_string_pretty(&value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(io_error(path))?;
    info!(path = %path.display(), "wrote default config file");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Initialize config directory with defaults if missing.
pub fn init() -> Result<(), ConfigError> {
    let base = config_path("");
    if !base.exists() {
        fs::create_dir_all(&base).map_err(io_error(&base))?;
    }

    let game_path = config_path("game.json");
    if !game_path.exists() {
        let defaults = serde_json::to_value(GameConfig::default()).map_err(|source| {
            ConfigError::Parse {
                path: game_path.clone(),
                source,
            }
        })?;
        write_default(&game_path, defaults)?;
    }

    let questions_path = config_path("questions.json");
    if !questions_path.exists() {
        write_default(
            &questions_path,
            serde_json::json!([
                { "text": "동물", "answer": "고양이" },
                { "text": "과일", "answer": "사과" },
                { "text": "탈것", "answer": "자전거" }
            ]),
        )?;
    }

    Ok(())
}

/// Load the game configuration.
pub fn load_game_config() -> Result<GameConfig, ConfigError> {
    read_json(&config_path("game.json"))
}

/// Load the question bank. An empty bank is an error: no round could ever hand out a question.
pub fn load_questions() -> Result<Vec<Question>, ConfigError> {
    let path = config_path("questions.json");
    parse_questions(&path, &fs::read_to_string(&path).map_err(io_error(&path))?)
}

fn parse_questions(path: &Path, data: &str) -> Result<Vec<Question>, ConfigError> {
    let questions: Vec<Question> =
        serde_json::from_str(data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if questions.is_empty() {
        return Err(ConfigError::EmptyQuestionBank {
            path: path.to_path_buf(),
        });
    }

    if let Some(index) = questions
        .iter()
        .position(|q| q.text.trim().is_empty() || q.answer.trim().is_empty())
    {
        return Err(ConfigError::BlankQuestion {
            path: path.to_path_buf(),
            index,
        });
    }

    info!(path = %path.display(), count = questions.len(), "question bank loaded");
    Ok(questions)
}
