use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration at startup. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read or written.
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A configuration file is not valid JSON for its schema.
    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The question bank holds no questions, so no round could ever be played.
    #[error("question bank {} is empty", path.display())]
    EmptyQuestionBank { path: PathBuf },
    /// A question has a blank text or answer and could never be played.
    #[error("question #{index} in {} has a blank text or answer", path.display())]
    BlankQuestion { path: PathBuf, index: usize },
}

/// Reasons a `join` request is refused. The display text is sent back as the `joinError` reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRejected {
    #[error("코드가 올바르지 않습니다.")]
    InvalidCode,
    #[error("존재하지 않는 조입니다: {0}")]
    UnknownTeam(String),
    #[error("닉네임은 1~{max}자여야 합니다.")]
    InvalidNickname { max: usize },
}
