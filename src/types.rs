use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fixed team slots in a room.
pub const TEAM_COUNT: u8 = 6;

/// Token every canonical team key ends with ("1조", "2조", ...).
pub const TEAM_SUFFIX: &str = "조";

/// One of the fixed team slots, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Team(u8);

impl Team {
    /// Every team slot, in display order.
    pub fn all() -> impl Iterator<Item = Team> {
        (1..=TEAM_COUNT).map(Team)
    }

    /// Canonical key for a raw team name: the suffix is appended when absent.
    ///
    /// Normalizing an already-canonical key returns it unchanged.
    pub fn normalize(raw: &str) -> String {
        let raw = raw.trim();
        if raw.contains(TEAM_SUFFIX) {
            raw.to_string()
        } else {
            format!("{raw}{TEAM_SUFFIX}")
        }
    }

    /// Resolve a raw team name to one of the fixed slots.
    pub fn from_raw(raw: &str) -> Option<Team> {
        let key = Self::normalize(raw);
        Self::all().find(|team| team.key() == key)
    }

    pub fn key(self) -> String {
        format!("{}{}", self.0, TEAM_SUFFIX)
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0, TEAM_SUFFIX)
    }
}

impl Serialize for Team {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Team {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Team::from_raw(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown team `{raw}`")))
    }
}

/// What a participant does within their team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Draws and is shown the answer.
    Host,
    Guesser,
}

impl Role {
    /// Suffix shown next to a nickname in the player list.
    pub fn label(self) -> &'static str {
        match self {
            Self::Host => "출제자",
            Self::Guesser => "참가자",
        }
    }
}

/// Where a participant sits: their team and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seat {
    pub team: Team,
    pub role: Role,
}

/// A single prompt from the question bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub answer: String,
}

/// One line of a team leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub nickname: String,
    pub score: u32,
}

/// Game configuration loaded from game.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Lead time between `startGame` and the first question.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u64,
    /// How long a disconnected participant keeps their roster slot.
    #[serde(default = "default_disconnect_grace_seconds")]
    pub disconnect_grace_seconds: u64,
    /// Send the answer to guessers too (honor-system play).
    #[serde(default)]
    pub reveal_answer_to_guessers: bool,
}

fn default_countdown_seconds() -> u64 {
    3
}

fn default_disconnect_grace_seconds() -> u64 {
    10
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: default_countdown_seconds(),
            disconnect_grace_seconds: default_disconnect_grace_seconds(),
            reveal_answer_to_guessers: false,
        }
    }
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    CodeResult {
        valid: bool,
    },
    Code {
        code: String,
    },
    PlayerList {
        teams: IndexMap<String, Vec<String>>,
    },
    JoinSuccess,
    JoinError {
        reason: String,
    },
    GameStarted {
        #[serde(rename = "startAt")]
        start_at: u64,
    },
    SendQuestion {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
    },
    AnswerResult {
        #[serde(rename = "isCorrect")]
        is_correct: bool,
        nickname: String,
        score: u32,
        team: Team,
    },
    FinalResult {
        results: IndexMap<Team, Vec<ScoreEntry>>,
    },
    GameReset,

    // Canvas relay
    Draw {
        data: serde_json::Value,
    },
    ClearCanvas,
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    // Admission
    GetCode,
    VerifyCode { code: String },
    AdminJoin,
    Join(JoinRequest),

    // Round control
    StartGame,
    RequestStartStatus,
    RequestPlayerList,
    SubmitAnswer { guess: String },
    GameTimeOver,
    ResetGame,

    // Canvas relay
    Draw {
        #[serde(default)]
        data: serde_json::Value,
    },
    ClearCanvas,
}

/// Payload of a `join` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub nickname: String,
    pub code: String,
    pub team: String,
    pub role: Role,
}
