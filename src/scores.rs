use indexmap::IndexMap;

use crate::types::{ScoreEntry, Team};

/// Per-team, per-nickname points. Entries appear on a player's first score and only grow.
#[derive(Debug, Default)]
pub struct ScoreLedger {
    scores: IndexMap<Team, IndexMap<String, u32>>,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the player's score and return the new total.
    pub fn record(&mut self, team: Team, nickname: &str, delta: u32) -> u32 {
        let score = self
            .scores
            .entry(team)
            .or_default()
            .entry(nickname.to_string())
            .or_insert(0);
        *score += delta;
        *score
    }

    pub fn score(&self, team: Team, nickname: &str) -> u32 {
        self.scores
            .get(&team)
            .and_then(|players| players.get(nickname))
            .copied()
            .unwrap_or(0)
    }

    /// Team scores, highest first. Equal scores keep the order players first scored in.
    pub fn leaderboard(&self, team: Team) -> Vec<ScoreEntry> {
        let mut entries: Vec<ScoreEntry> = self
            .scores
            .get(&team)
            .map(|players| {
                players
                    .iter()
                    .map(|(nickname, score)| ScoreEntry {
                        nickname: nickname.clone(),
                        score: *score,
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries
    }

    /// Leaderboards for every team slot; teams without scores map to an empty list.
    pub fn finalize(&self) -> IndexMap<Team, Vec<ScoreEntry>> {
        Team::all()
            .map(|team| (team, self.leaderboard(team)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }
}
