use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::types::{Question, Team};

/// Draws questions for teams without repeating a prompt until the whole pool has been used.
///
/// Used prompts are tracked by text across all teams; when every prompt has been used the set is
/// cleared and the full pool becomes eligible again.
#[derive(Debug)]
pub struct QuestionDispenser {
    pool: Vec<Question>,
    used: HashSet<String>,
    current: HashMap<Team, Question>,
}

impl QuestionDispenser {
    /// The pool must not be empty; config loading refuses an empty bank.
    pub fn new(pool: Vec<Question>) -> Self {
        Self {
            pool,
            used: HashSet::new(),
            current: HashMap::new(),
        }
    }

    /// Draw the next question for `team` and make it the team's current one.
    ///
    /// Returns `None` only when the pool itself is empty.
    pub fn next<R: Rng + ?Sized>(&mut self, team: Team, rng: &mut R) -> Option<Question> {
        let mut eligible: Vec<&Question> = self
            .pool
            .iter()
            .filter(|q| !self.used.contains(&q.text))
            .collect();

        if eligible.is_empty() {
            info!(pool = self.pool.len(), "question pool exhausted; starting over");
            self.used.clear();
            eligible = self.pool.iter().collect();
        }

        let question = (*eligible.choose(rng)?).clone();
        self.used.insert(question.text.clone());
        self.current.insert(team, question.clone());
        debug!(team = %team, text = %question.text, "question dispensed");

        Some(question)
    }

    pub fn current(&self, team: Team) -> Option<&Question> {
        self.current.get(&team)
    }

    /// Close the team's answer window.
    pub fn take_current(&mut self, team: Team) -> Option<Question> {
        self.current.remove(&team)
    }

    /// Clear every team's current question. The used set is kept.
    pub fn clear_current(&mut self) {
        self.current.clear();
    }
}
