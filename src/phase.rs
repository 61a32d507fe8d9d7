use thiserror::Error;

/// Phases a round goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for `startGame`.
    Idle,
    /// Start time announced; questions not yet handed out.
    Countdown {
        /// Absolute start time in milliseconds since the Unix epoch.
        start_at: u64,
    },
    /// Teams are drawing and guessing.
    Active { start_at: u64 },
    /// Final results computed; immediately followed by a reset.
    Resolved,
}

/// Events that can be applied to the round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Enter the countdown towards `start_at`.
    Start { start_at: u64 },
    /// The deferred start fired.
    CountdownElapsed,
    /// A host reported that time is up.
    TimeOver,
    /// Return to idle from anywhere.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    pub from: RoundPhase,
    pub event: RoundEvent,
}

/// Round state machine. Every `Start` opens a new numbered round.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    phase: RoundPhase,
    round: u64,
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self {
            phase: RoundPhase::Idle,
            round: 0,
        }
    }
}

impl RoundStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Number of the latest round started; deferred callbacks carry it to detect staleness.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Announced start time, while a round is counting down or running.
    pub fn start_at(&self) -> Option<u64> {
        match self.phase {
            RoundPhase::Countdown { start_at } | RoundPhase::Active { start_at } => Some(start_at),
            RoundPhase::Idle | RoundPhase::Resolved => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, RoundPhase::Active { .. })
    }

    /// Apply an event, returning the new phase.
    pub fn apply(&mut self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (RoundPhase::Idle, RoundEvent::Start { start_at }) => {
                self.round += 1;
                RoundPhase::Countdown { start_at }
            }
            (RoundPhase::Countdown { start_at }, RoundEvent::CountdownElapsed) => {
                RoundPhase::Active { start_at }
            }
            (RoundPhase::Active { .. }, RoundEvent::TimeOver) => RoundPhase::Resolved,
            (_, RoundEvent::Reset) => RoundPhase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        self.phase = next;
        Ok(next)
    }
}
