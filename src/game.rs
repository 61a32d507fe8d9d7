use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::phase::{RoundEvent, RoundStateMachine};
use crate::questions::QuestionDispenser;
use crate::room::RoomCode;
use crate::roster::Roster;
use crate::scores::ScoreLedger;
use crate::types::*;

/// Commands the WebSocket handler sends to the session task.
#[derive(Debug, Clone)]
pub enum GameCommand {
    GetCode {
        socket_id: String,
    },
    VerifyCode {
        socket_id: String,
        code: String,
    },
    AdminJoin {
        socket_id: String,
    },
    Join {
        socket_id: String,
        request: JoinRequest,
    },
    StartGame {
        socket_id: String,
    },
    RequestStartStatus {
        socket_id: String,
    },
    RequestPlayerList {
        socket_id: String,
    },
    SubmitAnswer {
        socket_id: String,
        guess: String,
    },
    GameTimeOver {
        socket_id: String,
    },
    ResetGame {
        socket_id: String,
    },
    /// Canvas traffic forwarded untouched to the sender's team.
    Relay {
        socket_id: String,
        msg: ServerMsg,
    },
    Disconnect {
        socket_id: String,
    },
    /// Fired by the timer scheduled on `StartGame`.
    CountdownElapsed {
        round: u64,
    },
    /// Fired once the disconnect grace period is over.
    EvictCheck {
        socket_id: String,
    },
    /// Sent by a forwarder that fell behind the event stream and may have missed membership changes.
    Resync {
        socket_id: String,
    },
}

/// Events broadcast from the session to WebSocket connections.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// Send a message to a specific socket.
    SendTo { socket_id: String, msg: ServerMsg },
    /// Send a message to every socket in the room group.
    Broadcast { msg: ServerMsg },
    /// Send a message to a team group, optionally narrowed to one role or skipping the sender.
    TeamCast {
        team: Team,
        role: Option<Role>,
        exclude: Option<String>,
        msg: ServerMsg,
    },
    /// Add a socket to the room group.
    JoinRoom { socket_id: String },
    /// Add a socket to the room group and seat it on a team.
    TakeSeat { socket_id: String, seat: Seat },
    /// Unseat one socket, or every socket when `socket_id` is `None`.
    LeaveSeat { socket_id: Option<String> },
    /// Overwrite one socket's membership with the session's view of it.
    Resync {
        socket_id: String,
        in_room: bool,
        seat: Option<Seat>,
    },
}

/// Group membership of one connection, replayed from the event stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Membership {
    in_room: bool,
    seat: Option<Seat>,
}

impl Membership {
    /// Apply membership changes addressed to `socket_id` and return the message it should receive, if any.
    pub fn route<'a>(&mut self, socket_id: &str, event: &'a GameEvent) -> Option<&'a ServerMsg> {
        match event {
            GameEvent::SendTo { socket_id: target, msg } => (target == socket_id).then_some(msg),
            GameEvent::Broadcast { msg } => self.in_room.then_some(msg),
            GameEvent::TeamCast {
                team,
                role,
                exclude,
                msg,
            } => {
                let seat = self.seat?;
                let addressed = seat.team == *team
                    && role.is_none_or(|role| role == seat.role)
                    && exclude.as_deref() != Some(socket_id);
                addressed.then_some(msg)
            }
            GameEvent::JoinRoom { socket_id: target } => {
                if target == socket_id {
                    self.in_room = true;
                }
                None
            }
            GameEvent::TakeSeat {
                socket_id: target,
                seat,
            } => {
                if target == socket_id {
                    self.in_room = true;
                    self.seat = Some(*seat);
                }
                None
            }
            GameEvent::LeaveSeat { socket_id: target } => {
                if target.as_deref().is_none_or(|target| target == socket_id) {
                    self.seat = None;
                }
                None
            }
            GameEvent::Resync {
                socket_id: target,
                in_room,
                seat,
            } => {
                if target == socket_id {
                    self.in_room = *in_room;
                    self.seat = *seat;
                }
                None
            }
        }
    }
}

/// A command to feed back into the session after a delay.
#[derive(Debug)]
pub struct Deferred {
    pub after: Duration,
    pub cmd: GameCommand,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// The canonical state of the single room. Only the session task mutates it.
pub struct SessionState {
    config: GameConfig,
    /// Live sockets in the room group.
    connections: HashSet<String>,
    room: RoomCode,
    roster: Roster,
    questions: QuestionDispenser,
    round: RoundStateMachine,
    scores: ScoreLedger,
}

impl SessionState {
    pub fn new(config: GameConfig, questions: Vec<Question>) -> Self {
        Self {
            config,
            connections: HashSet::new(),
            room: RoomCode::generate(&mut rand::rng()),
            roster: Roster::new(),
            questions: QuestionDispenser::new(questions),
            round: RoundStateMachine::new(),
            scores: ScoreLedger::new(),
        }
    }

    pub fn code(&self) -> &str {
        self.room.get()
    }

    fn send_to(&self, tx: &broadcast::Sender<GameEvent>, socket_id: &str, msg: ServerMsg) {
        let _ = tx.send(GameEvent::SendTo {
            socket_id: socket_id.to_string(),
            msg,
        });
    }

    fn broadcast(&self, tx: &broadcast::Sender<GameEvent>, msg: ServerMsg) {
        let _ = tx.send(GameEvent::Broadcast { msg });
    }

    fn team_cast(
        &self,
        tx: &broadcast::Sender<GameEvent>,
        team: Team,
        role: Option<Role>,
        exclude: Option<String>,
        msg: ServerMsg,
    ) {
        let _ = tx.send(GameEvent::TeamCast {
            team,
            role,
            exclude,
            msg,
        });
    }

    fn broadcast_player_list(&self, tx: &broadcast::Sender<GameEvent>) {
        self.broadcast(
            tx,
            ServerMsg::PlayerList {
                teams: self.roster.list_by_team(),
            },
        );
    }

    /// Question as a given role sees it: the answer goes to hosts only unless configured otherwise.
    fn question_msg(&self, question: &Question, role: Role) -> ServerMsg {
        let reveal = role == Role::Host || self.config.reveal_answer_to_guessers;
        ServerMsg::SendQuestion {
            text: question.text.clone(),
            answer: reveal.then(|| question.answer.clone()),
        }
    }

    fn publish_question(&self, tx: &broadcast::Sender<GameEvent>, team: Team, question: &Question) {
        for role in [Role::Host, Role::Guesser] {
            self.team_cast(tx, team, Some(role), None, self.question_msg(question, role));
        }
    }

    /// Draw the team's next question and send it to the team.
    fn dispense(&mut self, tx: &broadcast::Sender<GameEvent>, team: Team) {
        let Some(question) = self.questions.next(team, &mut rand::rng()) else {
            error!(team = %team, "question bank is empty; no question to hand out");
            return;
        };
        self.publish_question(tx, team, &question);
    }

    /// Process one command. Returns a follow-up command to schedule, if any.
    pub fn handle(
        &mut self,
        cmd: GameCommand,
        tx: &broadcast::Sender<GameEvent>,
    ) -> Option<Deferred> {
        match cmd {
            GameCommand::GetCode { socket_id } => {
                self.send_to(
                    tx,
                    &socket_id,
                    ServerMsg::Code {
                        code: self.room.get().to_string(),
                    },
                );
            }
            GameCommand::VerifyCode { socket_id, code } => {
                let valid = self.room.verify(&code);
                self.send_to(tx, &socket_id, ServerMsg::CodeResult { valid });
            }
            GameCommand::AdminJoin { socket_id } => {
                info!(socket_id = %socket_id, "admin joined the room");
                self.connections.insert(socket_id.clone());
                let _ = tx.send(GameEvent::JoinRoom {
                    socket_id: socket_id.clone(),
                });
                self.send_to(
                    tx,
                    &socket_id,
                    ServerMsg::PlayerList {
                        teams: self.roster.list_by_team(),
                    },
                );
            }
            GameCommand::Join { socket_id, request } => {
                self.handle_join(tx, socket_id, request);
            }
            GameCommand::StartGame { socket_id } => {
                return self.handle_start_game(tx, &socket_id);
            }
            GameCommand::RequestStartStatus { socket_id } => {
                if let Some(start_at) = self.round.start_at() {
                    self.send_to(tx, &socket_id, ServerMsg::GameStarted { start_at });
                }
            }
            GameCommand::RequestPlayerList { socket_id } => {
                self.send_to(
                    tx,
                    &socket_id,
                    ServerMsg::PlayerList {
                        teams: self.roster.list_by_team(),
                    },
                );
            }
            GameCommand::SubmitAnswer { socket_id, guess } => {
                self.handle_submit_answer(tx, &socket_id, &guess);
            }
            GameCommand::GameTimeOver { socket_id } => {
                self.handle_game_time_over(tx, &socket_id);
            }
            GameCommand::ResetGame { socket_id } => {
                info!(socket_id = %socket_id, "game reset requested");
                self.reset(tx);
                self.broadcast(tx, ServerMsg::GameReset);
                self.broadcast(
                    tx,
                    ServerMsg::Code {
                        code: self.room.get().to_string(),
                    },
                );
            }
            GameCommand::Relay { socket_id, msg } => {
                if let Some(player) = self.roster.get(&socket_id) {
                    self.team_cast(tx, player.team, None, Some(socket_id), msg);
                }
            }
            GameCommand::Disconnect { socket_id } => {
                self.connections.remove(&socket_id);
                if self.roster.get(&socket_id).is_some() {
                    let after = Duration::from_secs(self.config.disconnect_grace_seconds);
                    info!(socket_id = %socket_id, grace = ?after, "participant disconnected; holding slot");
                    return Some(Deferred {
                        after,
                        cmd: GameCommand::EvictCheck { socket_id },
                    });
                }
            }
            GameCommand::CountdownElapsed { round } => {
                self.handle_countdown_elapsed(tx, round);
            }
            GameCommand::EvictCheck { socket_id } => {
                if let Some(player) = self.roster.remove(&socket_id) {
                    info!(nickname = %player.nickname, team = %player.team, "participant evicted");
                    self.broadcast_player_list(tx);
                }
            }
            GameCommand::Resync { socket_id } => {
                self.handle_resync(tx, socket_id);
            }
        }

        None
    }

    fn handle_join(
        &mut self,
        tx: &broadcast::Sender<GameEvent>,
        socket_id: String,
        request: JoinRequest,
    ) {
        let admitted = match self.roster.admit(
            &self.room,
            &socket_id,
            &request.nickname,
            &request.team,
            request.role,
            &request.code,
        ) {
            Ok(admitted) => admitted,
            Err(err) => {
                debug!(socket_id = %socket_id, error = %err, "join rejected");
                self.send_to(
                    tx,
                    &socket_id,
                    ServerMsg::JoinError {
                        reason: err.to_string(),
                    },
                );
                return;
            }
        };

        if let Some(old_id) = admitted.replaced {
            info!(old = %old_id, new = %socket_id, "slot taken over by re-join");
            let _ = tx.send(GameEvent::LeaveSeat {
                socket_id: Some(old_id),
            });
        }

        let seat = admitted.seat;
        info!(socket_id = %socket_id, nickname = %request.nickname, team = %seat.team, role = ?seat.role, "participant joined");

        self.connections.insert(socket_id.clone());
        let _ = tx.send(GameEvent::TakeSeat {
            socket_id: socket_id.clone(),
            seat,
        });
        self.broadcast_player_list(tx);
        self.send_to(tx, &socket_id, ServerMsg::JoinSuccess);
        self.catch_up(tx, &socket_id, seat);
    }

    /// Re-send the announced start time and the team's live question to one seated socket.
    fn catch_up(&mut self, tx: &broadcast::Sender<GameEvent>, socket_id: &str, seat: Seat) {
        if let Some(start_at) = self.round.start_at() {
            self.send_to(tx, socket_id, ServerMsg::GameStarted { start_at });
        }
        if self.round.is_active() {
            match self.questions.current(seat.team) {
                Some(question) => {
                    self.send_to(tx, socket_id, self.question_msg(question, seat.role));
                }
                None if seat.role == Role::Host => self.dispense(tx, seat.team),
                None => {}
            }
        }
    }

    fn handle_resync(&mut self, tx: &broadcast::Sender<GameEvent>, socket_id: String) {
        let in_room = self.connections.contains(&socket_id);
        let seat = self.roster.get(&socket_id).map(|player| Seat {
            team: player.team,
            role: player.role,
        });
        info!(socket_id = %socket_id, in_room, seat = ?seat, "resyncing lagged connection");

        let _ = tx.send(GameEvent::Resync {
            socket_id: socket_id.clone(),
            in_room,
            seat,
        });
        if let Some(seat) = seat {
            self.catch_up(tx, &socket_id, seat);
        }
    }

    fn handle_start_game(
        &mut self,
        tx: &broadcast::Sender<GameEvent>,
        socket_id: &str,
    ) -> Option<Deferred> {
        let players = self.roster.len();
        if players < 2 {
            debug!(socket_id, players, "start ignored: not enough participants");
            return None;
        }

        let countdown = Duration::from_secs(self.config.countdown_seconds);
        let start_at = now_millis() + countdown.as_millis() as u64;
        if let Err(err) = self.round.apply(RoundEvent::Start { start_at }) {
            debug!(socket_id, error = %err, "start ignored");
            return None;
        }

        let round = self.round.round();
        info!(round, start_at, players, "round countdown started");
        self.broadcast(tx, ServerMsg::GameStarted { start_at });

        Some(Deferred {
            after: countdown,
            cmd: GameCommand::CountdownElapsed { round },
        })
    }

    fn handle_countdown_elapsed(&mut self, tx: &broadcast::Sender<GameEvent>, round: u64) {
        if round != self.round.round() {
            debug!(round, current = self.round.round(), "stale countdown ignored");
            return;
        }
        if let Err(err) = self.round.apply(RoundEvent::CountdownElapsed) {
            debug!(round, error = %err, "countdown ignored");
            return;
        }

        let teams = self.roster.teams_with_host();
        info!(round, teams = teams.len(), "round active");
        for team in teams {
            self.dispense(tx, team);
        }
    }

    /// Judge a guess against the team's current answer. The first correct guess scores, closes
    /// the question and immediately opens the next one.
    fn handle_submit_answer(
        &mut self,
        tx: &broadcast::Sender<GameEvent>,
        socket_id: &str,
        guess: &str,
    ) {
        if !self.round.is_active() {
            return;
        }
        let Some(player) = self.roster.get(socket_id) else {
            return;
        };
        let (team, nickname) = (player.team, player.nickname.clone());

        let Some(expected) = self
            .questions
            .current(team)
            .filter(|question| !question.answer.is_empty())
        else {
            return;
        };

        let is_correct = expected.answer == guess;
        let score = if is_correct {
            self.questions.take_current(team);
            self.scores.record(team, &nickname, 1)
        } else {
            self.scores.score(team, &nickname)
        };

        self.team_cast(
            tx,
            team,
            None,
            None,
            ServerMsg::AnswerResult {
                is_correct,
                nickname: nickname.clone(),
                score,
                team,
            },
        );

        if is_correct {
            info!(team = %team, nickname = %nickname, score, "correct answer");
            self.dispense(tx, team);
        }
    }

    fn handle_game_time_over(&mut self, tx: &broadcast::Sender<GameEvent>, socket_id: &str) {
        let Some(player) = self.roster.get(socket_id) else {
            return;
        };
        if player.role != Role::Host {
            debug!(socket_id, "time over ignored: sender is not a host");
            return;
        }
        let team = player.team;

        if let Err(err) = self.round.apply(RoundEvent::TimeOver) {
            debug!(socket_id, error = %err, "time over ignored");
            return;
        }

        info!(team = %team, "time over; publishing final results");
        self.broadcast(
            tx,
            ServerMsg::FinalResult {
                results: self.scores.finalize(),
            },
        );

        self.reset(tx);
        self.broadcast(
            tx,
            ServerMsg::Code {
                code: self.room.get().to_string(),
            },
        );
    }

    /// Clear roster, scores and answers, return to idle and issue a fresh room code.
    fn reset(&mut self, tx: &broadcast::Sender<GameEvent>) {
        if let Err(err) = self.round.apply(RoundEvent::Reset) {
            warn!(error = %err, "round state machine refused reset");
        }
        self.roster.clear();
        self.scores.clear();
        self.questions.clear_current();
        let code = self.room.regenerate(&mut rand::rng()).to_string();
        let _ = tx.send(GameEvent::LeaveSeat { socket_id: None });
        info!(code = %code, "session reset");
    }
}

/// Handle to the running session task.
#[derive(Clone)]
pub struct GameHandle {
    pub cmd_tx: mpsc::Sender<GameCommand>,
    pub event_tx: broadcast::Sender<GameEvent>,
}

/// Spawn the session task owning all game state. Returns the handle connections talk to.
pub fn spawn_session(config: GameConfig, questions: Vec<Question>) -> GameHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);

    let state = SessionState::new(config, questions);
    info!(code = state.code(), "session created");

    tokio::spawn(session_task(
        state,
        cmd_rx,
        cmd_tx.downgrade(),
        event_tx.clone(),
    ));

    GameHandle { cmd_tx, event_tx }
}

fn schedule(cmd_tx: &mpsc::WeakSender<GameCommand>, deferred: Deferred) {
    let Some(cmd_tx) = cmd_tx.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        tokio::time::sleep(deferred.after).await;
        let _ = cmd_tx.send(deferred.cmd).await;
    });
}

async fn session_task(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    cmd_tx: mpsc::WeakSender<GameCommand>,
    event_tx: broadcast::Sender<GameEvent>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        if let Some(deferred) = state.handle(cmd, &event_tx) {
            schedule(&cmd_tx, deferred);
        }
    }

    info!("session task ended");
}
