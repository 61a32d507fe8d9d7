use indexmap::IndexMap;
use tracing::warn;

use crate::error::JoinRejected;
use crate::room::RoomCode;
use crate::types::{Role, Seat, Team};

const MAX_NICKNAME_CHARS: usize = 20;

/// A connected participant, keyed in the roster by its socket id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub socket_id: String,
    pub nickname: String,
    pub team: Team,
    pub role: Role,
}

impl Participant {
    pub fn seat(&self) -> Seat {
        Seat {
            team: self.team,
            role: self.role,
        }
    }

    fn label(&self) -> String {
        format!("{} ({})", self.nickname, self.role.label())
    }
}

/// Result of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub seat: Seat,
    /// Socket that held the same (nickname, team) slot before and lost it.
    pub replaced: Option<String>,
}

/// Participants of the room in admission order.
#[derive(Debug, Default)]
pub struct Roster {
    players: IndexMap<String, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection into the room.
    ///
    /// A participant already holding the same nickname on the same team is removed first, so a
    /// reconnecting client takes over its old slot instead of being listed twice.
    pub fn admit(
        &mut self,
        room: &RoomCode,
        socket_id: &str,
        nickname: &str,
        team_raw: &str,
        role: Role,
        code: &str,
    ) -> Result<Admitted, JoinRejected> {
        if !room.verify(code) {
            return Err(JoinRejected::InvalidCode);
        }

        let team = Team::from_raw(team_raw)
            .ok_or_else(|| JoinRejected::UnknownTeam(Team::normalize(team_raw)))?;

        let nickname = nickname.trim();
        let length = nickname.chars().count();
        if length == 0 || length > MAX_NICKNAME_CHARS {
            return Err(JoinRejected::InvalidNickname {
                max: MAX_NICKNAME_CHARS,
            });
        }

        let replaced = self
            .players
            .values()
            .find(|p| p.nickname == nickname && p.team == team && p.socket_id != socket_id)
            .map(|p| p.socket_id.clone());
        if let Some(old_id) = &replaced {
            self.players.shift_remove(old_id);
        }
        // Same connection joining again (possibly elsewhere) moves to the end of the list.
        self.players.shift_remove(socket_id);

        if role == Role::Host && self.players.values().any(|p| p.team == team && p.role == Role::Host) {
            warn!(team = %team, nickname, "team already has a host; admitting another");
        }

        let participant = Participant {
            socket_id: socket_id.to_string(),
            nickname: nickname.to_string(),
            team,
            role,
        };
        let seat = participant.seat();
        self.players.insert(socket_id.to_string(), participant);

        Ok(Admitted { seat, replaced })
    }

    pub fn get(&self, socket_id: &str) -> Option<&Participant> {
        self.players.get(socket_id)
    }

    pub fn remove(&mut self, socket_id: &str) -> Option<Participant> {
        self.players.shift_remove(socket_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    /// Teams with at least one host, in slot order.
    pub fn teams_with_host(&self) -> Vec<Team> {
        Team::all()
            .filter(|team| {
                self.players
                    .values()
                    .any(|p| p.team == *team && p.role == Role::Host)
            })
            .collect()
    }

    /// Role-annotated names per team. Every team slot is present, even when empty.
    pub fn list_by_team(&self) -> IndexMap<String, Vec<String>> {
        let mut teams: IndexMap<String, Vec<String>> =
            Team::all().map(|team| (team.key(), Vec::new())).collect();
        for player in self.players.values() {
            if let Some(labels) = teams.get_mut(&player.team.key()) {
                labels.push(player.label());
            }
        }
        teams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomCode {
        RoomCode::generate(&mut rand::rng())
    }

    #[test]
    fn wrong_code_is_rejected() {
        let room = room();
        let mut roster = Roster::new();
        let wrong = format!("{}x", room.get());
        let err = roster
            .admit(&room, "s1", "mina", "1", Role::Host, &wrong)
            .unwrap_err();
        assert_eq!(err, JoinRejected::InvalidCode);
        assert_eq!(roster.len(), 0);
    }

    #[test]
    fn unknown_team_and_blank_nickname_are_rejected() {
        let room = room();
        let mut roster = Roster::new();
        assert_eq!(
            roster.admit(&room, "s1", "mina", "9", Role::Host, room.get()),
            Err(JoinRejected::UnknownTeam("9조".into()))
        );
        assert!(matches!(
            roster.admit(&room, "s1", "   ", "1", Role::Host, room.get()),
            Err(JoinRejected::InvalidNickname { .. })
        ));
    }

    #[test]
    fn rejoining_with_same_nickname_and_team_replaces_entry() {
        let room = room();
        let mut roster = Roster::new();
        roster
            .admit(&room, "s1", "mina", "1", Role::Guesser, room.get())
            .unwrap();
        let before = roster.list_by_team()["1조"].len();

        let admitted = roster
            .admit(&room, "s2", "mina", "1조", Role::Guesser, room.get())
            .unwrap();

        assert_eq!(admitted.replaced.as_deref(), Some("s1"));
        assert_eq!(roster.list_by_team()["1조"].len(), before);
        assert!(roster.get("s1").is_none());
        assert_eq!(roster.get("s2").map(|p| p.nickname.as_str()), Some("mina"));
    }

    #[test]
    fn same_nickname_on_other_team_is_a_different_slot() {
        let room = room();
        let mut roster = Roster::new();
        roster
            .admit(&room, "s1", "mina", "1", Role::Guesser, room.get())
            .unwrap();
        let admitted = roster
            .admit(&room, "s2", "mina", "2", Role::Guesser, room.get())
            .unwrap();
        assert_eq!(admitted.replaced, None);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn same_socket_switching_team_is_not_duplicated() {
        let room = room();
        let mut roster = Roster::new();
        roster
            .admit(&room, "s1", "mina", "1", Role::Guesser, room.get())
            .unwrap();
        roster
            .admit(&room, "s1", "mina", "2", Role::Host, room.get())
            .unwrap();
        assert_eq!(roster.len(), 1);
        assert!(roster.list_by_team()["1조"].is_empty());
        assert_eq!(roster.list_by_team()["2조"], vec!["mina (출제자)".to_string()]);
    }

    #[test]
    fn list_by_team_covers_every_slot_with_labels() {
        let room = room();
        let mut roster = Roster::new();
        roster
            .admit(&room, "s1", "mina", "3", Role::Host, room.get())
            .unwrap();
        roster
            .admit(&room, "s2", "joon", "3", Role::Guesser, room.get())
            .unwrap();

        let teams = roster.list_by_team();
        let keys: Vec<_> = teams.keys().cloned().collect();
        assert_eq!(keys, vec!["1조", "2조", "3조", "4조", "5조", "6조"]);
        assert_eq!(
            teams["3조"],
            vec!["mina (출제자)".to_string(), "joon (참가자)".to_string()]
        );
        assert!(teams["1조"].is_empty());
    }

    #[test]
    fn teams_with_host_ignores_guesser_only_teams() {
        let room = room();
        let mut roster = Roster::new();
        roster
            .admit(&room, "s1", "mina", "2", Role::Guesser, room.get())
            .unwrap();
        roster
            .admit(&room, "s2", "joon", "4", Role::Host, room.get())
            .unwrap();
        roster
            .admit(&room, "s3", "hana", "4", Role::Host, room.get())
            .unwrap();
        assert_eq!(roster.teams_with_host(), vec![Team::from_raw("4").unwrap()]);
    }
}
