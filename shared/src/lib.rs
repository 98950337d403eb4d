//! Types shared by the authoritative server and its participants: the board
//! model, the wire protocol and the replication primitives.

pub mod board;
pub mod replication;

pub use board::{Board, GridPosition, Line, Mark, Orientation, BOARD_SIZE, LINES};
pub use replication::{
    EventCursor, EventQueue, Reconciled, Replicated, Sequenced, Target,
};

use serde::{Deserialize, Serialize};

/// Protocol version sent in [`Packet::Connect`].
pub const CLIENT_VERSION: u32 = 1;
/// Largest datagram either side expects to receive.
pub const MAX_PACKET_SIZE: usize = 2048;
/// Number of participants the game logic supports.
pub const MAX_PARTICIPANTS: usize = 2;

/// Win counters per mark. Survive rematches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub cross: u32,
    pub circle: u32,
}

impl Scores {
    pub fn get(&self, mark: Mark) -> u32 {
        match mark {
            Mark::Cross => self.cross,
            Mark::Circle => self.circle,
        }
    }

    pub fn increment(&mut self, mark: Mark) {
        match mark {
            Mark::Cross => self.cross += 1,
            Mark::Circle => self.circle += 1,
        }
    }
}

/// State that every participant must converge on: reconciled, last write wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    /// Mark allowed to move next. `None` before the game starts and once it
    /// has concluded.
    pub current_turn: Option<Mark>,
    pub scores: Scores,
}

/// One-shot notifications broadcast by the authority to every participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    GameStarted,
    PiecePlaced { x: u8, y: u8, mark: Mark },
    GameWon { line: Line, mark: Mark },
    GameTied,
    Rematch,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    MoveRequest {
        x: u8,
        y: u8,
        mark: Mark,
    },
    RematchRequest,
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
        mark: Mark,
    },
    StateSync {
        version: u32,
        state: MatchState,
    },
    Event {
        sequence: u32,
        event: GameEvent,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Which side of the connection evaluates this packet.
    pub fn target(&self) -> Target {
        match self {
            Packet::Connect { .. }
            | Packet::MoveRequest { .. }
            | Packet::RematchRequest
            | Packet::Heartbeat
            | Packet::Disconnect => Target::Authority,
            Packet::Connected { .. }
            | Packet::StateSync { .. }
            | Packet::Event { .. }
            | Packet::Disconnected { .. } => Target::AllParticipants,
        }
    }
}

impl From<Sequenced<GameEvent>> for Packet {
    fn from(sequenced: Sequenced<GameEvent>) -> Self {
        Packet::Event {
            sequence: sequenced.sequence,
            event: sequenced.event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_increment_per_mark() {
        let mut scores = Scores::default();
        scores.increment(Mark::Cross);
        scores.increment(Mark::Cross);
        scores.increment(Mark::Circle);
        assert_eq!(scores.get(Mark::Cross), 2);
        assert_eq!(scores.get(Mark::Circle), 1);
    }

    #[test]
    fn test_packet_targets() {
        let move_request = Packet::MoveRequest {
            x: 0,
            y: 0,
            mark: Mark::Cross,
        };
        assert_eq!(move_request.target(), Target::Authority);
        assert_eq!(Packet::RematchRequest.target(), Target::Authority);
        assert_eq!(
            Packet::Event {
                sequence: 1,
                event: GameEvent::Rematch
            }
            .target(),
            Target::AllParticipants
        );
        assert_eq!(
            Packet::StateSync {
                version: 0,
                state: MatchState::default()
            }
            .target(),
            Target::AllParticipants
        );
    }

    #[test]
    fn test_packet_serialization_game_won() {
        let packet = Packet::Event {
            sequence: 7,
            event: GameEvent::GameWon {
                line: LINES[6],
                mark: Mark::Circle,
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() < MAX_PACKET_SIZE);
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Event {
                sequence,
                event: GameEvent::GameWon { line, mark },
            } => {
                assert_eq!(sequence, 7);
                assert_eq!(line.orientation, Orientation::DiagonalRising);
                assert_eq!(mark, Mark::Circle);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_state_sync() {
        let state = MatchState {
            current_turn: Some(Mark::Circle),
            scores: Scores {
                cross: 3,
                circle: 1,
            },
        };
        let packet = Packet::StateSync { version: 12, state };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::StateSync { version, state: s } => {
                assert_eq!(version, 12);
                assert_eq!(s, state);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_sequenced_event_into_packet() {
        let packet: Packet = Sequenced {
            sequence: 4,
            event: GameEvent::GameTied,
        }
        .into();
        assert!(matches!(
            packet,
            Packet::Event {
                sequence: 4,
                event: GameEvent::GameTied
            }
        ));
    }
}
