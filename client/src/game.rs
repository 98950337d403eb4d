//! Participant-side view of the authoritative game.
//!
//! Nothing here decides game outcomes. The board is a display mirror rebuilt
//! from `PiecePlaced` / `Rematch` notifications, and the turn and scores come
//! from the reconciled channel. Local input never touches this state directly.

use log::debug;
use shared::{Board, EventCursor, GameEvent, Mark, MatchState, Reconciled, Scores};

/// What a participant tells its presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The authority admitted us and assigned our mark.
    Joined { client_id: u32, mark: Mark },
    /// A one-shot broadcast from the authority.
    Game(GameEvent),
    /// The reconciled turn changed.
    TurnChanged { current_turn: Option<Mark> },
    /// The reconciled scores changed.
    ScoresChanged { scores: Scores },
    /// The authority refused or dropped us.
    Disconnected { reason: String },
}

/// Point-in-time copy of everything a participant can observe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantView {
    pub client_id: Option<u32>,
    pub local_mark: Option<Mark>,
    pub current_turn: Option<Mark>,
    pub scores: Scores,
    pub board: Board,
}

impl ParticipantView {
    pub fn is_my_turn(&self) -> bool {
        self.local_mark.is_some() && self.local_mark == self.current_turn
    }
}

#[derive(Debug, Clone)]
pub struct ClientGameState {
    client_id: Option<u32>,
    local_mark: Option<Mark>,
    state: Reconciled<MatchState>,
    events: EventCursor,
    board: Board,
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            client_id: None,
            local_mark: None,
            state: Reconciled::new(),
            events: EventCursor::new(),
            board: Board::new(),
        }
    }

    /// Records the identity the authority assigned. Later assignments are
    /// ignored: a participant keeps its mark for the life of the connection.
    pub fn apply_connected(&mut self, client_id: u32, mark: Mark) -> Option<Notification> {
        if self.local_mark.is_some() {
            return None;
        }
        self.client_id = Some(client_id);
        self.local_mark = Some(mark);
        Some(Notification::Joined { client_id, mark })
    }

    /// Applies a reconciled state update. Stale versions are dropped.
    pub fn apply_state(&mut self, version: u32, state: MatchState) -> Vec<Notification> {
        let previous = match self.state.apply(version, state) {
            Some(previous) => previous.unwrap_or_default(),
            None => return Vec::new(),
        };

        let mut notifications = Vec::new();
        if previous.current_turn != state.current_turn {
            notifications.push(Notification::TurnChanged {
                current_turn: state.current_turn,
            });
        }
        if previous.scores != state.scores {
            notifications.push(Notification::ScoresChanged {
                scores: state.scores,
            });
        }
        notifications
    }

    /// Applies a broadcast notification at most once.
    pub fn apply_event(&mut self, sequence: u32, event: GameEvent) -> Option<Notification> {
        if !self.events.accept(sequence) {
            debug!("Dropping duplicate or stale event #{}", sequence);
            return None;
        }

        match &event {
            GameEvent::PiecePlaced { x, y, mark } => {
                self.board.place(*x, *y, *mark);
            }
            GameEvent::Rematch => self.board.clear(),
            GameEvent::GameStarted | GameEvent::GameWon { .. } | GameEvent::GameTied => {}
        }

        Some(Notification::Game(event))
    }

    pub fn local_mark(&self) -> Option<Mark> {
        self.local_mark
    }

    pub fn current_turn(&self) -> Option<Mark> {
        self.state.get().and_then(|state| state.current_turn)
    }

    pub fn scores(&self) -> Scores {
        self.state.get().map(|state| state.scores).unwrap_or_default()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            client_id: self.client_id,
            local_mark: self.local_mark,
            current_turn: self.current_turn(),
            scores: self.scores(),
            board: self.board.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(turn: Option<Mark>, cross: u32, circle: u32) -> MatchState {
        MatchState {
            current_turn: turn,
            scores: Scores { cross, circle },
        }
    }

    #[test]
    fn test_identity_assigned_once() {
        let mut game = ClientGameState::new();
        assert_eq!(
            game.apply_connected(2, Mark::Circle),
            Some(Notification::Joined {
                client_id: 2,
                mark: Mark::Circle
            })
        );
        assert_eq!(game.apply_connected(2, Mark::Cross), None);
        assert_eq!(game.local_mark(), Some(Mark::Circle));
    }

    #[test]
    fn test_state_changes_raise_notifications() {
        let mut game = ClientGameState::new();

        let first = game.apply_state(1, state(Some(Mark::Cross), 0, 0));
        assert_eq!(
            first,
            vec![Notification::TurnChanged {
                current_turn: Some(Mark::Cross)
            }]
        );

        let second = game.apply_state(2, state(None, 1, 0));
        assert_eq!(second.len(), 2);
        assert!(second.contains(&Notification::ScoresChanged {
            scores: Scores {
                cross: 1,
                circle: 0
            }
        }));
        assert_eq!(game.current_turn(), None);
        assert_eq!(game.scores().cross, 1);
    }

    #[test]
    fn test_stale_state_ignored() {
        let mut game = ClientGameState::new();
        game.apply_state(5, state(Some(Mark::Circle), 0, 0));

        assert!(game.apply_state(4, state(Some(Mark::Cross), 0, 0)).is_empty());
        assert_eq!(game.current_turn(), Some(Mark::Circle));

        // Periodic resync of the same value is silent.
        assert!(game.apply_state(5, state(Some(Mark::Circle), 0, 0)).is_empty());
    }

    #[test]
    fn test_events_rebuild_board_mirror() {
        let mut game = ClientGameState::new();
        game.apply_event(
            1,
            GameEvent::PiecePlaced {
                x: 2,
                y: 1,
                mark: Mark::Cross,
            },
        );
        assert_eq!(game.board().get(2, 1), Some(Mark::Cross));

        game.apply_event(2, GameEvent::Rematch);
        assert!(game.board().is_clear());
    }

    #[test]
    fn test_duplicate_events_delivered_once() {
        let mut game = ClientGameState::new();
        assert!(game.apply_event(1, GameEvent::GameStarted).is_some());
        assert!(game.apply_event(1, GameEvent::GameStarted).is_none());
        assert!(game.apply_event(2, GameEvent::GameTied).is_some());
        assert!(game.apply_event(1, GameEvent::GameStarted).is_none());
    }

    #[test]
    fn test_view_reports_turn_ownership() {
        let mut game = ClientGameState::new();
        game.apply_connected(1, Mark::Cross);
        game.apply_state(1, state(Some(Mark::Cross), 0, 0));
        assert!(game.view().is_my_turn());

        game.apply_state(2, state(Some(Mark::Circle), 0, 0));
        assert!(!game.view().is_my_turn());
    }
}
