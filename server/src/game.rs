//! Authoritative game state.
//!
//! Only the server owns a [`GameState`]. Every mutation goes through the
//! single-threaded authority loop, so two moves are never evaluated at the same
//! time. Outcomes leave through two outboxes: the reconciled [`MatchState`]
//! (turn and scores) and the ordered queue of [`GameEvent`]s.

use log::{debug, info};
use shared::{Board, EventQueue, GameEvent, Line, Mark, MatchState, Replicated, Scores, Sequenced};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win { line: Line, mark: Mark },
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    AwaitingSecondParticipant,
    InProgress,
    Concluded(Outcome),
}

#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    phase: GamePhase,
    state: Replicated<MatchState>,
    events: EventQueue<GameEvent>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            phase: GamePhase::AwaitingSecondParticipant,
            state: Replicated::new(MatchState::default()),
            events: EventQueue::new(),
        }
    }

    /// Opens the first game once both participants are connected.
    pub fn start(&mut self) -> bool {
        if self.phase != GamePhase::AwaitingSecondParticipant {
            return false;
        }

        self.phase = GamePhase::InProgress;
        self.state.update(|s| s.current_turn = Some(Mark::STARTING));
        self.events.push(GameEvent::GameStarted);
        info!("Game started, {} moves first", Mark::STARTING);
        true
    }

    /// Applies a move if `mark` holds the turn and `(x, y)` is an open cell.
    ///
    /// Rejections leave no trace: the board, the turn and the event queue are
    /// untouched. Off-grid and occupied cells are rejected the same way.
    pub fn attempt_move(&mut self, x: u8, y: u8, mark: Mark) -> bool {
        if self.current_turn() != Some(mark) {
            debug!("Rejected move ({}, {}) by {}: not their turn", x, y, mark);
            return false;
        }

        if !self.board.place(x, y, mark) {
            debug!("Rejected move ({}, {}) by {}: cell unavailable", x, y, mark);
            return false;
        }

        self.events.push(GameEvent::PiecePlaced { x, y, mark });
        self.state.update(|s| s.current_turn = Some(mark.other()));
        self.check_outcome();
        true
    }

    fn check_outcome(&mut self) {
        if let Some((line, mark)) = self.board.winning_line() {
            let line = *line;
            info!("{} wins on {:?} line", mark, line.orientation);

            self.phase = GamePhase::Concluded(Outcome::Win { line, mark });
            self.state.update(|s| {
                s.current_turn = None;
                s.scores.increment(mark);
            });
            self.events.push(GameEvent::GameWon { line, mark });
        } else if self.board.is_full() {
            info!("Game tied");

            self.phase = GamePhase::Concluded(Outcome::Tie);
            self.state.update(|s| s.current_turn = None);
            self.events.push(GameEvent::GameTied);
        }
    }

    /// Clears the board and hands the turn back to the starting mark.
    ///
    /// Scores carry over. Refused until both participants have joined.
    pub fn rematch(&mut self) -> bool {
        if self.phase == GamePhase::AwaitingSecondParticipant {
            debug!("Rejected rematch: game has not started");
            return false;
        }

        self.board.clear();
        self.phase = GamePhase::InProgress;
        self.state.update(|s| s.current_turn = Some(Mark::STARTING));
        self.events.push(GameEvent::Rematch);
        info!("Rematch started");
        true
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn current_turn(&self) -> Option<Mark> {
        self.state.get().current_turn
    }

    pub fn scores(&self) -> Scores {
        self.state.get().scores
    }

    /// Events produced since the last drain, in broadcast order.
    pub fn drain_events(&mut self) -> Vec<Sequenced<GameEvent>> {
        self.events.drain()
    }

    /// Reconciled state if it changed since the last call.
    pub fn take_state_update(&mut self) -> Option<(u32, MatchState)> {
        self.state.take_update()
    }

    /// Current reconciled state, for periodic resync of lossy links.
    pub fn state_snapshot(&self) -> (u32, MatchState) {
        self.state.snapshot()
    }
}
