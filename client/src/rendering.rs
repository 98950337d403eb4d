//! Text presentation of the participant view for terminal play.

use crate::game::{Notification, ParticipantView};
use shared::{GameEvent, Orientation, BOARD_SIZE};
use std::fmt::Write;

pub struct Renderer {
    /// Label shown for the local participant, e.g. "you" or "Player 2".
    perspective: String,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new("you")
    }
}

impl Renderer {
    pub fn new(perspective: impl Into<String>) -> Self {
        Self {
            perspective: perspective.into(),
        }
    }

    /// Board with row and column labels, row 0 at the bottom.
    pub fn render_board(&self, view: &ParticipantView) -> String {
        let mut out = String::new();
        for y in (0..BOARD_SIZE).rev() {
            let _ = write!(out, "{} ", y);
            for x in 0..BOARD_SIZE {
                let cell = match view.board.get(x, y) {
                    Some(mark) => mark.to_string(),
                    None => ".".to_string(),
                };
                let _ = write!(out, " {}", cell);
            }
            out.push('\n');
        }
        out.push_str("   0 1 2");
        out
    }

    pub fn render_status(&self, view: &ParticipantView) -> String {
        let mark = match view.local_mark {
            Some(mark) => mark.to_string(),
            None => "-".to_string(),
        };
        let turn = match view.current_turn {
            Some(turn) if view.local_mark == Some(turn) => format!("{} ({})", turn, self.perspective),
            Some(turn) => turn.to_string(),
            None => "no one".to_string(),
        };
        format!(
            "{} play {} | turn: {} | score X {} - {} O",
            self.perspective, mark, turn, view.scores.cross, view.scores.circle
        )
    }

    pub fn render(&self, view: &ParticipantView) -> String {
        format!("{}\n{}", self.render_board(view), self.render_status(view))
    }

    /// One-line description of a notification, or `None` for ones that only
    /// matter through the next full render.
    pub fn describe(&self, notification: &Notification) -> Option<String> {
        match notification {
            Notification::Joined { client_id, mark } => Some(format!(
                "{} joined as participant {} playing {}",
                self.perspective, client_id, mark
            )),
            Notification::Game(GameEvent::GameStarted) => Some("Game started".to_string()),
            Notification::Game(GameEvent::PiecePlaced { x, y, mark }) => {
                Some(format!("{} placed at ({}, {})", mark, x, y))
            }
            Notification::Game(GameEvent::GameWon { line, mark }) => Some(format!(
                "{} wins with a {} line through ({}, {})",
                mark,
                orientation_name(line.orientation),
                line.center.x,
                line.center.y
            )),
            Notification::Game(GameEvent::GameTied) => Some("Tie!".to_string()),
            Notification::Game(GameEvent::Rematch) => Some("Rematch".to_string()),
            Notification::TurnChanged { current_turn } => {
                current_turn.map(|turn| format!("{} to move", turn))
            }
            Notification::ScoresChanged { .. } => None,
            Notification::Disconnected { reason } => Some(format!("Disconnected: {}", reason)),
        }
    }
}

fn orientation_name(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Horizontal => "horizontal",
        Orientation::Vertical => "vertical",
        Orientation::DiagonalRising => "rising diagonal",
        Orientation::DiagonalFalling => "falling diagonal",
    }
}
