//! Board model and the fixed winning lines of the 3x3 grid.
//!
//! Coordinates are `(x, y)` = `(column, row)` with `(0, 0)` in the lower left
//! corner. The authority is the only party that mutates a [`Board`]; participants
//! keep a display mirror that is rebuilt from broadcast notifications.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of cells along one side of the board.
pub const BOARD_SIZE: u8 = 3;

/// The symbol a participant plays as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First participant to connect. Always moves first.
    Cross,
    /// Second participant to connect.
    Circle,
}

impl Mark {
    /// Mark that moves first in every game, including rematches.
    pub const STARTING: Mark = Mark::Cross;

    pub fn other(self) -> Mark {
        match self {
            Mark::Cross => Mark::Circle,
            Mark::Circle => Mark::Cross,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Cross => write!(f, "X"),
            Mark::Circle => write!(f, "O"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: u8,
    pub y: u8,
}

impl GridPosition {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Returns true if the position lies on the 3x3 grid.
    pub fn in_bounds(&self) -> bool {
        self.x < BOARD_SIZE && self.y < BOARD_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
    /// Lower left to upper right.
    DiagonalRising,
    /// Upper left to lower right.
    DiagonalFalling,
}

/// One of the eight three-in-a-row combinations.
///
/// `center` is only used by presentation layers to place the win-line graphic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Line {
    pub cells: [GridPosition; 3],
    pub center: GridPosition,
    pub orientation: Orientation,
}

impl Line {
    const fn new(cells: [(u8, u8); 3], center: (u8, u8), orientation: Orientation) -> Self {
        Self {
            cells: [
                GridPosition::new(cells[0].0, cells[0].1),
                GridPosition::new(cells[1].0, cells[1].1),
                GridPosition::new(cells[2].0, cells[2].1),
            ],
            center: GridPosition::new(center.0, center.1),
            orientation,
        }
    }

    pub fn contains(&self, position: GridPosition) -> bool {
        self.cells.contains(&position)
    }

    /// Mark occupying all three cells of this line, if any.
    pub fn owner(&self, board: &Board) -> Option<Mark> {
        let [a, b, c] = self.cells.map(|cell| board.get(cell.x, cell.y));
        match a {
            Some(mark) if b == Some(mark) && c == Some(mark) => Some(mark),
            _ => None,
        }
    }
}

/// All winning lines in scan order: rows, then columns, then the two diagonals.
pub const LINES: [Line; 8] = [
    Line::new([(0, 0), (1, 0), (2, 0)], (1, 0), Orientation::Horizontal),
    Line::new([(0, 1), (1, 1), (2, 1)], (1, 1), Orientation::Horizontal),
    Line::new([(0, 2), (1, 2), (2, 2)], (1, 2), Orientation::Horizontal),
    Line::new([(0, 0), (0, 1), (0, 2)], (0, 1), Orientation::Vertical),
    Line::new([(1, 0), (1, 1), (1, 2)], (1, 1), Orientation::Vertical),
    Line::new([(2, 0), (2, 1), (2, 2)], (2, 1), Orientation::Vertical),
    Line::new([(0, 0), (1, 1), (2, 2)], (1, 1), Orientation::DiagonalRising),
    Line::new([(0, 2), (1, 1), (2, 0)], (1, 1), Orientation::DiagonalFalling),
];

/// 3x3 grid of cells, indexed `[x][y]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Option<Mark>; BOARD_SIZE as usize]; BOARD_SIZE as usize],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark at `(x, y)`. Out-of-range coordinates read as empty.
    pub fn get(&self, x: u8, y: u8) -> Option<Mark> {
        if !GridPosition::new(x, y).in_bounds() {
            return None;
        }
        self.cells[x as usize][y as usize]
    }

    /// Returns true if `(x, y)` is on the grid and nobody has played there.
    pub fn is_open(&self, x: u8, y: u8) -> bool {
        GridPosition::new(x, y).in_bounds() && self.cells[x as usize][y as usize].is_none()
    }

    /// Places `mark` at `(x, y)`.
    ///
    /// Returns false without touching the board if the position is off the
    /// grid or already taken. Callers cannot tell the two cases apart.
    pub fn place(&mut self, x: u8, y: u8, mark: Mark) -> bool {
        if !self.is_open(x, y) {
            return false;
        }
        self.cells[x as usize][y as usize] = Some(mark);
        true
    }

    pub fn clear(&mut self) {
        self.cells = Default::default();
    }

    pub fn filled_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.filled_cells() == (BOARD_SIZE as usize) * (BOARD_SIZE as usize)
    }

    pub fn is_clear(&self) -> bool {
        self.filled_cells() == 0
    }

    /// First line in scan order whose three cells hold the same mark.
    pub fn winning_line(&self) -> Option<(&'static Line, Mark)> {
        LINES
            .iter()
            .find_map(|line| line.owner(self).map(|mark| (line, mark)))
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in (0..BOARD_SIZE).rev() {
            for x in 0..BOARD_SIZE {
                match self.get(x, y) {
                    Some(mark) => write!(f, "{}", mark)?,
                    None => write!(f, ".")?,
                }
                if x + 1 < BOARD_SIZE {
                    write!(f, " ")?;
                }
            }
            if y > 0 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(board: &mut Board, line: &Line, mark: Mark) {
        for cell in &line.cells {
            assert!(board.place(cell.x, cell.y, mark));
        }
    }

    #[test]
    fn test_lines_are_distinct_and_on_grid() {
        for (i, line) in LINES.iter().enumerate() {
            for cell in &line.cells {
                assert!(cell.in_bounds());
            }
            assert!(line.contains(line.center));
            for other in &LINES[i + 1..] {
                assert_ne!(line.cells, other.cells);
            }
        }
    }

    #[test]
    fn test_every_line_is_detected() {
        for line in &LINES {
            let mut board = Board::new();
            fill(&mut board, line, Mark::Circle);

            let (found, mark) = board.winning_line().expect("line should win");
            assert_eq!(found, line);
            assert_eq!(mark, Mark::Circle);
        }
    }

    #[test]
    fn test_mixed_line_does_not_win() {
        let mut board = Board::new();
        board.place(0, 0, Mark::Cross);
        board.place(1, 0, Mark::Circle);
        board.place(2, 0, Mark::Cross);
        assert!(board.winning_line().is_none());
    }

    #[test]
    fn test_scan_order_prefers_first_line() {
        let mut board = Board::new();
        fill(&mut board, &LINES[0], Mark::Cross);
        board.place(0, 1, Mark::Cross);
        board.place(0, 2, Mark::Cross);

        // Both the bottom row and the left column are complete.
        let (found, _) = board.winning_line().unwrap();
        assert_eq!(found, &LINES[0]);
    }

    #[test]
    fn test_place_rejects_occupied_and_out_of_range() {
        let mut board = Board::new();
        assert!(board.place(1, 1, Mark::Cross));
        assert!(!board.place(1, 1, Mark::Circle));
        assert_eq!(board.get(1, 1), Some(Mark::Cross));

        assert!(!board.place(3, 0, Mark::Cross));
        assert!(!board.place(0, 200, Mark::Cross));
        assert_eq!(board.filled_cells(), 1);
    }

    #[test]
    fn test_full_and_clear() {
        let mut board = Board::new();
        let mut mark = Mark::Cross;
        for x in 0..BOARD_SIZE {
            for y in 0..BOARD_SIZE {
                board.place(x, y, mark);
                mark = mark.other();
            }
        }
        assert!(board.is_full());

        board.clear();
        assert!(board.is_clear());
        assert!(!board.is_full());
    }

    #[test]
    fn test_display_draws_top_row_first() {
        let mut board = Board::new();
        board.place(0, 2, Mark::Cross);
        board.place(2, 0, Mark::Circle);
        assert_eq!(board.to_string(), "X . .\n. . .\n. . O");
    }
}
