//! Terminal command parsing

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Place the local mark at column `x`, row `y`.
    Move { x: u8, y: u8 },
    Rematch,
    Board,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("empty input")]
    Empty,
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("expected two coordinates, e.g. '1 2'")]
    Coordinates,
}

pub const HELP: &str = "\
commands:
  x y      place your mark at column x, row y (0-2, row 0 at the bottom)
  rematch  clear the board and play again
  board    show the board
  help     show this message
  quit     leave the game";

/// Parses one line of user input.
///
/// Coordinates are not range-checked here; the authority rejects moves that
/// fall off the grid like any other illegal move.
pub fn parse_command(line: &str) -> Result<Command, InputError> {
    let mut words = line.split_whitespace();
    let first = words.next().ok_or(InputError::Empty)?;

    match first.to_ascii_lowercase().as_str() {
        "rematch" | "r" => Ok(Command::Rematch),
        "board" | "b" => Ok(Command::Board),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        _ => {
            let x = first
                .parse::<u8>()
                .map_err(|_| InputError::Unknown(first.to_string()))?;
            let y = words
                .next()
                .and_then(|word| word.parse::<u8>().ok())
                .ok_or(InputError::Coordinates)?;
            if words.next().is_some() {
                return Err(InputError::Coordinates);
            }
            Ok(Command::Move { x, y })
        }
    }
}
