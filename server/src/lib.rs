//! # Tic-Tac-Toe Authority Server
//!
//! This library provides the authoritative side of the networked tic-tac-toe
//! game. It owns the canonical board, validates every move, detects wins and
//! ties, and replicates the outcome to both participants.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Participants never apply a move to their own copy of the board. They send a
//! move request and wait for the authority to broadcast what happened. A move
//! from the wrong mark, onto an occupied cell, or off the grid is dropped
//! without a reply.
//!
//! ### Participant Management
//! The first participant to connect plays Cross, the second plays Circle, and
//! nobody else is admitted. Participants that fall silent are dropped after a
//! timeout; reconnection is not supported.
//!
//! ### Replication
//! Two channels leave the authority:
//! - the reconciled state (current turn and scores), versioned and resent every
//!   tick so a lost datagram is repaired by the next one;
//! - one-shot notifications (`GameStarted`, `PiecePlaced`, `GameWon`,
//!   `GameTied`, `Rematch`), sequenced and sent to every participant including
//!   the one that caused them.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Authority Loop
//! One task owns the [`game::GameState`] and handles packets one at a time, so
//! no two moves are ever evaluated concurrently. Socket receive, socket send
//! and timeout checking run as helper tasks connected by channels.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection tracking, mark assignment, timeouts
//! - `game`: board ownership, move validation, win/tie detection, rematch
//! - `network`: UDP socket handling and the authority loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new("127.0.0.1:8080", Duration::from_millis(33)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
