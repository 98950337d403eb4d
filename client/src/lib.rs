//! # Tic-Tac-Toe Participant Library
//!
//! Everything a participant process needs: finding or hosting a lobby,
//! handing off to the relay once two players are in, and playing against the
//! authority over UDP.
//!
//! ## Architecture Overview
//!
//! ### Lobby Session
//! [`session::LobbyManager`] is tick driven. The caller invokes
//! `update(Instant::now())` once per frame; the manager decides when the
//! host's liveness signal and the lobby refresh are due. Directory calls go
//! through the [`session::service::LobbyService`] and
//! [`session::service::AuthService`] traits so the remote service can be
//! replaced by [`session::memory::InMemoryLobbyService`] locally.
//!
//! ### Relay Handoff
//! When the host starts the game, [`relay::RelayConnector`] reserves a relay,
//! starts hosting and returns a join code that is published through lobby
//! data. Other participants see the code on their next refresh and join.
//! [`launcher::LocalLauncher`] is the transport the connector starts: the
//! authority server for the host plus one participant client per process.
//!
//! ### Participant Replication
//! The participant never decides game outcomes. [`network::Client`] sends move
//! requests and applies what the authority sends back:
//! - the reconciled state (turn and scores), where newer versions replace
//!   older ones and stale ones are dropped;
//! - sequenced notifications, each delivered at most once and in order.
//!
//! Observers hold a [`network::ClientHandle`]. It exposes the latest
//! [`game::ParticipantView`] without blocking and a stream of
//! [`game::Notification`]s.
//!
//! ## Module Organization
//!
//! - `game`: participant-side mirror of the authoritative state
//! - `input`: terminal command parsing
//! - `launcher`: in-process transport startup for host and client roles
//! - `network`: UDP loop and the observer handle
//! - `relay`: relay service seam and connector
//! - `rendering`: text output of the board and notifications
//! - `session`: lobby lifecycle, directory service seam, timers and config
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let (client, mut handle) = Client::new("127.0.0.1:8080".parse()?).await?;
//!     tokio::spawn(client.run());
//!
//!     while let Some(notification) = handle.next_notification().await {
//!         println!("{:?}", notification);
//!         if handle.view().is_my_turn() {
//!             handle.attempt_move(1, 1);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod launcher;
pub mod network;
pub mod relay;
pub mod rendering;
pub mod session;
