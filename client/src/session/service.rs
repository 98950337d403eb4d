//! Directory-service seam.
//!
//! The lobby directory and the sign-in provider are opaque remote services.
//! Everything the session manager needs from them goes through the traits in
//! this module so tests and the local demo can swap in
//! [`InMemoryLobbyService`](super::memory::InMemoryLobbyService).

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Lobby data key advertising the declared game mode to everyone.
pub const KEY_GAME_MODE: &str = "Game Mode";
/// Lobby data key carrying the relay join code once the host starts the game.
pub const KEY_START_GAME: &str = "Start Game";
/// Player data key carrying the display name.
pub const KEY_PLAYER_NAME: &str = "PlayerName";
/// Value of [`KEY_START_GAME`] before the game has started.
pub const START_GAME_SENTINEL: &str = "0";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LobbyServiceError {
    #[error("lobby not found: {0}")]
    LobbyNotFound(String),
    #[error("no lobby matches join code {0}")]
    InvalidJoinCode(String),
    #[error("lobby is full")]
    LobbyFull,
    #[error("no open lobby available for quick join")]
    NoOpenLobby,
    #[error("player {0} is not in the lobby")]
    PlayerNotFound(String),
    #[error("player {0} is already in the lobby")]
    AlreadyMember(String),
    #[error("sign-in failed: {0}")]
    Authentication(String),
    #[error("directory service unavailable: {0}")]
    Unavailable(String),
}

/// Who can read a data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Anyone, including players browsing the directory.
    Public,
    /// Only players in the lobby.
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    pub visibility: Visibility,
    pub value: String,
}

impl DataObject {
    pub fn new(visibility: Visibility, value: impl Into<String>) -> Self {
        Self {
            visibility,
            value: value.into(),
        }
    }
}

pub type DataMap = HashMap<String, DataObject>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    pub data: DataMap,
}

impl Player {
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut data = DataMap::new();
        data.insert(
            KEY_PLAYER_NAME.to_string(),
            DataObject::new(Visibility::Member, name),
        );
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.data.get(KEY_PLAYER_NAME).map(|data| data.value.as_str())
    }
}

/// A lobby record as returned by the directory. Locally held copies are
/// snapshots and go stale between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    pub id: String,
    pub lobby_code: String,
    pub name: String,
    pub host_id: String,
    pub max_players: usize,
    pub is_private: bool,
    pub players: Vec<Player>,
    pub data: DataMap,
    /// Directory-assigned creation order; larger is newer.
    pub created: u64,
}

impl Lobby {
    pub fn available_slots(&self) -> usize {
        self.max_players.saturating_sub(self.players.len())
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|player| player.id == player_id)
    }

    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|data| data.value.as_str())
    }

    pub fn game_mode(&self) -> Option<&str> {
        self.data_value(KEY_GAME_MODE)
    }

    /// The published relay code, if the host has started the game.
    pub fn relay_code(&self) -> Option<&str> {
        self.data_value(KEY_START_GAME)
            .filter(|value| *value != START_GAME_SENTINEL)
    }

    /// Copy of the lobby as seen by someone outside it.
    pub fn public_view(&self) -> Lobby {
        let mut lobby = self.clone();
        lobby
            .data
            .retain(|_, data| data.visibility == Visibility::Public);
        for player in &mut lobby.players {
            player
                .data
                .retain(|_, data| data.visibility == Visibility::Public);
        }
        lobby
    }
}

#[derive(Debug, Clone)]
pub struct CreateLobbyOptions {
    pub is_private: bool,
    pub player: Player,
    pub data: DataMap,
}

#[derive(Debug, Clone)]
pub struct JoinLobbyOptions {
    pub player: Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLobbiesOptions {
    pub count: usize,
    /// Only return lobbies with more than this many free slots.
    pub min_available_slots: usize,
    pub order: QueryOrder,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLobbyOptions {
    pub host_id: Option<String>,
    pub data: DataMap,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePlayerOptions {
    pub data: DataMap,
}

#[async_trait]
pub trait LobbyService: Send + Sync {
    async fn create_lobby(
        &self,
        name: &str,
        max_players: usize,
        options: CreateLobbyOptions,
    ) -> Result<Lobby, LobbyServiceError>;

    async fn join_lobby_by_code(
        &self,
        code: &str,
        options: JoinLobbyOptions,
    ) -> Result<Lobby, LobbyServiceError>;

    async fn quick_join(&self, options: JoinLobbyOptions) -> Result<Lobby, LobbyServiceError>;

    /// Non-members only ever see [`Visibility::Public`] data in the results.
    async fn query_lobbies(
        &self,
        options: QueryLobbiesOptions,
    ) -> Result<Vec<Lobby>, LobbyServiceError>;

    async fn get_lobby(&self, lobby_id: &str) -> Result<Lobby, LobbyServiceError>;

    async fn send_heartbeat(&self, lobby_id: &str) -> Result<(), LobbyServiceError>;

    async fn update_lobby(
        &self,
        lobby_id: &str,
        options: UpdateLobbyOptions,
    ) -> Result<Lobby, LobbyServiceError>;

    async fn update_player(
        &self,
        lobby_id: &str,
        player_id: &str,
        options: UpdatePlayerOptions,
    ) -> Result<Lobby, LobbyServiceError>;

    async fn remove_player(&self, lobby_id: &str, player_id: &str)
        -> Result<(), LobbyServiceError>;

    async fn delete_lobby(&self, lobby_id: &str) -> Result<(), LobbyServiceError>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Signs in without credentials and returns the player id.
    async fn sign_in_anonymously(&self) -> Result<String, LobbyServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> Lobby {
        let mut data = DataMap::new();
        data.insert(
            KEY_GAME_MODE.to_string(),
            DataObject::new(Visibility::Public, "Classic"),
        );
        data.insert(
            KEY_START_GAME.to_string(),
            DataObject::new(Visibility::Member, START_GAME_SENTINEL),
        );
        Lobby {
            id: "lobby-1".to_string(),
            lobby_code: "ABC123".to_string(),
            name: "MyLobby".to_string(),
            host_id: "p1".to_string(),
            max_players: 4,
            is_private: false,
            players: vec![Player::named("p1", "Player 1")],
            data,
            created: 1,
        }
    }

    #[test]
    fn test_relay_code_hidden_behind_sentinel() {
        let mut lobby = lobby();
        assert_eq!(lobby.relay_code(), None);

        lobby.data.insert(
            KEY_START_GAME.to_string(),
            DataObject::new(Visibility::Member, "XYZ789"),
        );
        assert_eq!(lobby.relay_code(), Some("XYZ789"));
    }

    #[test]
    fn test_public_view_strips_member_data() {
        let view = lobby().public_view();
        assert_eq!(view.game_mode(), Some("Classic"));
        assert_eq!(view.data_value(KEY_START_GAME), None);
        assert_eq!(view.players[0].name(), None);
    }

    #[test]
    fn test_available_slots() {
        let mut lobby = lobby();
        assert_eq!(lobby.available_slots(), 3);
        lobby.players.push(Player::named("p2", "Player 2"));
        assert_eq!(lobby.available_slots(), 2);
        assert!(lobby.has_player("p2"));
        assert!(!lobby.has_player("p3"));
    }
}
