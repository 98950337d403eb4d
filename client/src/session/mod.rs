//! Lobby session lifecycle.
//!
//! [`LobbyManager`] owns one participant's view of a lobby: sign-in, creating
//! or joining, the host's liveness signal, periodic refresh, membership
//! changes, and the handoff to the relay once the host publishes a join code.
//!
//! The cached lobby is a snapshot. Every directory call that returns a lobby
//! replaces it wholesale; a failed call logs and leaves it untouched. Nothing
//! is retried; the periodic refresh is the retry.
//!
//! ```text
//! SignedOut -> SignedIn -> Hosting | Joined -> GameStarting -> Detached
//!                  ^              |
//!                  +-- leave / kicked / delete
//! ```

pub mod config;
pub mod memory;
pub mod service;
pub mod timer;

use crate::relay::RelayConnector;
use config::{ConfigError, SessionConfig};
use log::{debug, info, warn};
use rand::Rng;
use service::{
    AuthService, CreateLobbyOptions, DataMap, DataObject, JoinLobbyOptions, Lobby, LobbyService,
    Player, QueryLobbiesOptions, QueryOrder, UpdateLobbyOptions, UpdatePlayerOptions, Visibility,
    KEY_GAME_MODE, KEY_PLAYER_NAME, KEY_START_GAME, START_GAME_SENTINEL,
};
use std::sync::Arc;
use std::time::Instant;
use timer::IntervalTimer;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    /// Signed in and not in any lobby.
    SignedIn,
    Hosting,
    Joined,
    GameStarting,
    /// Handed off to the game transport; the lobby is no longer tracked.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn {
        player_id: String,
        player_name: String,
    },
    LobbyCreated {
        lobby_id: String,
        lobby_code: String,
    },
    LobbyJoined {
        lobby_id: String,
    },
    LobbyLeft {
        lobby_id: String,
    },
    /// A refresh no longer listed us.
    Kicked {
        lobby_id: String,
    },
    /// We host and exactly two players are present.
    ReadyToStart {
        lobby_id: String,
    },
    GameStarting {
        relay_code: String,
        is_host: bool,
    },
}

/// Services a session talks to, passed in explicitly.
#[derive(Clone)]
pub struct SessionContext {
    pub lobby: Arc<dyn LobbyService>,
    pub auth: Arc<dyn AuthService>,
    pub relay: RelayConnector,
}

pub struct LobbyManager {
    context: SessionContext,
    config: SessionConfig,
    state: SessionState,

    player_id: Option<String>,
    player_name: String,

    // Set only while we are host; always the same snapshot as `joined_lobby`.
    hosted_lobby: Option<Lobby>,
    joined_lobby: Option<Lobby>,

    heartbeat_timer: IntervalTimer,
    refresh_timer: IntervalTimer,
    ready_announced: bool,
    // Join code of the relay we already host; the network starts only once.
    hosted_relay: Option<String>,

    events: mpsc::UnboundedSender<SessionEvent>,
}

impl LobbyManager {
    pub fn new(
        context: SessionContext,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), ConfigError> {
        config.validate()?;
        let (events, events_rx) = mpsc::unbounded_channel();

        let manager = Self {
            heartbeat_timer: IntervalTimer::new(config.heartbeat_interval),
            refresh_timer: IntervalTimer::new(config.refresh_interval),
            context,
            config,
            state: SessionState::SignedOut,
            player_id: None,
            player_name: String::new(),
            hosted_lobby: None,
            joined_lobby: None,
            ready_announced: false,
            hosted_relay: None,
            events,
        };

        Ok((manager, events_rx))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn joined_lobby(&self) -> Option<&Lobby> {
        self.joined_lobby.as_ref()
    }

    pub fn hosted_lobby(&self) -> Option<&Lobby> {
        self.hosted_lobby.as_ref()
    }

    /// Whether the cached snapshot names us as host.
    pub fn is_host(&self) -> bool {
        match (&self.joined_lobby, &self.player_id) {
            (Some(lobby), Some(player_id)) => lobby.host_id == *player_id,
            _ => false,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event dropped; receiver is gone");
        }
    }

    fn local_player(&self) -> Option<Player> {
        match &self.player_id {
            Some(player_id) => Some(Player::named(player_id.clone(), self.player_name.clone())),
            None => {
                warn!("Not signed in");
                None
            }
        }
    }

    /// Replaces the cached snapshot and derives host/joined state from it.
    fn set_lobby(&mut self, lobby: Lobby) {
        let is_new = self
            .joined_lobby
            .as_ref()
            .map_or(true, |current| current.id != lobby.id);
        if is_new {
            self.heartbeat_timer.reset();
            self.refresh_timer.reset();
            self.ready_announced = false;
        }

        let is_host = self.player_id.as_deref() == Some(lobby.host_id.as_str());
        self.hosted_lobby = is_host.then(|| lobby.clone());
        self.joined_lobby = Some(lobby);
        self.state = if is_host {
            SessionState::Hosting
        } else {
            SessionState::Joined
        };
    }

    fn clear_lobby(&mut self, next: SessionState) {
        self.hosted_lobby = None;
        self.joined_lobby = None;
        self.ready_announced = false;
        self.state = next;
    }

    pub async fn sign_in(&mut self) -> bool {
        if self.player_id.is_some() {
            return true;
        }

        match self.context.auth.sign_in_anonymously().await {
            Ok(player_id) => {
                self.player_name = format!("Player {}", rand::thread_rng().gen_range(0..9999));
                info!("Signed in {} as {}", player_id, self.player_name);

                self.player_id = Some(player_id.clone());
                self.state = SessionState::SignedIn;
                self.emit(SessionEvent::SignedIn {
                    player_id,
                    player_name: self.player_name.clone(),
                });
                true
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                false
            }
        }
    }

    pub async fn create_lobby(&mut self, name: &str, max_players: usize, game_mode: &str) -> bool {
        let Some(player) = self.local_player() else {
            return false;
        };

        let mut data = DataMap::new();
        data.insert(
            KEY_GAME_MODE.to_string(),
            DataObject::new(Visibility::Public, game_mode),
        );
        data.insert(
            KEY_START_GAME.to_string(),
            DataObject::new(Visibility::Member, START_GAME_SENTINEL),
        );
        let options = CreateLobbyOptions {
            is_private: false,
            player,
            data,
        };

        match self.context.lobby.create_lobby(name, max_players, options).await {
            Ok(lobby) => {
                info!(
                    "Created lobby {} with game mode {}. Max players: {}. Available slots: {}. Id: {}. Code: {}",
                    lobby.name,
                    game_mode,
                    lobby.max_players,
                    lobby.available_slots(),
                    lobby.id,
                    lobby.lobby_code
                );
                let event = SessionEvent::LobbyCreated {
                    lobby_id: lobby.id.clone(),
                    lobby_code: lobby.lobby_code.clone(),
                };
                self.set_lobby(lobby);
                self.emit(event);
                self.log_players();
                true
            }
            Err(e) => {
                warn!("Failed to create lobby: {}", e);
                false
            }
        }
    }

    /// Lists open lobbies, newest first. Empty on failure.
    pub async fn list_lobbies(&self) -> Vec<Lobby> {
        let options = QueryLobbiesOptions {
            count: self.config.query_count,
            min_available_slots: 0,
            order: QueryOrder::NewestFirst,
        };

        match self.context.lobby.query_lobbies(options).await {
            Ok(lobbies) => {
                info!("Lobbies found: {}", lobbies.len());
                for lobby in &lobbies {
                    info!(
                        "Lobby {} with game mode {}",
                        lobby.name,
                        lobby.game_mode().unwrap_or("?")
                    );
                }
                lobbies
            }
            Err(e) => {
                warn!("Failed to list lobbies: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn join_by_code(&mut self, code: &str) -> bool {
        let Some(player) = self.local_player() else {
            return false;
        };

        match self
            .context
            .lobby
            .join_lobby_by_code(code, JoinLobbyOptions { player })
            .await
        {
            Ok(lobby) => {
                info!("Joined lobby with code {}", code);
                self.joined(lobby);
                true
            }
            Err(e) => {
                warn!("Failed to join lobby {}: {}", code, e);
                false
            }
        }
    }

    pub async fn quick_join(&mut self) -> bool {
        let Some(player) = self.local_player() else {
            return false;
        };

        match self
            .context
            .lobby
            .quick_join(JoinLobbyOptions { player })
            .await
        {
            Ok(lobby) => {
                info!("Quick joined lobby {}", lobby.name);
                self.joined(lobby);
                true
            }
            Err(e) => {
                warn!("Quick join failed: {}", e);
                false
            }
        }
    }

    fn joined(&mut self, lobby: Lobby) {
        let lobby_id = lobby.id.clone();
        self.set_lobby(lobby);
        self.emit(SessionEvent::LobbyJoined { lobby_id });
        self.log_players();
    }

    /// Host-only.
    pub async fn update_game_mode(&mut self, game_mode: &str) -> bool {
        let Some(lobby_id) = self.hosted_lobby_id("change the game mode") else {
            return false;
        };

        let mut data = DataMap::new();
        data.insert(
            KEY_GAME_MODE.to_string(),
            DataObject::new(Visibility::Public, game_mode),
        );
        let options = UpdateLobbyOptions {
            host_id: None,
            data,
        };

        match self.context.lobby.update_lobby(&lobby_id, options).await {
            Ok(lobby) => {
                self.set_lobby(lobby);
                self.log_players();
                true
            }
            Err(e) => {
                warn!("Failed to update game mode: {}", e);
                false
            }
        }
    }

    pub async fn update_player_name(&mut self, name: &str) -> bool {
        self.player_name = name.to_string();

        let (Some(lobby_id), Some(player_id)) = (
            self.joined_lobby.as_ref().map(|lobby| lobby.id.clone()),
            self.player_id.clone(),
        ) else {
            // Picked up by the next create or join.
            return true;
        };

        let mut data = DataMap::new();
        data.insert(
            KEY_PLAYER_NAME.to_string(),
            DataObject::new(Visibility::Member, name),
        );

        match self
            .context
            .lobby
            .update_player(&lobby_id, &player_id, UpdatePlayerOptions { data })
            .await
        {
            Ok(lobby) => {
                self.set_lobby(lobby);
                self.log_players();
                true
            }
            Err(e) => {
                warn!("Failed to update player name: {}", e);
                false
            }
        }
    }

    pub fn log_players(&self) {
        let Some(lobby) = &self.joined_lobby else {
            info!("No lobby to list players for");
            return;
        };

        info!(
            "Players in lobby {} with game mode {}:",
            lobby.name,
            lobby.game_mode().unwrap_or("?")
        );
        for player in &lobby.players {
            info!("  {} {}", player.id, player.name().unwrap_or("?"));
        }
    }

    pub async fn leave_lobby(&mut self) -> bool {
        let (Some(lobby_id), Some(player_id)) = (
            self.joined_lobby.as_ref().map(|lobby| lobby.id.clone()),
            self.player_id.clone(),
        ) else {
            debug!("Not in a lobby");
            return false;
        };

        match self.context.lobby.remove_player(&lobby_id, &player_id).await {
            Ok(()) => {
                info!("Left lobby {}", lobby_id);
                self.clear_lobby(SessionState::SignedIn);
                self.emit(SessionEvent::LobbyLeft { lobby_id });
                true
            }
            Err(e) => {
                warn!("Failed to leave lobby: {}", e);
                false
            }
        }
    }

    /// Host-only. The kicked player finds out on its own next refresh, so the
    /// local snapshot is left as is.
    pub async fn kick_player(&mut self, player_id: &str) -> bool {
        let Some(lobby_id) = self.hosted_lobby_id("kick players") else {
            return false;
        };
        if self.player_id.as_deref() == Some(player_id) {
            info!("Cannot kick yourself; leave the lobby instead");
            return false;
        }

        match self.context.lobby.remove_player(&lobby_id, player_id).await {
            Ok(()) => {
                info!("Kicked player {}", player_id);
                true
            }
            Err(e) => {
                warn!("Failed to kick player {}: {}", player_id, e);
                false
            }
        }
    }

    /// Host-only. Other participants may still see us as host until their
    /// next refresh.
    pub async fn migrate_host(&mut self, player_id: &str) -> bool {
        let Some(lobby_id) = self.hosted_lobby_id("migrate the host") else {
            return false;
        };

        let options = UpdateLobbyOptions {
            host_id: Some(player_id.to_string()),
            data: DataMap::new(),
        };

        match self.context.lobby.update_lobby(&lobby_id, options).await {
            Ok(lobby) => {
                info!("Host migrated to {}", player_id);
                self.set_lobby(lobby);
                self.log_players();
                true
            }
            Err(e) => {
                warn!("Failed to migrate host: {}", e);
                false
            }
        }
    }

    /// Host-only.
    pub async fn delete_lobby(&mut self) -> bool {
        let Some(lobby_id) = self.hosted_lobby_id("delete the lobby") else {
            return false;
        };

        match self.context.lobby.delete_lobby(&lobby_id).await {
            Ok(()) => {
                info!("Deleted lobby {}", lobby_id);
                self.clear_lobby(SessionState::SignedIn);
                self.emit(SessionEvent::LobbyLeft { lobby_id });
                true
            }
            Err(e) => {
                warn!("Failed to delete lobby: {}", e);
                false
            }
        }
    }

    /// Host-only: allocates the relay, starts hosting, and publishes the join
    /// code so the other participants can follow. If only the publish failed,
    /// calling again republishes the code of the relay already running.
    pub async fn start_game(&mut self) -> bool {
        let Some(lobby_id) = self.hosted_lobby_id("start the game") else {
            return false;
        };

        let relay_code = match self.hosted_relay.clone() {
            Some(relay_code) => relay_code,
            None => {
                let Some(relay_code) = self.context.relay.create_relay().await else {
                    return false;
                };
                self.hosted_relay = Some(relay_code.clone());
                relay_code
            }
        };

        let mut data = DataMap::new();
        data.insert(
            KEY_START_GAME.to_string(),
            DataObject::new(Visibility::Member, relay_code.clone()),
        );
        let options = UpdateLobbyOptions {
            host_id: None,
            data,
        };

        match self.context.lobby.update_lobby(&lobby_id, options).await {
            Ok(lobby) => {
                info!("Published relay code {} to lobby {}", relay_code, lobby_id);
                self.set_lobby(lobby);
                true
            }
            Err(e) => {
                warn!("Failed to publish relay code: {}", e);
                false
            }
        }
    }

    fn hosted_lobby_id(&self, action: &str) -> Option<String> {
        if !self.is_host() {
            info!("Only the host can {}", action);
            return None;
        }
        self.hosted_lobby.as_ref().map(|lobby| lobby.id.clone())
    }

    /// Drives the periodic liveness signal and refresh. Call once per frame.
    pub async fn update(&mut self, now: Instant) {
        if self.hosted_lobby.is_some() && self.heartbeat_timer.poll(now) {
            self.send_heartbeat().await;
        }
        if self.joined_lobby.is_some() && self.refresh_timer.poll(now) {
            self.refresh().await;
        }
    }

    async fn send_heartbeat(&mut self) {
        let Some(lobby_id) = self.hosted_lobby.as_ref().map(|lobby| lobby.id.clone()) else {
            return;
        };

        match self.context.lobby.send_heartbeat(&lobby_id).await {
            Ok(()) => debug!("Heartbeat sent for lobby {}", lobby_id),
            Err(e) => warn!("Heartbeat failed for lobby {}: {}", lobby_id, e),
        }
    }

    async fn refresh(&mut self) {
        let Some(lobby_id) = self.joined_lobby.as_ref().map(|lobby| lobby.id.clone()) else {
            return;
        };

        match self.context.lobby.get_lobby(&lobby_id).await {
            Ok(lobby) => self.on_refreshed(lobby).await,
            Err(e) => warn!("Failed to refresh lobby {}: {}", lobby_id, e),
        }
    }

    async fn on_refreshed(&mut self, lobby: Lobby) {
        // A leave or game start may have raced this poll.
        if self.joined_lobby.is_none() {
            return;
        }

        let Some(player_id) = self.player_id.clone() else {
            return;
        };

        if !lobby.has_player(&player_id) {
            info!("Kicked from lobby {}", lobby.id);
            self.clear_lobby(SessionState::SignedIn);
            self.emit(SessionEvent::Kicked { lobby_id: lobby.id });
            return;
        }

        let is_host = lobby.host_id == player_id;
        if is_host && lobby.players.len() == 2 {
            if !self.ready_announced {
                self.ready_announced = true;
                info!("Lobby {} is ready to start", lobby.id);
                self.emit(SessionEvent::ReadyToStart {
                    lobby_id: lobby.id.clone(),
                });
            }
        } else if lobby.players.len() != 2 {
            self.ready_announced = false;
        }

        let relay_code = lobby.relay_code().map(str::to_string);
        self.set_lobby(lobby);

        if let Some(relay_code) = relay_code {
            self.state = SessionState::GameStarting;
            self.emit(SessionEvent::GameStarting {
                relay_code: relay_code.clone(),
                is_host,
            });

            if !is_host {
                self.context.relay.join_relay(&relay_code).await;
            }

            self.clear_lobby(SessionState::Detached);
        }
    }
}
