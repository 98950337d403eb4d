//! In-process lobby directory and sign-in provider.
//!
//! Used by the local demo and by tests. It follows the remote directory's
//! observable rules (join codes, slot accounting, visibility filtering, host
//! migration on departure) without any persistence or expiry.

use super::service::{
    AuthService, CreateLobbyOptions, JoinLobbyOptions, Lobby, LobbyService, LobbyServiceError,
    QueryLobbiesOptions, QueryOrder, UpdateLobbyOptions, UpdatePlayerOptions,
};
use async_trait::async_trait;
use log::debug;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Random upper-case join code of `len` characters.
pub fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Default)]
struct Directory {
    lobbies: HashMap<String, Lobby>,
    heartbeats: HashMap<String, Instant>,
    next_created: u64,
    calls: Vec<&'static str>,
}

impl Directory {
    fn lobby_mut(&mut self, lobby_id: &str) -> Result<&mut Lobby, LobbyServiceError> {
        self.lobbies
            .get_mut(lobby_id)
            .ok_or_else(|| LobbyServiceError::LobbyNotFound(lobby_id.to_string()))
    }

    fn unique_code(&self) -> String {
        loop {
            let code = random_code(6);
            if !self.lobbies.values().any(|lobby| lobby.lobby_code == code) {
                return code;
            }
        }
    }
}

fn admit(lobby: &mut Lobby, options: JoinLobbyOptions) -> Result<Lobby, LobbyServiceError> {
    if lobby.has_player(&options.player.id) {
        return Err(LobbyServiceError::AlreadyMember(options.player.id));
    }
    if lobby.available_slots() == 0 {
        return Err(LobbyServiceError::LobbyFull);
    }
    lobby.players.push(options.player);
    Ok(lobby.clone())
}

#[derive(Debug)]
pub struct InMemoryLobbyService {
    directory: Mutex<Directory>,
    available: AtomicBool,
}

impl Default for InMemoryLobbyService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLobbyService {
    pub fn new() -> Self {
        Self {
            directory: Mutex::new(Directory::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent call fail with [`LobbyServiceError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Names of the calls received so far, in arrival order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.directory.lock().await.calls.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.directory.lock().await.calls.len()
    }

    pub async fn last_heartbeat(&self, lobby_id: &str) -> Option<Instant> {
        self.directory.lock().await.heartbeats.get(lobby_id).copied()
    }

    /// Reads a lobby without counting as a call.
    pub async fn peek(&self, lobby_id: &str) -> Option<Lobby> {
        self.directory.lock().await.lobbies.get(lobby_id).cloned()
    }

    async fn call(
        &self,
        name: &'static str,
    ) -> Result<MutexGuard<'_, Directory>, LobbyServiceError> {
        let mut directory = self.directory.lock().await;
        directory.calls.push(name);
        if !self.available.load(Ordering::SeqCst) {
            return Err(LobbyServiceError::Unavailable(name.to_string()));
        }
        Ok(directory)
    }
}

#[async_trait]
impl LobbyService for InMemoryLobbyService {
    async fn create_lobby(
        &self,
        name: &str,
        max_players: usize,
        options: CreateLobbyOptions,
    ) -> Result<Lobby, LobbyServiceError> {
        let mut directory = self.call("create_lobby").await?;

        directory.next_created += 1;
        let created = directory.next_created;
        let lobby = Lobby {
            id: format!("lobby-{}", created),
            lobby_code: directory.unique_code(),
            name: name.to_string(),
            host_id: options.player.id.clone(),
            max_players,
            is_private: options.is_private,
            players: vec![options.player],
            data: options.data,
            created,
        };

        debug!("Directory created {} ({})", lobby.id, lobby.lobby_code);
        directory.heartbeats.insert(lobby.id.clone(), Instant::now());
        directory.lobbies.insert(lobby.id.clone(), lobby.clone());
        Ok(lobby)
    }

    async fn join_lobby_by_code(
        &self,
        code: &str,
        options: JoinLobbyOptions,
    ) -> Result<Lobby, LobbyServiceError> {
        let mut directory = self.call("join_lobby_by_code").await?;

        let lobby = directory
            .lobbies
            .values_mut()
            .find(|lobby| lobby.lobby_code.eq_ignore_ascii_case(code))
            .ok_or_else(|| LobbyServiceError::InvalidJoinCode(code.to_string()))?;
        admit(lobby, options)
    }

    async fn quick_join(&self, options: JoinLobbyOptions) -> Result<Lobby, LobbyServiceError> {
        let mut directory = self.call("quick_join").await?;

        let lobby = directory
            .lobbies
            .values_mut()
            .filter(|lobby| {
                !lobby.is_private
                    && lobby.available_slots() > 0
                    && !lobby.has_player(&options.player.id)
            })
            .min_by_key(|lobby| lobby.created)
            .ok_or(LobbyServiceError::NoOpenLobby)?;
        admit(lobby, options)
    }

    async fn query_lobbies(
        &self,
        options: QueryLobbiesOptions,
    ) -> Result<Vec<Lobby>, LobbyServiceError> {
        let directory = self.call("query_lobbies").await?;

        let mut results: Vec<&Lobby> = directory
            .lobbies
            .values()
            .filter(|lobby| !lobby.is_private && lobby.available_slots() > options.min_available_slots)
            .collect();
        match options.order {
            QueryOrder::NewestFirst => results.sort_by(|a, b| b.created.cmp(&a.created)),
            QueryOrder::OldestFirst => results.sort_by(|a, b| a.created.cmp(&b.created)),
        }

        Ok(results
            .into_iter()
            .take(options.count)
            .map(Lobby::public_view)
            .collect())
    }

    async fn get_lobby(&self, lobby_id: &str) -> Result<Lobby, LobbyServiceError> {
        let mut directory = self.call("get_lobby").await?;
        directory.lobby_mut(lobby_id).map(|lobby| lobby.clone())
    }

    async fn send_heartbeat(&self, lobby_id: &str) -> Result<(), LobbyServiceError> {
        let mut directory = self.call("send_heartbeat").await?;
        directory.lobby_mut(lobby_id)?;
        directory
            .heartbeats
            .insert(lobby_id.to_string(), Instant::now());
        Ok(())
    }

    async fn update_lobby(
        &self,
        lobby_id: &str,
        options: UpdateLobbyOptions,
    ) -> Result<Lobby, LobbyServiceError> {
        let mut directory = self.call("update_lobby").await?;
        let lobby = directory.lobby_mut(lobby_id)?;

        if let Some(host_id) = options.host_id {
            if !lobby.has_player(&host_id) {
                return Err(LobbyServiceError::PlayerNotFound(host_id));
            }
            lobby.host_id = host_id;
        }
        lobby.data.extend(options.data);
        Ok(lobby.clone())
    }

    async fn update_player(
        &self,
        lobby_id: &str,
        player_id: &str,
        options: UpdatePlayerOptions,
    ) -> Result<Lobby, LobbyServiceError> {
        let mut directory = self.call("update_player").await?;
        let lobby = directory.lobby_mut(lobby_id)?;

        let player = lobby
            .players
            .iter_mut()
            .find(|player| player.id == player_id)
            .ok_or_else(|| LobbyServiceError::PlayerNotFound(player_id.to_string()))?;
        player.data.extend(options.data);
        Ok(lobby.clone())
    }

    async fn remove_player(
        &self,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<(), LobbyServiceError> {
        let mut directory = self.call("remove_player").await?;
        let lobby = directory.lobby_mut(lobby_id)?;

        let index = lobby
            .players
            .iter()
            .position(|player| player.id == player_id)
            .ok_or_else(|| LobbyServiceError::PlayerNotFound(player_id.to_string()))?;
        lobby.players.remove(index);

        if lobby.players.is_empty() {
            debug!("Directory closed empty lobby {}", lobby_id);
            directory.lobbies.remove(lobby_id);
            directory.heartbeats.remove(lobby_id);
        } else if lobby.host_id == player_id {
            lobby.host_id = lobby.players[0].id.clone();
        }
        Ok(())
    }

    async fn delete_lobby(&self, lobby_id: &str) -> Result<(), LobbyServiceError> {
        let mut directory = self.call("delete_lobby").await?;
        directory
            .lobbies
            .remove(lobby_id)
            .ok_or_else(|| LobbyServiceError::LobbyNotFound(lobby_id.to_string()))?;
        directory.heartbeats.remove(lobby_id);
        Ok(())
    }
}

/// Anonymous sign-in that hands out unique player ids.
#[derive(Debug, Default)]
pub struct InMemoryAuth {
    next_id: AtomicU32,
    refused: AtomicBool,
}

impl InMemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sign-in fail with [`LobbyServiceError::Authentication`].
    pub fn set_available(&self, available: bool) {
        self.refused.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthService for InMemoryAuth {
    async fn sign_in_anonymously(&self) -> Result<String, LobbyServiceError> {
        if self.refused.load(Ordering::SeqCst) {
            return Err(LobbyServiceError::Authentication(
                "anonymous sign-in refused".to_string(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("player-{}-{}", id, random_code(4).to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::service::{
        DataMap, DataObject, Player, Visibility, KEY_GAME_MODE, KEY_START_GAME,
        START_GAME_SENTINEL,
    };

    fn create_options(player_id: &str) -> CreateLobbyOptions {
        let mut data = DataMap::new();
        data.insert(
            KEY_GAME_MODE.to_string(),
            DataObject::new(Visibility::Public, "Classic"),
        );
        data.insert(
            KEY_START_GAME.to_string(),
            DataObject::new(Visibility::Member, START_GAME_SENTINEL),
        );
        CreateLobbyOptions {
            is_private: false,
            player: Player::named(player_id, player_id),
            data,
        }
    }

    fn join(player_id: &str) -> JoinLobbyOptions {
        JoinLobbyOptions {
            player: Player::named(player_id, player_id),
        }
    }

    #[tokio::test]
    async fn test_join_by_code_and_capacity() {
        let service = InMemoryLobbyService::new();
        let lobby = service
            .create_lobby("MyLobby", 2, create_options("host"))
            .await
            .unwrap();
        assert_eq!(lobby.lobby_code.len(), 6);
        assert_eq!(lobby.host_id, "host");

        let joined = service
            .join_lobby_by_code(&lobby.lobby_code.to_lowercase(), join("guest"))
            .await
            .unwrap();
        assert_eq!(joined.players.len(), 2);

        let full = service
            .join_lobby_by_code(&lobby.lobby_code, join("late"))
            .await;
        assert_eq!(full, Err(LobbyServiceError::LobbyFull));

        let bad_code = service.join_lobby_by_code("NOPE00", join("late")).await;
        assert!(matches!(bad_code, Err(LobbyServiceError::InvalidJoinCode(_))));
    }

    #[tokio::test]
    async fn test_quick_join_picks_open_lobby() {
        let service = InMemoryLobbyService::new();
        let full = service
            .create_lobby("Full", 2, create_options("a"))
            .await
            .unwrap();
        service
            .join_lobby_by_code(&full.lobby_code, join("b"))
            .await
            .unwrap();
        let open = service
            .create_lobby("Open", 4, create_options("c"))
            .await
            .unwrap();

        let joined = service.quick_join(join("d")).await.unwrap();
        assert_eq!(joined.id, open.id);

        let empty = InMemoryLobbyService::new();
        assert_eq!(
            empty.quick_join(join("d")).await,
            Err(LobbyServiceError::NoOpenLobby)
        );
    }

    #[tokio::test]
    async fn test_query_newest_first_and_public_only() {
        let service = InMemoryLobbyService::new();
        for name in ["first", "second", "third"] {
            service
                .create_lobby(name, 4, create_options(name))
                .await
                .unwrap();
        }

        let results = service
            .query_lobbies(QueryLobbiesOptions {
                count: 2,
                min_available_slots: 0,
                order: QueryOrder::NewestFirst,
            })
            .await
            .unwrap();

        let names: Vec<&str> = results.iter().map(|lobby| lobby.name.as_str()).collect();
        assert_eq!(names, vec!["third", "second"]);
        assert_eq!(results[0].game_mode(), Some("Classic"));
        assert_eq!(results[0].data_value(KEY_START_GAME), None);
        assert_eq!(results[0].players[0].name(), None);
    }

    #[tokio::test]
    async fn test_host_leaving_migrates_and_last_leaving_closes() {
        let service = InMemoryLobbyService::new();
        let lobby = service
            .create_lobby("MyLobby", 4, create_options("host"))
            .await
            .unwrap();
        service
            .join_lobby_by_code(&lobby.lobby_code, join("guest"))
            .await
            .unwrap();

        service.remove_player(&lobby.id, "host").await.unwrap();
        assert_eq!(service.peek(&lobby.id).await.unwrap().host_id, "guest");

        service.remove_player(&lobby.id, "guest").await.unwrap();
        assert!(service.peek(&lobby.id).await.is_none());
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_host() {
        let service = InMemoryLobbyService::new();
        let lobby = service
            .create_lobby("MyLobby", 4, create_options("host"))
            .await
            .unwrap();

        let result = service
            .update_lobby(
                &lobby.id,
                UpdateLobbyOptions {
                    host_id: Some("stranger".to_string()),
                    data: DataMap::new(),
                },
            )
            .await;
        assert_eq!(
            result,
            Err(LobbyServiceError::PlayerNotFound("stranger".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unavailable_service_records_call() {
        let service = InMemoryLobbyService::new();
        service.set_available(false);

        let result = service.get_lobby("lobby-1").await;
        assert!(matches!(result, Err(LobbyServiceError::Unavailable(_))));
        assert_eq!(service.calls().await, vec!["get_lobby"]);
    }

    #[tokio::test]
    async fn test_anonymous_ids_unique() {
        let auth = InMemoryAuth::new();
        let first = auth.sign_in_anonymously().await.unwrap();
        let second = auth.sign_in_anonymously().await.unwrap();
        assert_ne!(first, second);

        auth.set_available(false);
        assert!(matches!(
            auth.sign_in_anonymously().await,
            Err(LobbyServiceError::Authentication(_))
        ));
    }
}
