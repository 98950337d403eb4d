use std::time::Duration;
use thiserror::Error;

/// The directory service rejects polls faster than this.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1100);

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const DEFAULT_QUERY_COUNT: usize = 25;
pub const DEFAULT_GAME_MODE: &str = "Classic";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("refresh interval {0:?} is below the directory rate limit of 1.1s")]
    RefreshTooFast(Duration),
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeat,
    #[error("lobby capacity must allow at least two players, got {0}")]
    CapacityTooSmall(usize),
    #[error("lobby query count must be between 1 and 100, got {0}")]
    QueryCount(usize),
}

/// Tunables for [`LobbyManager`](super::LobbyManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    pub refresh_interval: Duration,
    pub max_players: usize,
    pub query_count: usize,
    pub game_mode: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            refresh_interval: MIN_REFRESH_INTERVAL,
            max_players: DEFAULT_MAX_PLAYERS,
            query_count: DEFAULT_QUERY_COUNT,
            game_mode: DEFAULT_GAME_MODE.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(ConfigError::RefreshTooFast(self.refresh_interval));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if self.max_players < 2 {
            return Err(ConfigError::CapacityTooSmall(self.max_players));
        }
        if !(1..=100).contains(&self.query_count) {
            return Err(ConfigError::QueryCount(self.query_count));
        }
        Ok(())
    }
}
