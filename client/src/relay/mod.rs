//! Relay handoff: turns a lobby into a running game transport.
//!
//! The host asks the relay service for an allocation, publishes the join
//! code, and starts as network host. Everyone else redeems the code and starts
//! as network client. Failures are logged and reported as `None` / `false`;
//! there is no retry.

pub mod memory;

use async_trait::async_trait;
use log::{info, warn};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

pub use memory::InMemoryRelayService;

/// Secure datagram transport, the only kind the relay hands out here.
pub const CONNECTION_TYPE_DTLS: &str = "dtls";
/// Relay slots reserved in addition to the host.
pub const DEFAULT_MAX_NON_HOST: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayServiceError {
    #[error("allocation not found: {0}")]
    AllocationNotFound(String),
    #[error("no allocation matches join code {0}")]
    InvalidJoinCode(String),
    #[error("allocation is full")]
    AllocationFull,
    #[error("relay service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("network already started as {0}")]
    AlreadyStarted(NetworkRole),
    #[error("failed to start {role} on {endpoint}: {reason}")]
    Start {
        role: NetworkRole,
        endpoint: SocketAddr,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRole {
    Host,
    Client,
}

impl fmt::Display for NetworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkRole::Host => write!(f, "host"),
            NetworkRole::Client => write!(f, "client"),
        }
    }
}

/// Relay capacity reserved for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub allocation_id: String,
    pub endpoint: SocketAddr,
    pub max_connections: usize,
}

/// Relay capacity redeemed by a joining participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAllocation {
    pub allocation_id: String,
    pub endpoint: SocketAddr,
}

/// Transport settings derived from an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayServerData {
    pub allocation_id: String,
    pub endpoint: SocketAddr,
    pub connection_type: String,
    pub is_host: bool,
}

impl RelayServerData {
    pub fn from_allocation(allocation: &Allocation, connection_type: &str) -> Self {
        Self {
            allocation_id: allocation.allocation_id.clone(),
            endpoint: allocation.endpoint,
            connection_type: connection_type.to_string(),
            is_host: true,
        }
    }

    pub fn from_join_allocation(allocation: &JoinAllocation, connection_type: &str) -> Self {
        Self {
            allocation_id: allocation.allocation_id.clone(),
            endpoint: allocation.endpoint,
            connection_type: connection_type.to_string(),
            is_host: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub max_non_host: usize,
    pub connection_type: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_non_host: DEFAULT_MAX_NON_HOST,
            connection_type: CONNECTION_TYPE_DTLS.to_string(),
        }
    }
}

#[async_trait]
pub trait RelayService: Send + Sync {
    /// Reserves relay capacity for `max_connections` participants besides the host.
    async fn create_allocation(
        &self,
        max_connections: usize,
    ) -> Result<Allocation, RelayServiceError>;

    async fn get_join_code(&self, allocation_id: &str) -> Result<String, RelayServiceError>;

    async fn join_allocation(&self, join_code: &str) -> Result<JoinAllocation, RelayServiceError>;
}

/// Starts the local game transport once the relay is configured.
#[async_trait]
pub trait NetworkLauncher: Send + Sync {
    async fn start_host(&self, data: RelayServerData) -> Result<(), LaunchError>;
    async fn start_client(&self, data: RelayServerData) -> Result<(), LaunchError>;
}

#[derive(Clone)]
pub struct RelayConnector {
    service: Arc<dyn RelayService>,
    launcher: Arc<dyn NetworkLauncher>,
    config: RelayConfig,
}

impl RelayConnector {
    pub fn new(service: Arc<dyn RelayService>, launcher: Arc<dyn NetworkLauncher>) -> Self {
        Self::with_config(service, launcher, RelayConfig::default())
    }

    pub fn with_config(
        service: Arc<dyn RelayService>,
        launcher: Arc<dyn NetworkLauncher>,
        config: RelayConfig,
    ) -> Self {
        Self {
            service,
            launcher,
            config,
        }
    }

    /// Allocates a relay, starts hosting on it, and returns the join code.
    pub async fn create_relay(&self) -> Option<String> {
        let allocation = match self
            .service
            .create_allocation(self.config.max_non_host)
            .await
        {
            Ok(allocation) => allocation,
            Err(e) => {
                warn!("Failed to create relay allocation: {}", e);
                return None;
            }
        };

        let join_code = match self.service.get_join_code(&allocation.allocation_id).await {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed to get relay join code: {}", e);
                return None;
            }
        };
        info!("Relay join code is: {}", join_code);

        let data = RelayServerData::from_allocation(&allocation, &self.config.connection_type);
        if let Err(e) = self.launcher.start_host(data).await {
            warn!("Failed to start host: {}", e);
            return None;
        }

        Some(join_code)
    }

    /// Redeems `join_code` and starts as network client.
    pub async fn join_relay(&self, join_code: &str) -> bool {
        info!("Trying to join relay with code: {}", join_code);

        let allocation = match self.service.join_allocation(join_code).await {
            Ok(allocation) => allocation,
            Err(e) => {
                warn!("Failed to join relay: {}", e);
                return false;
            }
        };

        let data =
            RelayServerData::from_join_allocation(&allocation, &self.config.connection_type);
        if let Err(e) = self.launcher.start_client(data).await {
            warn!("Failed to start client: {}", e);
            return false;
        }

        info!("Joined relay with code: {}", join_code);
        true
    }
}
