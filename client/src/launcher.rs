//! Starts the game transport inside this process once the relay is set up.

use crate::network::{Client, ClientHandle};
use crate::relay::{LaunchError, NetworkLauncher, NetworkRole, RelayServerData};
use async_trait::async_trait;
use log::{debug, error, info};
use server::network::Server;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// A participant started by [`LocalLauncher`].
pub struct LaunchedParticipant {
    pub role: NetworkRole,
    pub handle: ClientHandle,
}

/// Host role: runs the authority server on the relay endpoint and a
/// participant connected to it. Client role: runs a participant only.
///
/// Each started participant's handle is delivered on the receiver returned by
/// [`LocalLauncher::new`].
pub struct LocalLauncher {
    tick_duration: Duration,
    started: Mutex<Option<NetworkRole>>,
    participants: mpsc::UnboundedSender<LaunchedParticipant>,
}

impl LocalLauncher {
    pub fn new(tick_duration: Duration) -> (Self, mpsc::UnboundedReceiver<LaunchedParticipant>) {
        let (participants, participants_rx) = mpsc::unbounded_channel();
        let launcher = Self {
            tick_duration,
            started: Mutex::new(None),
            participants,
        };
        (launcher, participants_rx)
    }

    /// Fails if a previous launch already succeeded. A failed launch leaves
    /// the launcher free for another attempt.
    fn ensure_idle(started: &Option<NetworkRole>) -> Result<(), LaunchError> {
        match *started {
            Some(existing) => Err(LaunchError::AlreadyStarted(existing)),
            None => Ok(()),
        }
    }

    async fn start_participant(
        &self,
        role: NetworkRole,
        endpoint: SocketAddr,
    ) -> Result<(), LaunchError> {
        let (client, handle) = Client::new(endpoint)
            .await
            .map_err(|e| LaunchError::Start {
                role,
                endpoint,
                reason: e.to_string(),
            })?;

        tokio::spawn(async move {
            if let Err(e) = client.run().await {
                error!("Participant stopped: {}", e);
            }
        });

        info!("Started as {} against {}", role, endpoint);
        if self
            .participants
            .send(LaunchedParticipant { role, handle })
            .is_err()
        {
            debug!("No one is waiting for the {} participant", role);
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkLauncher for LocalLauncher {
    async fn start_host(&self, data: RelayServerData) -> Result<(), LaunchError> {
        let mut started = self.started.lock().await;
        Self::ensure_idle(&started)?;

        let endpoint = data.endpoint;
        let mut server = Server::new(&endpoint.to_string(), self.tick_duration)
            .await
            .map_err(|e| LaunchError::Start {
                role: NetworkRole::Host,
                endpoint,
                reason: e.to_string(),
            })?;

        let authority = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Authority stopped: {}", e);
            }
        });

        if let Err(e) = self.start_participant(NetworkRole::Host, endpoint).await {
            authority.abort();
            return Err(e);
        }

        *started = Some(NetworkRole::Host);
        Ok(())
    }

    async fn start_client(&self, data: RelayServerData) -> Result<(), LaunchError> {
        let mut started = self.started.lock().await;
        Self::ensure_idle(&started)?;

        self.start_participant(NetworkRole::Client, data.endpoint)
            .await?;
        *started = Some(NetworkRole::Client);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(endpoint: SocketAddr, is_host: bool) -> RelayServerData {
        RelayServerData {
            allocation_id: "alloc-1".to_string(),
            endpoint,
            connection_type: "dtls".to_string(),
            is_host,
        }
    }

    #[tokio::test]
    async fn test_client_role_delivers_handle() {
        let (launcher, mut participants) = LocalLauncher::new(Duration::from_millis(16));
        let endpoint: SocketAddr = "127.0.0.1:9".parse().unwrap();

        launcher.start_client(data(endpoint, false)).await.unwrap();
        let participant = participants.try_recv().unwrap();
        assert_eq!(participant.role, NetworkRole::Client);
        assert_eq!(participant.handle.local_mark(), None);
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let (launcher, _participants) = LocalLauncher::new(Duration::from_millis(16));
        let endpoint: SocketAddr = "127.0.0.1:9".parse().unwrap();

        launcher.start_client(data(endpoint, false)).await.unwrap();
        let again = launcher.start_client(data(endpoint, false)).await;
        assert!(matches!(
            again,
            Err(LaunchError::AlreadyStarted(NetworkRole::Client))
        ));
    }

    #[tokio::test]
    async fn test_host_role_runs_authority_and_participant() {
        let (launcher, mut participants) = LocalLauncher::new(Duration::from_millis(16));
        let endpoint: SocketAddr = "127.0.0.1:0".parse().unwrap();

        // Port 0 cannot be reached by the participant, but the server must bind.
        launcher.start_host(data(endpoint, true)).await.unwrap();
        let participant = participants.try_recv().unwrap();
        assert_eq!(participant.role, NetworkRole::Host);
    }

    #[tokio::test]
    async fn test_failed_host_start_can_be_retried() {
        let (launcher, mut participants) = LocalLauncher::new(Duration::from_millis(16));
        let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = occupied.local_addr().unwrap();

        let first = launcher.start_host(data(taken, true)).await;
        assert!(matches!(
            first,
            Err(LaunchError::Start {
                role: NetworkRole::Host,
                ..
            })
        ));
        assert!(participants.try_recv().is_err());

        let endpoint: SocketAddr = "127.0.0.1:0".parse().unwrap();
        launcher.start_host(data(endpoint, true)).await.unwrap();
        assert_eq!(participants.try_recv().unwrap().role, NetworkRole::Host);

        let again = launcher.start_host(data(endpoint, true)).await;
        assert!(matches!(
            again,
            Err(LaunchError::AlreadyStarted(NetworkRole::Host))
        ));
    }
}
