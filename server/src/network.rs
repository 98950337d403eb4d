//! Server network layer handling UDP communications and the authority loop

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::game::GameState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, Target, CLIENT_VERSION, MAX_PACKET_SIZE, MAX_PARTICIPANTS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
}

/// Messages sent from the authority loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Authoritative server: sole owner and writer of the game state
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, tick_duration: Duration) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new())),
            game_state: GameState::new(),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues `packet` for every participant, including whoever caused it.
    fn broadcast_packet(&self, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Sends pending notifications, then the reconciled state if it changed.
    fn flush_replication(&mut self) {
        for event in self.game_state.drain_events() {
            debug!("Broadcasting event #{}: {:?}", event.sequence, event.event);
            self.broadcast_packet(event.into());
        }

        if let Some((version, state)) = self.game_state.take_state_update() {
            self.broadcast_packet(Packet::StateSync { version, state });
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if packet.target() != Target::Authority {
            warn!("Unexpected packet type from client at {}", addr);
            return;
        }

        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(client_version, addr).await;
            }

            Packet::MoveRequest { x, y, mark } => {
                let sender = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.touch(addr);
                    client_id.map(|id| (id, clients.mark_of(id)))
                };

                match sender {
                    Some((_, Some(assigned))) if assigned == mark => {
                        self.game_state.attempt_move(x, y, mark);
                    }
                    Some((client_id, _)) => {
                        debug!(
                            "Client {} tried to move as {} which is not their mark",
                            client_id, mark
                        );
                    }
                    None => debug!("Move request from unknown address {}", addr),
                }
            }

            Packet::RematchRequest => {
                let known = self.clients.write().await.touch(addr).is_some();
                if known {
                    self.game_state.rematch();
                }
            }

            Packet::Heartbeat => {
                self.clients.write().await.touch(addr);
            }

            Packet::Disconnect => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    clients.remove_client(&client_id);
                }
            }

            _ => {}
        }

        self.flush_replication();
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != CLIENT_VERSION {
            let reason = "Protocol version mismatch".to_string();
            self.send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        let (admitted, assigned) = {
            let mut clients = self.clients.write().await;
            // A repeated Connect means our reply was lost; answer it again.
            let admitted = match clients.touch(addr) {
                Some(client_id) => clients.mark_of(client_id).map(|mark| (client_id, mark)),
                None => clients.add_client(addr),
            };
            (admitted, clients.assigned())
        };

        match admitted {
            Some((client_id, mark)) => {
                self.send_packet(Packet::Connected { client_id, mark }, addr);

                let (version, state) = self.game_state.state_snapshot();
                self.send_packet(Packet::StateSync { version, state }, addr);

                if assigned == MAX_PARTICIPANTS {
                    self.game_state.start();
                }
            }
            None => {
                let reason = "Server full".to_string();
                self.send_packet(Packet::Disconnected { reason }, addr);
            }
        }
    }

    /// Resends the reconciled state so participants converge despite loss.
    async fn broadcast_game_state(&mut self) {
        let client_count = self.clients.read().await.len();
        if client_count == 0 {
            return;
        }

        let (version, state) = self.game_state.state_snapshot();
        self.broadcast_packet(Packet::StateSync { version, state });
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        let mut tick: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    tick += 1;
                    self.broadcast_game_state().await;

                    if tick % 60 == 0 {
                        debug!(
                            "Tick {}: {:?}, turn {:?}, scores {:?}",
                            tick,
                            self.game_state.phase(),
                            self.game_state.current_turn(),
                            self.game_state.scores()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameEvent, Mark};
    use tokio_test::assert_ok;

    async fn test_server() -> Server {
        assert_ok!(Server::new("127.0.0.1:0", Duration::from_millis(16)).await)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn queued(server: &mut Server) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn broadcast_events(messages: &[GameMessage]) -> Vec<GameEvent> {
        messages
            .iter()
            .filter_map(|m| match m {
                GameMessage::BroadcastPacket {
                    packet: Packet::Event { event, .. },
                } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    async fn connect(server: &mut Server, port: u16) {
        let packet = Packet::Connect {
            client_version: CLIENT_VERSION,
        };
        server.handle_packet(packet, addr(port)).await;
    }

    #[tokio::test]
    async fn test_connect_assigns_marks_and_starts_game() {
        let mut server = test_server().await;

        connect(&mut server, 9001).await;
        let first = queued(&mut server);
        assert!(matches!(
            first[0],
            GameMessage::SendPacket {
                packet: Packet::Connected {
                    mark: Mark::Cross,
                    ..
                },
                ..
            }
        ));
        assert!(broadcast_events(&first).is_empty());

        connect(&mut server, 9002).await;
        let second = queued(&mut server);
        assert!(matches!(
            second[0],
            GameMessage::SendPacket {
                packet: Packet::Connected {
                    mark: Mark::Circle,
                    ..
                },
                ..
            }
        ));
        assert_eq!(broadcast_events(&second), vec![GameEvent::GameStarted]);
        assert_eq!(server.game_state.current_turn(), Some(Mark::Cross));
    }

    #[tokio::test]
    async fn test_third_connection_is_told_server_full() {
        let mut server = test_server().await;
        connect(&mut server, 9001).await;
        connect(&mut server, 9002).await;
        queued(&mut server);

        connect(&mut server, 9003).await;
        let messages = queued(&mut server);
        match &messages[0] {
            GameMessage::SendPacket {
                packet: Packet::Disconnected { reason },
                addr: a,
            } => {
                assert_eq!(reason, "Server full");
                assert_eq!(*a, addr(9003));
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_connect_keeps_mark() {
        let mut server = test_server().await;
        connect(&mut server, 9001).await;
        connect(&mut server, 9001).await;

        let messages = queued(&mut server);
        let marks: Vec<Mark> = messages
            .iter()
            .filter_map(|m| match m {
                GameMessage::SendPacket {
                    packet: Packet::Connected { mark, .. },
                    ..
                } => Some(*mark),
                _ => None,
            })
            .collect();
        assert_eq!(marks, vec![Mark::Cross, Mark::Cross]);
        assert_eq!(server.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let mut server = test_server().await;
        server
            .handle_packet(Packet::Connect { client_version: 99 }, addr(9001))
            .await;

        let messages = queued(&mut server);
        assert!(matches!(
            messages[0],
            GameMessage::SendPacket {
                packet: Packet::Disconnected { .. },
                ..
            }
        ));
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_move_with_foreign_mark_is_ignored() {
        let mut server = test_server().await;
        connect(&mut server, 9001).await;
        connect(&mut server, 9002).await;
        queued(&mut server);

        // Circle's socket claims to be Cross.
        let spoofed = Packet::MoveRequest {
            x: 0,
            y: 0,
            mark: Mark::Cross,
        };
        server.handle_packet(spoofed, addr(9002)).await;
        assert!(queued(&mut server).is_empty());
        assert!(server.game_state.board().is_clear());

        let honest = Packet::MoveRequest {
            x: 0,
            y: 0,
            mark: Mark::Cross,
        };
        server.handle_packet(honest, addr(9001)).await;
        let events = broadcast_events(&queued(&mut server));
        assert_eq!(
            events,
            vec![GameEvent::PiecePlaced {
                x: 0,
                y: 0,
                mark: Mark::Cross
            }]
        );
    }

    #[tokio::test]
    async fn test_participant_bound_packets_are_ignored() {
        let mut server = test_server().await;
        connect(&mut server, 9001).await;
        queued(&mut server);

        let packet = Packet::Event {
            sequence: 1,
            event: GameEvent::Rematch,
        };
        server.handle_packet(packet, addr(9001)).await;
        assert!(queued(&mut server).is_empty());
    }

    #[tokio::test]
    async fn test_rematch_from_unknown_address_ignored() {
        let mut server = test_server().await;
        connect(&mut server, 9001).await;
        connect(&mut server, 9002).await;
        queued(&mut server);

        server.handle_packet(Packet::RematchRequest, addr(9100)).await;
        assert!(queued(&mut server).is_empty());

        server.handle_packet(Packet::RematchRequest, addr(9002)).await;
        assert_eq!(
            broadcast_events(&queued(&mut server)),
            vec![GameEvent::Rematch]
        );
    }

    #[tokio::test]
    async fn test_disconnect_removes_client() {
        let mut server = test_server().await;
        connect(&mut server, 9001).await;
        server.handle_packet(Packet::Disconnect, addr(9001)).await;
        assert!(server.clients.read().await.is_empty());
    }
}
