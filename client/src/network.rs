//! Participant network loop: talks to the authority over UDP and publishes the
//! replicated view to the rest of the process.

use crate::game::{ClientGameState, Notification, ParticipantView};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Mark, Packet, Scores, Target, CLIENT_VERSION, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// How often an unanswered `Connect` is repeated.
const CONNECT_RETRY: Duration = Duration::from_millis(500);
/// Keep-alive cadence; must stay well below the authority's timeout.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Requests from the presentation layer to the network loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Move { x: u8, y: u8 },
    Rematch,
    Disconnect,
}

/// Cheap handle the rest of the process uses to observe and drive a [`Client`].
///
/// Observers read the latest reconciled view and never block. Notifications
/// arrive in the order the authority broadcast them.
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    view: watch::Receiver<ParticipantView>,
}

impl ClientHandle {
    pub fn local_mark(&self) -> Option<Mark> {
        self.view.borrow().local_mark
    }

    pub fn current_turn(&self) -> Option<Mark> {
        self.view.borrow().current_turn
    }

    pub fn scores(&self) -> Scores {
        self.view.borrow().scores
    }

    pub fn view(&self) -> ParticipantView {
        self.view.borrow().clone()
    }

    /// Asks the authority to place our mark at `(x, y)`.
    ///
    /// Returns false only if the network loop has stopped. Whether the move
    /// was accepted is learned from the notifications that follow.
    pub fn attempt_move(&self, x: u8, y: u8) -> bool {
        self.commands.send(ClientCommand::Move { x, y }).is_ok()
    }

    pub fn request_rematch(&self) -> bool {
        self.commands.send(ClientCommand::Rematch).is_ok()
    }

    pub fn disconnect(&self) {
        // A closed channel means the loop has already stopped.
        let _ = self.commands.send(ClientCommand::Disconnect);
    }

    pub async fn next_notification(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }

    pub fn try_next_notification(&mut self) -> Option<Notification> {
        self.notifications.try_recv().ok()
    }

    /// Waits until the replicated view satisfies `predicate`.
    pub async fn wait_for_view(
        &mut self,
        predicate: impl Fn(&ParticipantView) -> bool,
    ) -> Option<ParticipantView> {
        loop {
            {
                let view = self.view.borrow_and_update();
                if predicate(&view) {
                    return Some(view.clone());
                }
            }
            self.view.changed().await.ok()?;
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,

    game_state: ClientGameState,

    commands: mpsc::UnboundedReceiver<ClientCommand>,
    notifications: mpsc::UnboundedSender<Notification>,
    view: watch::Sender<ParticipantView>,
}

impl Client {
    pub async fn new(server_addr: SocketAddr) -> Result<(Self, ClientHandle), ClientError> {
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ParticipantView::default());

        let client = Client {
            socket,
            server_addr,
            connected: false,
            game_state: ClientGameState::new(),
            commands: command_rx,
            notifications: notification_tx,
            view: view_tx,
        };
        let handle = ClientHandle {
            commands: command_tx,
            notifications: notification_rx,
            view: view_rx,
        };

        Ok((client, handle))
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        // The presentation layer may have gone away; the game carries on.
        let _ = self.notifications.send(notification);
    }

    fn publish_view(&self) {
        self.view.send_replace(self.game_state.view());
    }

    /// Applies one authority packet. Returns false once the session is over.
    ///
    /// The view is published before the resulting notifications go out, so an
    /// observer reacting to a notification already sees its effect.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        if packet.target() != Target::AllParticipants {
            warn!("Unexpected packet type from server");
            return true;
        }

        let notifications = match packet {
            Packet::Connected { client_id, mark } => {
                self.connected = true;
                let joined = self.game_state.apply_connected(client_id, mark);
                if joined.is_some() {
                    info!("Connected! Client ID: {}, playing {}", client_id, mark);
                }
                joined.into_iter().collect()
            }

            Packet::StateSync { version, state } => self.game_state.apply_state(version, state),

            Packet::Event { sequence, event } => {
                let notification = self.game_state.apply_event(sequence, event);
                if let Some(notification) = &notification {
                    debug!("Event #{}: {:?}", sequence, notification);
                }
                notification.into_iter().collect()
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.notify(Notification::Disconnected { reason });
                return false;
            }

            _ => Vec::new(),
        };

        self.publish_view();
        for notification in notifications {
            self.notify(notification);
        }
        true
    }

    /// Forwards a local request. Returns false when the loop should stop.
    async fn handle_command(&mut self, command: ClientCommand) -> Result<bool, ClientError> {
        match command {
            ClientCommand::Move { x, y } => match self.game_state.local_mark() {
                Some(mark) => self.send_packet(&Packet::MoveRequest { x, y, mark }).await?,
                None => debug!("Ignoring move before the authority assigned a mark"),
            },
            ClientCommand::Rematch => {
                if self.connected {
                    self.send_packet(&Packet::RematchRequest).await?;
                }
            }
            ClientCommand::Disconnect => return Ok(false),
        }
        Ok(true)
    }

    pub async fn run(mut self) -> Result<(), ClientError> {
        info!("Connecting to server at {}...", self.server_addr);

        let mut connect_interval = interval(CONNECT_RETRY);
        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) if from == self.server_addr => {
                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => {
                                    if !self.handle_packet(packet) {
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Ok((_, from)) => debug!("Ignoring datagram from {}", from),
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                command = self.commands.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_command(command).await?,
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                },

                _ = connect_interval.tick(), if !self.connected => {
                    self.send_packet(&Packet::Connect { client_version: CLIENT_VERSION }).await?;
                },

                _ = heartbeat_interval.tick(), if self.connected => {
                    self.send_packet(&Packet::Heartbeat).await?;
                },
            }
        }

        if self.connected {
            if let Err(e) = self.send_packet(&Packet::Disconnect).await {
                debug!("Could not send disconnect: {}", e);
            }
        }
        info!("Client stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameEvent, MatchState};

    async fn test_client() -> (Client, ClientHandle) {
        Client::new("127.0.0.1:9".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_handle_reflects_connected_packet() {
        let (mut client, mut handle) = test_client().await;

        assert!(client.handle_packet(Packet::Connected {
            client_id: 1,
            mark: Mark::Cross
        }));
        assert_eq!(handle.local_mark(), Some(Mark::Cross));
        assert_eq!(
            handle.try_next_notification(),
            Some(Notification::Joined {
                client_id: 1,
                mark: Mark::Cross
            })
        );
    }

    #[tokio::test]
    async fn test_state_and_events_reach_observers_in_order() {
        let (mut client, mut handle) = test_client().await;

        client.handle_packet(Packet::Event {
            sequence: 1,
            event: GameEvent::GameStarted,
        });
        client.handle_packet(Packet::StateSync {
            version: 1,
            state: MatchState {
                current_turn: Some(Mark::Cross),
                scores: Scores::default(),
            },
        });
        client.handle_packet(Packet::Event {
            sequence: 2,
            event: GameEvent::PiecePlaced {
                x: 0,
                y: 0,
                mark: Mark::Cross,
            },
        });

        assert_eq!(
            handle.try_next_notification(),
            Some(Notification::Game(GameEvent::GameStarted))
        );
        assert_eq!(
            handle.try_next_notification(),
            Some(Notification::TurnChanged {
                current_turn: Some(Mark::Cross)
            })
        );
        assert!(matches!(
            handle.try_next_notification(),
            Some(Notification::Game(GameEvent::PiecePlaced { .. }))
        ));
        assert_eq!(handle.current_turn(), Some(Mark::Cross));
        assert_eq!(handle.view().board.get(0, 0), Some(Mark::Cross));
    }

    #[tokio::test]
    async fn test_disconnected_packet_stops_loop() {
        let (mut client, mut handle) = test_client().await;

        let keep_running = client.handle_packet(Packet::Disconnected {
            reason: "Server full".to_string(),
        });
        assert!(!keep_running);
        assert_eq!(
            handle.try_next_notification(),
            Some(Notification::Disconnected {
                reason: "Server full".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_authority_bound_packets_ignored() {
        let (mut client, mut handle) = test_client().await;
        assert!(client.handle_packet(Packet::RematchRequest));
        assert!(handle.try_next_notification().is_none());
    }

    #[tokio::test]
    async fn test_move_before_assignment_not_sent() {
        let (mut client, _handle) = test_client().await;
        let keep_running = client
            .handle_command(ClientCommand::Move { x: 0, y: 0 })
            .await
            .unwrap();
        assert!(keep_running);

        let stop = client.handle_command(ClientCommand::Disconnect).await.unwrap();
        assert!(!stop);
    }

    #[tokio::test]
    async fn test_wait_for_view_returns_matching_view() {
        let (mut client, mut handle) = test_client().await;
        client.handle_packet(Packet::Connected {
            client_id: 2,
            mark: Mark::Circle,
        });

        let view = handle
            .wait_for_view(|view| view.local_mark == Some(Mark::Circle))
            .await
            .unwrap();
        assert_eq!(view.client_id, Some(2));
    }
}
