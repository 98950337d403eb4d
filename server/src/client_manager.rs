//! Participant connection management for the authoritative server
//!
//! This module handles the server-side bookkeeping of connected participants:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Mark assignment in connection order (first Cross, second Circle)
//! - Connection health monitoring and automatic cleanup
//!
//! Marks are handed out exactly once per server process. A participant that
//! drops does not free its mark for somebody else.

use log::info;
use shared::{Mark, MAX_PARTICIPANTS};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a participant may stay silent before it is dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected participant
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Mark this participant plays as for the rest of the process
    pub mark: Mark,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, mark: Mark) -> Self {
        Self {
            id,
            addr,
            mark,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks the (at most two) participants of the game and their marks.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Marks handed out so far, in connection order
    assigned: usize,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            assigned: 0,
        }
    }

    /// Attempts to add a new participant
    ///
    /// Returns the client ID and its mark, or None once both marks have been
    /// handed out.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<(u32, Mark)> {
        let mark = match self.assigned {
            0 => Mark::Cross,
            n if n < MAX_PARTICIPANTS => Mark::Circle,
            _ => return None,
        };
        self.assigned += 1;

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {} as {}", client_id, addr, mark);
        self.clients
            .insert(client_id, Client::new(client_id, addr, mark));

        Some((client_id, mark))
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} ({}) disconnected", client.id, client.mark);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn mark_of(&self, client_id: u32) -> Option<Mark> {
        self.clients.get(&client_id).map(|client| client.mark)
    }

    /// Refreshes the activity timestamp of the client sending from `addr`.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<u32> {
        let client_id = self.find_client_by_addr(addr)?;
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
        Some(client_id)
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Number of marks handed out since the server started
    pub fn assigned(&self) -> usize {
        self.assigned
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
