use super::{Allocation, JoinAllocation, RelayService, RelayServiceError};
use crate::session::memory::random_code;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug)]
struct AllocationRecord {
    join_code: Option<String>,
    max_connections: usize,
    joined: usize,
}

#[derive(Debug, Default)]
struct Allocations {
    records: HashMap<String, AllocationRecord>,
    next_id: u64,
}

/// In-process relay: every allocation resolves to one fixed endpoint where
/// the host's authority server listens.
#[derive(Debug)]
pub struct InMemoryRelayService {
    endpoint: SocketAddr,
    allocations: Mutex<Allocations>,
    available: AtomicBool,
}

impl InMemoryRelayService {
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            allocations: Mutex::new(Allocations::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self, call: &str) -> Result<(), RelayServiceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RelayServiceError::Unavailable(call.to_string()))
        }
    }
}

#[async_trait]
impl RelayService for InMemoryRelayService {
    async fn create_allocation(
        &self,
        max_connections: usize,
    ) -> Result<Allocation, RelayServiceError> {
        self.check_available("create_allocation")?;
        let mut allocations = self.allocations.lock().await;

        allocations.next_id += 1;
        let allocation_id = format!("alloc-{}", allocations.next_id);
        allocations.records.insert(
            allocation_id.clone(),
            AllocationRecord {
                join_code: None,
                max_connections,
                joined: 0,
            },
        );

        debug!("Relay allocated {} for {} participants", allocation_id, max_connections);
        Ok(Allocation {
            allocation_id,
            endpoint: self.endpoint,
            max_connections,
        })
    }

    async fn get_join_code(&self, allocation_id: &str) -> Result<String, RelayServiceError> {
        self.check_available("get_join_code")?;
        let mut allocations = self.allocations.lock().await;

        let taken: Vec<String> = allocations
            .records
            .values()
            .filter_map(|record| record.join_code.clone())
            .collect();
        let record = allocations
            .records
            .get_mut(allocation_id)
            .ok_or_else(|| RelayServiceError::AllocationNotFound(allocation_id.to_string()))?;

        if let Some(code) = &record.join_code {
            return Ok(code.clone());
        }
        let code = loop {
            let code = random_code(6);
            if !taken.contains(&code) {
                break code;
            }
        };
        record.join_code = Some(code.clone());
        Ok(code)
    }

    async fn join_allocation(&self, join_code: &str) -> Result<JoinAllocation, RelayServiceError> {
        self.check_available("join_allocation")?;
        let mut allocations = self.allocations.lock().await;

        let (allocation_id, record) = allocations
            .records
            .iter_mut()
            .find(|(_, record)| {
                record
                    .join_code
                    .as_deref()
                    .map_or(false, |code| code.eq_ignore_ascii_case(join_code))
            })
            .ok_or_else(|| RelayServiceError::InvalidJoinCode(join_code.to_string()))?;

        if record.joined >= record.max_connections {
            return Err(RelayServiceError::AllocationFull);
        }
        record.joined += 1;

        Ok(JoinAllocation {
            allocation_id: allocation_id.clone(),
            endpoint: self.endpoint,
        })
    }
}
