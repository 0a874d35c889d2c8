use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Track accepted TCP connections by peer address.
#[derive(Clone)]
#[allow(dead_code)]
pub struct ConnectionTracker {
    connections: Arc<Mutex<HashMap<SocketAddr, Vec<Instant>>>>,
}

#[allow(dead_code)]
impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a connection from a given peer.
    pub fn record_connection(&self, peer: SocketAddr) {
        let mut conns = self.connections.lock().unwrap();
        conns.entry(peer).or_default().push(Instant::now());
    }

    /// Total connections accepted.
    pub fn total_connections(&self) -> usize {
        self.connections.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Distinct client sockets seen.
    pub fn distinct_peers(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.connections.lock().unwrap().clear();
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
