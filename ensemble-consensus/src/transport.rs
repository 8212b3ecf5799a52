//! Datagram transport between ensemble members.
//!
//! The engine only needs a best-effort broadcast; delivery, retries and
//! membership belong to the engine itself.

use std::{
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{Mutex, PoisonError},
};

use tracing::debug;

use ensemble_common::{EnsembleError, ReplicaId, Result};

pub trait Transport: Send + Sync {
    fn local_addr(&self) -> String;

    /// Sends `payload` to every other member of the ensemble.
    fn broadcast(&self, payload: &[u8]) -> Result<()>;
}

/// UDP transport bound to this replica's slot in the address list.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddr,
    peers: Vec<SocketAddr>,
}

impl UdpTransport {
    pub fn new(addrs: &[String], id: ReplicaId, size: u8) -> Result<Self> {
        if addrs.len() != size as usize {
            return Err(EnsembleError::Transport(format!(
                "ensemble size {} does not match {} addresses",
                size,
                addrs.len()
            )));
        }
        let own = addrs.get(id.index()).ok_or_else(|| {
            EnsembleError::Transport(format!("replica {} outside ensemble of {}", id, size))
        })?;

        let bind_addr = resolve(own, "0.0.0.0")?;
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| EnsembleError::Transport(format!("bind {bind_addr}: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| EnsembleError::Transport(format!("set_nonblocking: {e}")))?;
        let local = socket
            .local_addr()
            .map_err(|e| EnsembleError::Transport(format!("local_addr: {e}")))?;

        let peers = addrs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id.index())
            .map(|(_, addr)| resolve(addr, "127.0.0.1"))
            .collect::<Result<Vec<_>>>()?;

        debug!("UDP transport for replica {} bound on {} ({} peers)", id, local, peers.len());
        Ok(Self { socket, local, peers })
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> String {
        self.local.to_string()
    }

    fn broadcast(&self, payload: &[u8]) -> Result<()> {
        let mut failed = Vec::new();
        for peer in &self.peers {
            if let Err(e) = self.socket.send_to(payload, peer) {
                failed.push(format!("{peer}: {e}"));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(EnsembleError::Transport(failed.join(", ")))
        }
    }
}

/// Accepts `host:port` as well as the bare `:port` form, filling in `default_host`.
fn resolve(addr: &str, default_host: &str) -> Result<SocketAddr> {
    let full = if addr.starts_with(':') {
        format!("{default_host}{addr}")
    } else {
        addr.to_string()
    };
    full.to_socket_addrs()
        .map_err(|e| EnsembleError::Transport(format!("resolve {addr}: {e}")))?
        .next()
        .ok_or_else(|| EnsembleError::Transport(format!("no address for {addr}")))
}

/// Transport that keeps every broadcast in memory.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Transport for InMemoryTransport {
    fn local_addr(&self) -> String {
        "memory".to_string()
    }

    fn broadcast(&self, payload: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_addrs(n: usize) -> Vec<String> {
        // port 0 lets the OS pick; peers are never contacted in these tests
        (0..n).map(|_| "127.0.0.1:0".to_string()).collect()
    }

    #[test]
    fn test_resolve_bare_port() {
        let addr = resolve(":9000", "127.0.0.1").unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_udp_binds_own_slot() {
        let transport = UdpTransport::new(&local_addrs(3), ReplicaId(1), 3).unwrap();
        assert_eq!(transport.peers().len(), 2);
        assert!(transport.local_addr().starts_with("127.0.0.1:"));
    }

    #[test]
    fn test_udp_rejects_id_outside_ensemble() {
        let err = UdpTransport::new(&local_addrs(3), ReplicaId(3), 3).unwrap_err();
        assert!(matches!(err, EnsembleError::Transport(_)));
    }

    #[test]
    fn test_udp_rejects_size_mismatch() {
        let err = UdpTransport::new(&local_addrs(2), ReplicaId(0), 3).unwrap_err();
        assert!(matches!(err, EnsembleError::Transport(_)));
    }

    #[test]
    fn test_udp_rejects_taken_port() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let taken = holder.local_addr().unwrap().to_string();
        let addrs = vec![taken, "127.0.0.1:0".to_string()];
        let err = UdpTransport::new(&addrs, ReplicaId(0), 2).unwrap_err();
        assert!(matches!(err, EnsembleError::Transport(_)));
    }

    #[test]
    fn test_in_memory_records_broadcasts() {
        let transport = InMemoryTransport::new();
        transport.broadcast(b"one").unwrap();
        transport.broadcast(b"two").unwrap();
        assert_eq!(transport.sent(), vec![b"one".to_vec(), b"two".to_vec()]);
    }
}
