//! TCP listener that hands each accepted connection to a [`SessionEngine`].
//!
//! The listener sees decrypted application data only; TLS termination sits in
//! front of it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::sync::{RwLock, watch};

use crate::identity::SharedIdentity;
use crate::routing::{ServiceSettings, TransactionRouter};
use crate::session::SessionEngine;
use crate::transport::{FrameConfig, StreamTransport};

/// Unique identifier for a TCP connection within a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when the connection map is at capacity.
#[derive(Debug)]
pub struct ConnectionLimitReached;

/// Live connections and their peer addresses.
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, SocketAddr>>,
    max_connections: usize,
}

impl ConnectionMap {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Track a connection. Returns `Err` if the map is at capacity.
    pub async fn insert(
        &self,
        id: ConnectionId,
        peer: SocketAddr,
    ) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, peer);
        Ok(())
    }

    pub async fn remove(&self, id: &ConnectionId) -> Option<SocketAddr> {
        self.inner.write().await.remove(id)
    }

    pub async fn peer(&self, id: &ConnectionId) -> Option<SocketAddr> {
        self.inner.read().await.get(id).copied()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Configuration for [`FeslServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Default: `0.0.0.0:18800`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 256.
    pub max_connections: usize,
    /// Per-packet read limits.
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 18_800)),
            max_connections: 256,
            frame: FrameConfig::default(),
        }
    }
}

/// Accepts connections and runs one session engine per connection.
pub struct FeslServer {
    config: ServerConfig,
    /// Active connection map (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    id_gen: Arc<IdGenerator>,
    identity: Arc<SharedIdentity>,
    router: Arc<TransactionRouter>,
    settings: Arc<ServiceSettings>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FeslServer {
    pub fn new(
        config: ServerConfig,
        identity: Arc<SharedIdentity>,
        router: Arc<TransactionRouter>,
        settings: Arc<ServiceSettings>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            id_gen: Arc::new(IdGenerator::new()),
            config,
            identity,
            router,
            settings,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Process-wide identity shared by every session.
    pub fn identity(&self) -> &Arc<SharedIdentity> {
        &self.identity
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("FESL server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener.
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("set_nodelay on {peer_addr} failed: {e}");
                    }

                    let id = self.id_gen.next_id();
                    if self.connections.insert(id, peer_addr).await.is_err() {
                        tracing::warn!("Connection limit reached, rejecting {peer_addr}");
                        continue;
                    }

                    tracing::info!("Opened connection {id:?} from {peer_addr}");

                    let transport = StreamTransport::with_config(stream, self.config.frame.clone());
                    let engine = SessionEngine::new(
                        transport,
                        peer_addr.to_string(),
                        Arc::clone(&self.identity),
                        Arc::clone(&self.router),
                        Arc::clone(&self.settings),
                    );
                    let connections = Arc::clone(&self.connections);
                    let mut task_shutdown = self.shutdown_rx.clone();

                    tokio::spawn(async move {
                        tokio::select! {
                            reason = engine.run() => {
                                tracing::debug!("Connection {id:?} ended: {reason:?}");
                            }
                            _ = wait_for_shutdown(&mut task_shutdown) => {
                                tracing::debug!("Connection {id:?} stopped by shutdown");
                            }
                        }
                        connections.remove(&id).await;
                        tracing::info!("Connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("FESL server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the server and every session to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // Sender dropped; the server is gone, so is this session.
            return;
        }
    }
}
