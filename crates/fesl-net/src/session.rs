//! Per-connection session state and the receive/dispatch loop.
//!
//! Each accepted connection gets one [`SessionEngine`]. It owns the
//! transport and a private [`Session`], reads one packet at a time, routes it
//! through the [`TransactionRouter`], and writes every reply before reading
//! again. The engine tracks an advisory state:
//!
//! ```text
//! Connected → HelloExchanged → Authenticated → Closed
//! ```
//!
//! Handlers never rely on it; each checks the session fields it needs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::identity::SharedIdentity;
use crate::packet::{MalformedPacket, Packet, PacketType};
use crate::routing::{Dispatch, HandlerContext, ServiceSettings, TransactionRouter};
use crate::transport::{Transport, TransportError};
use crate::value::FieldValue;

/// Session field holding the persona (display) name.
pub const PERSONA_NAME: &str = "personaName";
/// Session field holding the issued session key.
pub const SESSION_KEY: &str = "LKEY";
/// Session field holding the allocated user id.
pub const USER_ID: &str = "UID";

/// Advisory lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, nothing exchanged yet.
    Connected,
    /// `fsys/Hello` answered.
    HelloExchanged,
    /// A session key has been issued.
    Authenticated,
    /// The loop has exited.
    Closed,
}

/// Why a session loop ended.
#[derive(Debug)]
pub enum CloseReason {
    /// Reading failed, including an orderly close by the peer.
    Disconnected(TransportError),
    /// A packet could not be decoded; framing is lost.
    Malformed(MalformedPacket),
    /// Writing a reply failed.
    WriteFailed(TransportError),
}

/// Connection-local values accumulated during login.
#[derive(Debug, Clone)]
pub struct Session {
    endpoint: String,
    fields: HashMap<String, FieldValue>,
}

impl Session {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            fields: HashMap::new(),
        }
    }

    /// Remote address of the connection.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn persona_name(&self) -> Option<&str> {
        match self.fields.get(PERSONA_NAME) {
            Some(FieldValue::Text(name)) => Some(name),
            _ => None,
        }
    }

    pub fn set_persona_name(&mut self, name: impl Into<String>) {
        self.set(PERSONA_NAME, name.into());
    }

    pub fn session_key(&self) -> Option<&str> {
        match self.fields.get(SESSION_KEY) {
            Some(FieldValue::Text(key)) => Some(key),
            _ => None,
        }
    }

    pub fn set_session_key(&mut self, key: impl Into<String>) {
        self.set(SESSION_KEY, key.into());
    }

    pub fn user_id(&self) -> Option<u64> {
        match self.fields.get(USER_ID)? {
            FieldValue::Integer(id) => u64::try_from(*id).ok(),
            FieldValue::Text(id) => id.parse().ok(),
        }
    }

    pub fn set_user_id(&mut self, id: u64) {
        self.set(USER_ID, id);
    }

    /// Whether a session key has been issued on this connection.
    pub fn is_logged_in(&self) -> bool {
        self.session_key().is_some()
    }
}

/// Drives one connection from accept to close.
pub struct SessionEngine<T> {
    transport: T,
    session: Session,
    state: SessionState,
    identity: Arc<SharedIdentity>,
    router: Arc<TransactionRouter>,
    settings: Arc<ServiceSettings>,
}

impl<T: Transport> SessionEngine<T> {
    pub fn new(
        transport: T,
        endpoint: impl Into<String>,
        identity: Arc<SharedIdentity>,
        router: Arc<TransactionRouter>,
        settings: Arc<ServiceSettings>,
    ) -> Self {
        Self {
            transport,
            session: Session::new(endpoint),
            state: SessionState::Connected,
            identity,
            router,
            settings,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve the connection until it closes. The session is discarded.
    pub async fn run(mut self) -> CloseReason {
        let reason = loop {
            if let Err(reason) = self.serve_one().await {
                break reason;
            }
        };
        self.state = SessionState::Closed;

        match &reason {
            CloseReason::Disconnected(TransportError::ConnectionClosed) => {
                tracing::info!("Connection has been closed with {}", self.session.endpoint());
            }
            CloseReason::Disconnected(e) => {
                tracing::info!("Connection with {} ended: {e}", self.session.endpoint());
            }
            CloseReason::Malformed(e) => {
                tracing::warn!(
                    "Dropping {} after malformed packet: {e}",
                    self.session.endpoint()
                );
            }
            CloseReason::WriteFailed(e) => {
                tracing::warn!("Write to {} failed: {e}", self.session.endpoint());
            }
        }
        reason
    }

    /// Read and fully handle one unit of application data.
    pub async fn serve_one(&mut self) -> Result<(), CloseReason> {
        let data = self
            .transport
            .read_application_data()
            .await
            .map_err(CloseReason::Disconnected)?;
        if data.is_empty() {
            return Ok(());
        }

        let request = Packet::decode(&data).map_err(CloseReason::Malformed)?;
        let replies = self.dispatch(&request);

        for reply in replies {
            let bytes = match reply.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(
                        "Failed to encode {}/{} reply: {e}",
                        reply.kind,
                        reply.txn()
                    );
                    continue;
                }
            };
            self.transport
                .write_application_data(&bytes)
                .await
                .map_err(CloseReason::WriteFailed)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, request: &Packet) -> Vec<Packet> {
        let txn = request.txn();
        if txn != "MemCheck" {
            tracing::debug!("Type: {} | TXN: {}", request.kind, txn);
        }

        let mut ctx = HandlerContext {
            session: &mut self.session,
            identity: &self.identity,
            settings: &self.settings,
        };

        match self.router.dispatch(request, &mut ctx) {
            Dispatch::Handled(Ok(replies)) => {
                self.advance_state(request.kind, &txn);
                replies
            }
            Dispatch::Handled(Err(e)) => {
                tracing::warn!(
                    "{}/{} from {} failed: {e}",
                    request.kind,
                    txn,
                    self.session.endpoint()
                );
                Vec::new()
            }
            Dispatch::Unhandled => {
                tracing::warn!("Unknown packet type: {}, TXN: {}", request.kind, txn);
                Vec::new()
            }
        }
    }

    fn advance_state(&mut self, kind: PacketType, txn: &str) {
        if self.state == SessionState::Connected && kind == PacketType::FSYS && txn == "Hello" {
            self.state = SessionState::HelloExchanged;
        }
        if self.state != SessionState::Authenticated && self.session.is_logged_in() {
            tracing::info!(
                "{} authenticated as {:?}",
                self.session.endpoint(),
                self.session.persona_name()
            );
            self.state = SessionState::Authenticated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TransmissionType;
    use crate::routing::{HandlerError, HandlerResult};
    use crate::transport::StreamTransport;
    use crate::value::PacketRecord;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    /// Transport that replays canned reads and records writes.
    struct ScriptedTransport {
        reads: VecDeque<Vec<u8>>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl ScriptedTransport {
        fn new(reads: Vec<Vec<u8>>) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
            let writes = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    reads: reads.into(),
                    writes: Arc::clone(&writes),
                },
                writes,
            )
        }
    }

    impl Transport for ScriptedTransport {
        async fn read_application_data(&mut self) -> Result<Vec<u8>, TransportError> {
            self.reads
                .pop_front()
                .ok_or(TransportError::ConnectionClosed)
        }

        async fn write_application_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.writes.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    fn request(kind: PacketType, txn: &str, id: u32) -> Packet {
        Packet::new(
            kind,
            TransmissionType::SinglePacketRequest,
            id,
            PacketRecord::new().with("TXN", txn),
        )
    }

    fn encoded(kind: PacketType, txn: &str, id: u32) -> Vec<u8> {
        request(kind, txn, id).encode().unwrap()
    }

    fn test_router() -> TransactionRouter {
        let mut router = TransactionRouter::new();
        router.register(
            PacketType::FSYS,
            "Hello",
            |req: &Packet, _: &mut HandlerContext<'_>| -> HandlerResult {
                Ok(vec![
                    Packet::response_to(req, PacketRecord::new().with("TXN", "Hello")),
                    Packet::push(PacketType::FSYS, PacketRecord::new().with("TXN", "MemCheck")),
                ])
            },
        );
        router.register(
            PacketType::FSYS,
            "MemCheck",
            |_: &Packet, _: &mut HandlerContext<'_>| -> HandlerResult { Ok(Vec::new()) },
        );
        router.register(
            PacketType::ACCT,
            "NuLogin",
            |req: &Packet, ctx: &mut HandlerContext<'_>| -> HandlerResult {
                let key = ctx.identity.next_session_key();
                ctx.session.set_session_key(key.clone());
                ctx.session.set_persona_name("bob");
                Ok(vec![Packet::response_to(
                    req,
                    PacketRecord::new().with("TXN", "NuLogin").with("lkey", key),
                )])
            },
        );
        router.register(
            PacketType::PRES,
            "PresenceSubscribe",
            |_: &Packet, ctx: &mut HandlerContext<'_>| -> HandlerResult {
                ctx.session
                    .user_id()
                    .ok_or(HandlerError::NotLoggedIn("user id"))?;
                Ok(Vec::new())
            },
        );
        router
    }

    fn engine<T: Transport>(transport: T) -> SessionEngine<T> {
        SessionEngine::new(
            transport,
            "127.0.0.1:40000",
            Arc::new(SharedIdentity::new()),
            Arc::new(test_router()),
            Arc::new(ServiceSettings::default()),
        )
    }

    fn decode_all(writes: &Arc<Mutex<Vec<Vec<u8>>>>) -> Vec<Packet> {
        writes
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| Packet::decode(bytes).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_replies_written_in_order() {
        let (transport, writes) =
            ScriptedTransport::new(vec![encoded(PacketType::FSYS, "Hello", 1)]);
        let reason = engine(transport).run().await;
        assert!(matches!(
            reason,
            CloseReason::Disconnected(TransportError::ConnectionClosed)
        ));

        let replies = decode_all(&writes);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].txn(), "Hello");
        assert_eq!(replies[0].id, 1);
        assert_eq!(replies[1].txn(), "MemCheck");
        assert_eq!(replies[1].id, 0);
        assert_eq!(replies[1].transmission, TransmissionType::SinglePacketRequest);
    }

    #[tokio::test]
    async fn test_zero_length_reads_are_skipped() {
        let (transport, writes) = ScriptedTransport::new(vec![
            Vec::new(),
            Vec::new(),
            encoded(PacketType::FSYS, "Hello", 4),
        ]);
        engine(transport).run().await;
        assert_eq!(decode_all(&writes).len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_transaction_keeps_connection_open() {
        let (transport, writes) = ScriptedTransport::new(vec![
            encoded(PacketType::RANK, "GetTopN", 2),
            encoded(PacketType::FSYS, "Hello", 3),
        ]);
        let mut engine = engine(transport);

        engine.serve_one().await.unwrap();
        assert!(writes.lock().unwrap().is_empty());

        engine.serve_one().await.unwrap();
        let replies = decode_all(&writes);
        assert_eq!(replies[0].id, 3);
    }

    #[tokio::test]
    async fn test_memcheck_reply_produces_nothing() {
        let (transport, writes) =
            ScriptedTransport::new(vec![encoded(PacketType::FSYS, "MemCheck", 0)]);
        let mut engine = engine(transport);
        engine.serve_one().await.unwrap();
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_keeps_connection_open() {
        let (transport, writes) = ScriptedTransport::new(vec![
            encoded(PacketType::PRES, "PresenceSubscribe", 5),
            encoded(PacketType::FSYS, "Hello", 6),
        ]);
        let mut engine = engine(transport);
        engine.serve_one().await.unwrap();
        engine.serve_one().await.unwrap();
        assert_eq!(decode_all(&writes)[0].id, 6);
    }

    #[tokio::test]
    async fn test_malformed_packet_closes_connection() {
        let mut bad = encoded(PacketType::FSYS, "Hello", 1);
        let last = bad.len() - 1;
        bad[last] = b'x';
        let (transport, writes) =
            ScriptedTransport::new(vec![bad, encoded(PacketType::FSYS, "Hello", 2)]);

        let reason = engine(transport).run().await;
        assert!(matches!(
            reason,
            CloseReason::Malformed(MalformedPacket::MissingTerminator)
        ));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_advances_with_transactions() {
        let (transport, _writes) = ScriptedTransport::new(vec![
            encoded(PacketType::FSYS, "Hello", 1),
            encoded(PacketType::ACCT, "NuLogin", 2),
        ]);
        let mut engine = engine(transport);
        assert_eq!(engine.state(), SessionState::Connected);

        engine.serve_one().await.unwrap();
        assert_eq!(engine.state(), SessionState::HelloExchanged);

        engine.serve_one().await.unwrap();
        assert_eq!(engine.state(), SessionState::Authenticated);
        assert_eq!(engine.session().persona_name(), Some("bob"));
        assert!(engine.session().is_logged_in());
    }

    #[tokio::test]
    async fn test_login_without_hello_still_authenticates() {
        let (transport, _writes) =
            ScriptedTransport::new(vec![encoded(PacketType::ACCT, "NuLogin", 1)]);
        let mut engine = engine(transport);
        engine.serve_one().await.unwrap();
        assert_eq!(engine.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_engine_over_stream_transport() {
        let (mut client, server) = duplex(8192);
        let task = tokio::spawn(engine(StreamTransport::new(server)).run());

        client
            .write_all(&encoded(PacketType::FSYS, "Hello", 7))
            .await
            .unwrap();

        let mut replies = Vec::new();
        for _ in 0..2 {
            let mut header = [0u8; 12];
            client.read_exact(&mut header).await.unwrap();
            let total = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
            let mut bytes = header.to_vec();
            bytes.resize(total as usize, 0);
            client.read_exact(&mut bytes[12..]).await.unwrap();
            replies.push(Packet::decode(&bytes).unwrap());
        }
        assert_eq!(replies[0].id, 7);
        assert_eq!(replies[1].txn(), "MemCheck");

        drop(client);
        let reason = task.await.unwrap();
        assert!(matches!(reason, CloseReason::Disconnected(_)));
    }

    #[test]
    fn test_session_fields() {
        let mut session = Session::new("10.0.0.2:1234");
        assert_eq!(session.endpoint(), "10.0.0.2:1234");
        assert!(!session.is_logged_in());
        assert_eq!(session.user_id(), None);

        session.set_user_id(1_000_000_000_000);
        session.set_session_key("key");
        session.set_persona_name("RacerX");
        session.set("custom", 5);

        assert_eq!(session.user_id(), Some(1_000_000_000_000));
        assert_eq!(session.session_key(), Some("key"));
        assert_eq!(session.persona_name(), Some("RacerX"));
        assert_eq!(session.get("custom"), Some(&FieldValue::Integer(5)));
        assert!(session.is_logged_in());
    }
}
