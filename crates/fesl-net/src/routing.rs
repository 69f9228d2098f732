//! Transaction routing: dispatch decoded packets to handlers keyed by
//! packet type and `TXN` name.
//!
//! The [`TransactionRouter`] is built once at startup and shared read-only by
//! every connection. A handler receives the request and a
//! [`HandlerContext`] and returns the packets to send back, in order.

use std::collections::HashMap;

use crate::identity::SharedIdentity;
use crate::packet::{Packet, PacketType};
use crate::session::Session;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Read-only values handlers put into their replies.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    /// Domain announced in `domainPartition.domain`.
    pub domain: String,
    /// Sub-domain announced in `domainPartition.subDomain`.
    pub sub_domain: String,
    /// Address of the theater (game lobby) service.
    pub theater_address: String,
    /// Port of the theater service.
    pub theater_port: u16,
    /// Address of the messenger service.
    pub messenger_address: String,
    /// Port of the messenger service (0 disables it).
    pub messenger_port: u16,
    /// Address advertised as the ping site.
    pub ping_site_address: String,
}

impl ServiceSettings {
    /// `/<domain>/<sub_domain>`, the partition id used by matchmaking.
    pub fn partition(&self) -> String {
        format!("/{}/{}", self.domain, self.sub_domain)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            domain: "ps3".to_string(),
            sub_domain: "BEACH".to_string(),
            theater_address: "127.0.0.1".to_string(),
            theater_port: 18_805,
            messenger_address: "127.0.0.1".to_string(),
            messenger_port: 0,
            ping_site_address: "127.0.0.1".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Errors a handler reports instead of replying. The connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The transaction needs a completed login.
    #[error("session has no {0}; login required")]
    NotLoggedIn(&'static str),

    /// The request lacks a field the handler needs.
    #[error("request is missing field {0:?}")]
    MissingField(&'static str),
}

/// Outcome of a handler call: the replies to write, in order.
pub type HandlerResult = Result<Vec<Packet>, HandlerError>;

/// Everything a handler may touch while serving one request.
pub struct HandlerContext<'a> {
    /// The connection-local session.
    pub session: &'a mut Session,
    /// Process-wide identifier allocation.
    pub identity: &'a SharedIdentity,
    /// Service addresses and naming.
    pub settings: &'a ServiceSettings,
}

/// A transaction handler.
pub trait TransactionHandler: Send + Sync {
    /// Serve one request.
    fn handle(&self, request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult;
}

/// Blanket implementation for functions and closures.
impl<F> TransactionHandler for F
where
    F: Fn(&Packet, &mut HandlerContext<'_>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        self(request, ctx)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Result of routing one packet.
#[derive(Debug)]
pub enum Dispatch {
    /// A handler ran.
    Handled(HandlerResult),
    /// No handler is registered for this (type, TXN) pair.
    Unhandled,
}

/// Maps `(packet type, TXN)` pairs to handlers.
pub struct TransactionRouter {
    handlers: HashMap<(PacketType, String), Box<dyn TransactionHandler>>,
}

impl TransactionRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for the same pair.
    pub fn register<H: TransactionHandler + 'static>(
        &mut self,
        kind: PacketType,
        txn: &str,
        handler: H,
    ) {
        self.handlers
            .insert((kind, txn.to_string()), Box::new(handler));
    }

    /// Route a packet to its handler. At most one handler runs.
    pub fn dispatch(&self, request: &Packet, ctx: &mut HandlerContext<'_>) -> Dispatch {
        match self.handlers.get(&(request.kind, request.txn())) {
            Some(handler) => Dispatch::Handled(handler.handle(request, ctx)),
            None => Dispatch::Unhandled,
        }
    }

    /// Whether a handler exists for the pair.
    pub fn handles(&self, kind: PacketType, txn: &str) -> bool {
        self.handlers.contains_key(&(kind, txn.to_string()))
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered pairs, for startup logging.
    pub fn registered(&self) -> impl Iterator<Item = (PacketType, &str)> {
        self.handlers.keys().map(|(kind, txn)| (*kind, txn.as_str()))
    }
}

impl Default for TransactionRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TransmissionType;
    use crate::value::PacketRecord;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(kind: PacketType, txn: &str) -> Packet {
        Packet::new(
            kind,
            TransmissionType::SinglePacketRequest,
            3,
            PacketRecord::new().with("TXN", txn),
        )
    }

    fn echo(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
        Ok(vec![Packet::response_to(request, request.fields.clone())])
    }

    fn with_ctx<R>(f: impl FnOnce(&mut HandlerContext<'_>) -> R) -> R {
        let mut session = Session::new("127.0.0.1:5000");
        let identity = SharedIdentity::new();
        let settings = ServiceSettings::default();
        let mut ctx = HandlerContext {
            session: &mut session,
            identity: &identity,
            settings: &settings,
        };
        f(&mut ctx)
    }

    #[test]
    fn test_packet_routed_to_matching_handler() {
        let mut router = TransactionRouter::new();
        router.register(PacketType::FSYS, "Hello", echo);

        let dispatch = with_ctx(|ctx| router.dispatch(&request(PacketType::FSYS, "Hello"), ctx));
        match dispatch {
            Dispatch::Handled(Ok(replies)) => {
                assert_eq!(replies.len(), 1);
                assert_eq!(replies[0].id, 3);
                assert_eq!(
                    replies[0].transmission,
                    TransmissionType::SinglePacketResponse
                );
            }
            other => panic!("unexpected dispatch {other:?}"),
        }
    }

    #[test]
    fn test_unknown_pair_is_unhandled() {
        let mut router = TransactionRouter::new();
        router.register(PacketType::FSYS, "Hello", echo);

        let dispatch =
            with_ctx(|ctx| router.dispatch(&request(PacketType::ACCT, "Hello"), ctx));
        assert!(matches!(dispatch, Dispatch::Unhandled));

        let dispatch =
            with_ctx(|ctx| router.dispatch(&request(PacketType::FSYS, "Goodbye"), ctx));
        assert!(matches!(dispatch, Dispatch::Unhandled));
    }

    #[test]
    fn test_routing_keys_on_both_type_and_txn() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);

        let mut router = TransactionRouter::new();
        router.register(
            PacketType::ACCT,
            "NuLogin",
            move |_: &Packet, _: &mut HandlerContext<'_>| -> HandlerResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            },
        );

        with_ctx(|ctx| router.dispatch(&request(PacketType::PRES, "NuLogin"), ctx));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        with_ctx(|ctx| router.dispatch(&request(PacketType::ACCT, "NuLogin"), ctx));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_errors_are_reported() {
        let mut router = TransactionRouter::new();
        router.register(
            PacketType::PRES,
            "PresenceSubscribe",
            |_: &Packet, _: &mut HandlerContext<'_>| -> HandlerResult {
                Err(HandlerError::NotLoggedIn("user id"))
            },
        );

        let dispatch = with_ctx(|ctx| {
            router.dispatch(&request(PacketType::PRES, "PresenceSubscribe"), ctx)
        });
        assert!(matches!(
            dispatch,
            Dispatch::Handled(Err(HandlerError::NotLoggedIn(_)))
        ));
    }

    #[test]
    fn test_handler_can_mutate_session() {
        let mut router = TransactionRouter::new();
        router.register(
            PacketType::ACCT,
            "NuLogin",
            |_: &Packet, ctx: &mut HandlerContext<'_>| -> HandlerResult {
                ctx.session.set_persona_name("bob");
                Ok(Vec::new())
            },
        );

        let name = with_ctx(|ctx| {
            router.dispatch(&request(PacketType::ACCT, "NuLogin"), ctx);
            ctx.session.persona_name().map(str::to_string)
        });
        assert_eq!(name.as_deref(), Some("bob"));
    }

    #[test]
    fn test_registration_bookkeeping() {
        let mut router = TransactionRouter::new();
        assert!(router.is_empty());
        router.register(PacketType::FSYS, "Hello", echo);
        router.register(PacketType::FSYS, "Hello", echo);
        router.register(PacketType::FSYS, "MemCheck", echo);

        assert_eq!(router.len(), 2);
        assert!(router.handles(PacketType::FSYS, "MemCheck"));
        assert!(!router.handles(PacketType::ACCT, "MemCheck"));
        assert_eq!(router.registered().count(), 2);
    }

    #[test]
    fn test_partition_format() {
        assert_eq!(ServiceSettings::default().partition(), "/ps3/BEACH");
    }
}
