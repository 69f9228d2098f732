//! The FESL transaction catalog.
//!
//! One module per packet type. Each exposes `register`, and
//! [`register_all`] builds the full routing table used by the server.
//! Handlers are shallow response builders: all shared state lives in
//! [`fesl_net::SharedIdentity`] and the per-connection [`fesl_net::Session`].

pub mod acct;
pub mod asso;
pub mod fsys;
pub mod pnow;
pub mod pres;
pub mod rank;
pub mod recp;
pub mod xmsg;


use fesl_net::{Packet, PacketRecord, TransactionRouter};

/// Register every supported transaction.
pub fn register_all(router: &mut TransactionRouter) {
    fsys::register(router);
    pnow::register(router);
    acct::register(router);
    asso::register(router);
    pres::register(router);
    rank::register(router);
    xmsg::register(router);
    recp::register(router);
}

/// Build a router with the whole catalog registered.
pub fn router() -> TransactionRouter {
    let mut router = TransactionRouter::new();
    register_all(&mut router);
    router
}

/// Reply carrying only the echoed `TXN`.
pub(crate) fn ack(request: &Packet) -> Packet {
    Packet::response_to(request, PacketRecord::new().with("TXN", request.txn()))
}

/// Start a reply record with `TXN` set from the request.
pub(crate) fn reply_fields(request: &Packet) -> PacketRecord {
    PacketRecord::new().with("TXN", request.txn())
}

/// Error reply in the shape clients display to the player.
pub(crate) fn error_reply(request: &Packet, message: &str, code: i64) -> Packet {
    let mut fields = reply_fields(request).with("localizedMessage", format!("\"{message}\""));
    fields.insert_list("errorContainer", std::iter::empty::<i64>());
    fields.insert("errorCode", code);
    Packet::response_to(request, fields)
}
