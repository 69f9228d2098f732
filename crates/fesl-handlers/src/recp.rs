//! `recp`: stored records. Nothing is persisted, so every lookup misses.

use fesl_net::{HandlerContext, HandlerResult, Packet, PacketType, TransactionRouter};

use crate::error_reply;

/// Error code for a missing record.
pub const RECORD_NOT_FOUND: i64 = 5000;

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::RECP, "GetRecord", record_not_found);
    router.register(PacketType::RECP, "GetRecordAsMap", record_not_found);
}

pub fn record_not_found(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(vec![error_reply(request, "Record not found", RECORD_NOT_FOUND)])
}
