//! `rank`: player statistics. No stats are tracked, so every query is empty.

use fesl_net::{HandlerContext, HandlerResult, Packet, PacketType, TransactionRouter};

use crate::reply_fields;

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::RANK, "GetStats", get_stats);
}

pub fn get_stats(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    if let Some(keys) = request.fields.list_len("keys") {
        tracing::debug!("GetStats asked for {keys} keys");
    }
    let mut fields = reply_fields(request);
    fields.insert_list("stats", std::iter::empty::<i64>());
    Ok(vec![Packet::response_to(request, fields)])
}
