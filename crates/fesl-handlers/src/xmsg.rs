//! `xmsg`: in-game messaging. The mailbox is always empty.

use fesl_net::{HandlerContext, HandlerResult, Packet, PacketType, TransactionRouter};

use crate::{ack, reply_fields};

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::XMSG, "ModifySettings", modify_settings);
    router.register(PacketType::XMSG, "GetMessages", get_messages);
}

pub fn modify_settings(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(vec![ack(request)])
}

pub fn get_messages(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let mut fields = reply_fields(request).with("localizedMessage", "\"Record not found\"");
    fields.insert_list("messages", std::iter::empty::<i64>());
    Ok(vec![Packet::response_to(request, fields)])
}
