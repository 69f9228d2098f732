//! `pres`: presence subscriptions.

use fesl_net::{
    HandlerContext, HandlerError, HandlerResult, Packet, PacketType, TransactionRouter,
};

use crate::{ack, reply_fields};

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::PRES, "PresenceSubscribe", presence_subscribe);
    router.register(PacketType::PRES, "SetPresenceStatus", set_presence_status);
}

pub fn presence_subscribe(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let user_id = ctx
        .session
        .user_id()
        .ok_or(HandlerError::NotLoggedIn("user id"))?;

    let fields = reply_fields(request)
        .with("responses.0.outcome", 0)
        .with("responses.[]", 1)
        .with("responses.0.owner.type", 1)
        .with("responses.0.owner.id", user_id);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn set_presence_status(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(vec![ack(request)])
}
