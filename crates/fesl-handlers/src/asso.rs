//! `asso`: association lists (friends, mutes, ...). All lists are empty.

use fesl_net::{
    HandlerContext, HandlerError, HandlerResult, Packet, PacketType, TransactionRouter,
};

use crate::reply_fields;

/// Capacity advertised for the mute list.
pub const MUTE_LIST_SIZE: i64 = 100;

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::ASSO, "GetAssociations", get_associations);
}

pub fn get_associations(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let domain = request
        .fields
        .get("domainPartition.domain")
        .ok_or(HandlerError::MissingField("domainPartition.domain"))?;
    let sub_domain = request
        .fields
        .get("domainPartition.subDomain")
        .ok_or(HandlerError::MissingField("domainPartition.subDomain"))?;
    let user_id = ctx
        .session
        .user_id()
        .ok_or(HandlerError::NotLoggedIn("user id"))?;
    let kind = request
        .fields
        .text("type")
        .map(|t| t.into_owned())
        .unwrap_or_default();

    let mut fields = reply_fields(request)
        .with("domainPartition.domain", domain.clone())
        .with("domainPartition.subDomain", sub_domain.clone())
        .with("owner.id", user_id)
        .with("owner.type", 1)
        .with("type", kind.as_str())
        .with("members.[]", 0);

    if kind == "PlasmaMute" {
        fields.insert("maxListSize", MUTE_LIST_SIZE);
        if let Some(name) = ctx.session.persona_name() {
            fields.insert("owner.name", name);
        }
    } else {
        tracing::warn!("Unknown association type: {kind}");
    }

    Ok(vec![Packet::response_to(request, fields)])
}
