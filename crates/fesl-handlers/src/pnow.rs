//! `pnow`: the "play now" matchmaking flow.

use fesl_net::value::key;
use fesl_net::{HandlerContext, HandlerResult, Packet, PacketRecord, PacketType, TransactionRouter};

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::PNOW, "Start", start);
}

/// Acknowledge the search, then report it complete with one game to join.
pub fn start(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let pnow_id = ctx.identity.next_pnow_id();
    let game_id = ctx.identity.next_game_id();
    let lobby_id = ctx.identity.next_lobby_id();
    let partition = ctx.settings.partition();

    let started = PacketRecord::new()
        .with("TXN", "Start")
        .with("id.id", pnow_id)
        .with("id.partition", &partition);

    let mut status = PacketRecord::new()
        .with("TXN", "Status")
        .with("id.id", pnow_id)
        .with("id.partition", &partition)
        .with("sessionState", "COMPLETE");
    status.insert_bag(
        "props",
        [("resultType", "JOIN"), ("avgFit", "0.8182313914386985")],
    );
    // The games list is a third bag member holding nested data.
    let games = key::bag_member("props", "games");
    let arity = status.bag_len("props").unwrap_or(0) + 1;
    status.insert(key::bag_count("props"), arity);
    status.insert(key::list_count(&games), 1);
    status.insert(format!("{}.gid", key::list_item(&games, 0)), game_id);
    status.insert(format!("{}.lid", key::list_item(&games, 0)), lobby_id);

    tracing::debug!(
        "Play-now session {pnow_id} for {:?} placed in game {game_id}",
        ctx.session.persona_name()
    );

    Ok(vec![
        Packet::response_to(request, started),
        Packet::response_to(request, status),
    ])
}
