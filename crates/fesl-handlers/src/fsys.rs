//! `fsys`: connection handshake, liveness checks and ping sites.

use fesl_net::value::key;
use fesl_net::{HandlerContext, HandlerResult, Packet, PacketRecord, PacketType, TransactionRouter};
use time::OffsetDateTime;
use time::macros::format_description;

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::FSYS, "Hello", hello);
    router.register(PacketType::FSYS, "MemCheck", mem_check);
    router.register(PacketType::FSYS, "GetPingSites", get_ping_sites);
}

/// Answer the handshake, then challenge the client with a MemCheck.
pub fn hello(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let settings = ctx.settings;
    let fields = PacketRecord::new()
        .with("domainPartition.domain", &settings.domain)
        .with("messengerIp", &settings.messenger_address)
        .with("messengerPort", settings.messenger_port)
        .with("domainPartition.subDomain", &settings.sub_domain)
        .with("TXN", "Hello")
        .with("activityTimeoutSecs", 0)
        .with("curTime", current_time())
        .with("theaterIp", &settings.theater_address)
        .with("theaterPort", settings.theater_port);

    Ok(vec![Packet::response_to(request, fields), mem_check_push()])
}

/// Client answers to our MemCheck are not verified.
pub fn mem_check(_request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(Vec::new())
}

pub fn get_ping_sites(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let site = key::list_item("pingSite", 0);
    let fields = PacketRecord::new()
        .with("TXN", "GetPingSites")
        .with(key::list_count("pingSite"), 1)
        .with(format!("{site}.addr"), &ctx.settings.ping_site_address)
        .with(format!("{site}.type"), 0)
        .with(format!("{site}.name"), "eu1")
        .with("minPingSitesToPing", 0);

    Ok(vec![Packet::response_to(request, fields)])
}

/// The unsolicited liveness challenge. Server pushes carry id 0.
pub fn mem_check_push() -> Packet {
    let mut fields = PacketRecord::new().with("TXN", "MemCheck");
    fields.insert_list("memcheck", std::iter::empty::<i64>());
    fields.insert("type", 0);
    fields.insert("salt", rand::random::<u32>());
    Packet::push(PacketType::FSYS, fields)
}

/// Wall-clock time as `MMM-dd-yyyy HH:mm:ss UTC`.
fn current_time() -> String {
    let format =
        format_description!("[month repr:short]-[day]-[year] [hour]:[minute]:[second] UTC");
    OffsetDateTime::now_utc()
        .format(format)
        .unwrap_or_default()
}
