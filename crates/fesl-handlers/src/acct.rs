//! `acct`: logins, personas and account details.
//!
//! `NuPS3Login` is the real entry point: it decodes the console ticket,
//! allocates a session key and user id, and publishes the key → persona
//! mapping for the other services. The remaining login variants reuse the
//! session's identity when one exists and allocate a fresh one otherwise.

use fesl_net::{
    HandlerContext, HandlerError, HandlerResult, Packet, PacketRecord, PacketType, Ticket,
    TransactionRouter,
};

use crate::{ack, error_reply, reply_fields};

/// Persona used when neither the session nor the request names one.
pub const DEFAULT_PERSONA: &str = "bob";

/// Error code the client shows as a rejected login.
pub const LOGIN_REJECTED: i64 = 122;

const TOS_VERSION: &str = "20426_17.20426_17";
/// Terms text, form-encoded with spaces kept literal.
const TOS_TEXT: &str = "Welcome to Arcadia!%0ABeware%2C here be dragons!";
const LOCKER_URL: &str = "http://127.0.0.1/test.php";

pub fn register(router: &mut TransactionRouter) {
    router.register(PacketType::ACCT, "NuPS3Login", nu_ps3_login);
    router.register(PacketType::ACCT, "NuGetTos", nu_get_tos);
    router.register(PacketType::ACCT, "GetTelemetryToken", ack_only);
    router.register(PacketType::ACCT, "NuPS3AddAccount", nu_ps3_add_account);
    router.register(PacketType::ACCT, "NuLookupUserInfo", nu_lookup_user_info);
    router.register(PacketType::ACCT, "NuLogin", login);
    router.register(PacketType::ACCT, "Login", login);
    router.register(PacketType::ACCT, "NuLoginPersona", login);
    router.register(PacketType::ACCT, "LoginSubAccount", login);
    router.register(PacketType::ACCT, "NuGetPersonas", nu_get_personas);
    router.register(PacketType::ACCT, "NuGetEntitlements", nu_get_entitlements);
    router.register(PacketType::ACCT, "GetAccount", get_account);
    router.register(PacketType::ACCT, "GameSpyPreAuth", game_spy_pre_auth);
    router.register(PacketType::ACCT, "GetSubAccounts", get_sub_accounts);
    router.register(PacketType::ACCT, "GetLockerURL", get_locker_url);
}

/// Console login: the ticket names the player.
pub fn nu_ps3_login(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    if let Some(flag) = request.fields.get("returnEncryptedInfo") {
        tracing::trace!("returnEncryptedInfo: {flag}");
    }

    let Some(armored) = request.fields.text("ticket") else {
        tracing::warn!("{} sent NuPS3Login without a ticket", ctx.session.endpoint());
        return Ok(vec![error_reply(request, "The ticket is missing", LOGIN_REJECTED)]);
    };

    let ticket = match Ticket::from_armored(&armored) {
        Ok(ticket) => ticket,
        Err(e) => {
            tracing::warn!("Rejecting login from {}: {e}", ctx.session.endpoint());
            return Ok(vec![error_reply(
                request,
                "The ticket could not be verified",
                LOGIN_REJECTED,
            )]);
        }
    };
    let Some(online_id) = ticket.online_id() else {
        tracing::warn!(
            "Rejecting login from {}: ticket carries no online id",
            ctx.session.endpoint()
        );
        return Ok(vec![error_reply(
            request,
            "The ticket could not be verified",
            LOGIN_REJECTED,
        )]);
    };
    tracing::debug!("Ticket for {online_id} expires at {:?}", ticket.expires_at());

    let lkey = ctx.identity.next_session_key();
    let user_id = ctx.identity.next_user_id();
    ctx.session.set_persona_name(online_id);
    ctx.session.set_session_key(lkey.clone());
    ctx.session.set_user_id(user_id);
    ctx.identity.register(&lkey, online_id);

    let fields = reply_fields(request)
        .with("lkey", lkey)
        .with("userId", user_id)
        .with("personaName", online_id);
    Ok(vec![Packet::response_to(request, fields)])
}

/// Shared by `NuLogin`, `Login`, `NuLoginPersona` and `LoginSubAccount`.
pub fn login(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let requested = ["name", "nuid"]
        .into_iter()
        .find_map(|field| request.fields.text(field))
        .map(|name| name.into_owned());
    let (lkey, user_id, name) = ensure_identity(ctx, requested);

    let fields = reply_fields(request)
        .with("lkey", lkey)
        .with("userId", user_id)
        .with("profileId", user_id)
        .with("displayName", name);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn nu_get_tos(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let fields = reply_fields(request)
        .with("version", TOS_VERSION)
        .with("tos", TOS_TEXT);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn ack_only(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    Ok(vec![ack(request)])
}

/// Account creation is accepted but nothing is stored.
pub fn nu_ps3_add_account(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    tracing::debug!(
        "Account registration requested for {:?}",
        request.fields.text("nuid")
    );
    Ok(vec![ack(request)])
}

pub fn nu_lookup_user_info(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let name = ctx
        .session
        .persona_name()
        .ok_or(HandlerError::NotLoggedIn("persona name"))?;

    let mut fields = reply_fields(request);
    fields.insert("userInfo.[]", 1);
    fields.insert("userInfo.0.userName", name);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn nu_get_personas(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let name = ctx
        .session
        .persona_name()
        .ok_or(HandlerError::NotLoggedIn("persona name"))?;

    let mut fields = reply_fields(request);
    fields.insert_list("personas", [name]);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn nu_get_entitlements(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    tracing::trace!("groupName: {:?}", request.fields.text("groupName"));
    let mut fields = reply_fields(request);
    fields.insert_list("entitlements", std::iter::empty::<i64>());
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn get_account(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let (lkey, user_id, name) = ensure_identity(ctx, None);
    let fields = reply_fields(request)
        .with("lkey", lkey)
        .with("userId", user_id)
        .with("nuid", name)
        .with("countryDesc", "\"United States of America\"")
        .with("thirdPartyMailFlag", 1)
        .with("dobMonth", 6)
        .with("dobYear", 1989);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn game_spy_pre_auth(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let challenge = format!("{:08x}", rand::random::<u32>());
    let fields = reply_fields(request).with("challenge", challenge);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn get_sub_accounts(request: &Packet, ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let (lkey, _, name) = ensure_identity(ctx, None);
    let mut fields = reply_fields(request).with("lkey", lkey);
    fields.insert_list("subAccounts", [name]);
    Ok(vec![Packet::response_to(request, fields)])
}

pub fn get_locker_url(request: &Packet, _ctx: &mut HandlerContext<'_>) -> HandlerResult {
    let fields = reply_fields(request).with("URL", LOCKER_URL);
    Ok(vec![Packet::response_to(request, fields)])
}

/// The session's `(lkey, user id, persona)`, allocating whatever is missing.
///
/// A name is only taken from the request when the session has none yet.
fn ensure_identity(
    ctx: &mut HandlerContext<'_>,
    requested: Option<String>,
) -> (String, u64, String) {
    let name = match ctx.session.persona_name() {
        Some(name) => name.to_string(),
        None => {
            let name = requested.unwrap_or_else(|| DEFAULT_PERSONA.to_string());
            ctx.session.set_persona_name(name.clone());
            name
        }
    };

    let lkey = match ctx.session.session_key() {
        Some(lkey) => lkey.to_string(),
        None => {
            let lkey = ctx.identity.next_session_key();
            ctx.session.set_session_key(lkey.clone());
            ctx.identity.register(&lkey, &name);
            lkey
        }
    };

    let user_id = match ctx.session.user_id() {
        Some(id) => id,
        None => {
            let id = ctx.identity.next_user_id();
            ctx.session.set_user_id(id);
            id
        }
    };

    (lkey, user_id, name)
}
