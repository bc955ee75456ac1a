use super::handlers;
use super::types::{AppState, Request, RequestContext};
use crate::ipc::error::err;
use serde_json::json;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    log::debug!("request id={} method={}", req.id, req.method);

    if let Some(resp) = handlers::core::try_handle_public(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }

    let ctx = match require_session(state, &req) {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    if let Some(resp) = handlers::core::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::assignments::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, &ctx, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &ctx, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// Session gate: everything past the public handlers needs a logged-in user.
fn require_session(state: &AppState, req: &Request) -> Result<RequestContext, serde_json::Value> {
    match state.session.user() {
        Some(user) => Ok(RequestContext {
            request_id: req.id.clone(),
            user: user.to_string(),
        }),
        None => {
            log::info!("rejected unauthenticated request method={}", req.method);
            Err(err(
                &req.id,
                "unauthenticated",
                "you need to login first",
                Some(json!({ "redirect": "auth.login" })),
            ))
        }
    }
}
