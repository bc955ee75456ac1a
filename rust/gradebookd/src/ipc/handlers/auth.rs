use crate::ipc::error::ok;
use crate::ipc::helpers::{required_str, store, store_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn register(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = required_str(&req.params, "username")?;
    let password = required_str(&req.params, "password")?;
    let username = store_mut(state)?.register_user(&username, &password)?;
    log::info!("registered user {username}");
    Ok(json!({ "username": username }))
}

fn login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = required_str(&req.params, "username")?;
    let password = required_str(&req.params, "password")?;
    let username = username.trim().to_string();
    if !store(state)?.verify_user(&username, &password)? {
        log::warn!("failed login for user {username}");
        return Err(HandlerErr::new(
            "invalid_credentials",
            "invalid credentials, please try again",
        ));
    }
    state.session.login(username.clone());
    log::info!("user {username} logged in");
    Ok(json!({ "username": username }))
}

fn logout(state: &mut AppState) -> serde_json::Value {
    if let Some(user) = state.session.user() {
        log::info!("user {user} logged out");
    }
    state.session.logout();
    json!({ "ok": true })
}

fn status(state: &AppState) -> serde_json::Value {
    json!({
        "authenticated": state.session.is_authenticated(),
        "username": state.session.user(),
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.register" => register(state, req),
        "auth.login" => login(state, req),
        "auth.logout" => Ok(logout(state)),
        "auth.status" => Ok(status(state)),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
