use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{store, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestContext};
use crate::store::GradebookStore;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens (creating if needed) the workspace database and ends any session,
/// since user accounts live in the workspace.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let store = GradebookStore::open(path)?;
    state.store = Some(store);
    state.workspace = Some(path.to_path_buf());
    state.session.logout();
    log::info!("opened workspace {}", path.display());
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "authenticated": state.session.is_authenticated(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => {
            log::error!("failed to open workspace {}: {e:#}", path.display());
            err(&req.id, "db_open_failed", format!("{e:#}"), None)
        }
    }
}

fn handle_workspace_integrity(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report = store(state).and_then(|s| s.integrity_report().map_err(HandlerErr::from));
    match report {
        Ok(report) => {
            if !report.is_consistent() {
                log::warn!("integrity check found problems: {report:?}");
            }
            ok(
                &req.id,
                json!({ "report": report, "consistent": report.is_consistent() }),
            )
        }
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle_public(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}

pub fn try_handle(
    state: &mut AppState,
    _ctx: &RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workspace.integrity" => Some(handle_workspace_integrity(state, req)),
        _ => None,
    }
}
