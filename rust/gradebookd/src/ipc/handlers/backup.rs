use crate::backup;
use crate::ipc::error::ok;
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestContext};
use serde_json::json;
use std::path::PathBuf;

fn workspace_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_export_workspace_bundle(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let workspace = workspace_path(state)?;
    let out = PathBuf::from(required_str(&req.params, "outPath")?);

    let export = backup::export_workspace_bundle(&workspace, &out)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    log::info!(
        "[{}] {} exported workspace bundle to {}",
        ctx.request_id,
        ctx.user,
        out.display()
    );
    Ok(json!({
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "counts": export.counts,
        "outPath": out.to_string_lossy(),
    }))
}

/// Closes the store, swaps the database file, then reopens the workspace.
/// The session ends because the restored database carries its own users.
/// A rejected backup leaves the old database in place, and it is reopened.
fn handle_import_workspace_bundle(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let workspace = workspace_path(state)?;
    let src = PathBuf::from(required_str(&req.params, "inPath")?);

    state.store = None;
    state.session.logout();
    let imported = backup::import_workspace_bundle(&src, &workspace);
    let reopened = open_workspace(state, &workspace);

    let import = imported.map_err(|e| {
        log::warn!("[{}] rejected backup {}: {e:#}", ctx.request_id, src.display());
        HandlerErr::new("io_failed", format!("{e:#}"))
    })?;
    reopened.map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    log::info!(
        "[{}] {} restored workspace from {} ({})",
        ctx.request_id,
        ctx.user,
        src.display(),
        import.bundle_format_detected
    );
    Ok(json!({
        "bundleFormatDetected": import.bundle_format_detected,
        "restored": import.counts,
        "workspacePath": workspace.to_string_lossy(),
    }))
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_workspace_bundle(state, ctx, req),
        "backup.importWorkspaceBundle" => handle_import_workspace_bundle(state, ctx, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
