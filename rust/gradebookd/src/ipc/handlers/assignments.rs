use crate::ipc::error::ok;
use crate::ipc::helpers::{required_str, store, store_mut, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestContext};
use serde_json::json;

fn handle_assignments_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let assignments = store(state)?.list_assignments(&class_id)?;
    Ok(json!({ "assignments": assignments }))
}

fn handle_assignments_create(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let name = required_str(&req.params, "name")?;
    let added = store_mut(state)?.add_assignment(&class_id, &name)?;
    log::info!(
        "[{}] {} added assignment {} to class {} ({} grades)",
        ctx.request_id,
        ctx.user,
        added.assignment.id,
        class_id,
        added.grades_created
    );
    Ok(json!(added))
}

fn handle_assignments_delete(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let assignment_id = required_str(&req.params, "assignmentId")?;
    let grades_removed = store_mut(state)?.remove_assignment(&class_id, &assignment_id)?;
    log::info!(
        "[{}] {} removed assignment {} from class {}",
        ctx.request_id,
        ctx.user,
        assignment_id,
        class_id
    );
    Ok(json!({ "gradesRemoved": grades_removed }))
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.list" => handle_assignments_list(state, req),
        "assignments.create" => handle_assignments_create(state, ctx, req),
        "assignments.delete" => handle_assignments_delete(state, ctx, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
