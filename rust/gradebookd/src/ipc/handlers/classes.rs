use crate::ipc::error::ok;
use crate::ipc::helpers::{required_str, store, store_mut, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestContext};
use serde_json::json;

fn handle_classes_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let classes = store(state)?.list_classes()?;
    Ok(json!({ "classes": classes }))
}

fn handle_classes_create(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(&req.params, "name")?;
    let class = store_mut(state)?.add_class(&name)?;
    log::info!("[{}] {} created class {}", ctx.request_id, ctx.user, class.id);
    Ok(json!({ "class": class }))
}

/// Everything the class page shows: enrolled students, assignments, and the
/// grade roster.
fn handle_classes_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let store = store(state)?;
    let class = store.get_class(&class_id)?;
    let students = store.list_class_students(&class_id)?;
    let assignments = store.list_assignments(&class_id)?;
    let roster = store.list_class_roster(&class_id)?;
    Ok(json!({
        "class": class,
        "students": students,
        "assignments": assignments,
        "roster": roster,
    }))
}

fn handle_classes_delete(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let deleted = store_mut(state)?.delete_class(&class_id)?;
    log::info!(
        "[{}] {} deleted class {} ({} grades, {} assignments, {} enrollments)",
        ctx.request_id,
        ctx.user,
        class_id,
        deleted.grades_removed,
        deleted.assignments_removed,
        deleted.enrollments_removed
    );
    Ok(json!(deleted))
}

fn handle_enroll_student(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let external_id = required_str(&req.params, "studentId")?;
    let enrollment = store_mut(state)?.enroll_student(&class_id, &external_id)?;
    log::info!(
        "[{}] {} enrolled student {} in class {} ({} grades)",
        ctx.request_id,
        ctx.user,
        enrollment.student_id,
        class_id,
        enrollment.grades_created
    );
    Ok(json!(enrollment))
}

fn handle_remove_student(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let student_id = required_str(&req.params, "studentId")?;
    let grades_removed = store_mut(state)?.remove_student(&class_id, &student_id)?;
    log::info!(
        "[{}] {} removed student {} from class {}",
        ctx.request_id,
        ctx.user,
        student_id,
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
        "classes.list" => handle_classes_list(state),
        "classes.create" => handle_classes_create(state, ctx, req),
        "classes.get" => handle_classes_get(state, req),
        "classes.delete" => handle_classes_delete(state, ctx, req),
        "classes.enrollStudent" => handle_enroll_student(state, ctx, req),
        "classes.removeStudent" => handle_remove_student(state, ctx, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
