use crate::ipc::error::ok;
use crate::ipc::helpers::{optional_str, required_str, store, store_mut, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestContext};
use crate::store::StudentFields;
use serde_json::json;

fn handle_students_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let students = store(state)?.list_students()?;
    Ok(json!({ "students": students }))
}

fn handle_students_create(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let fields = StudentFields {
        first_name: required_str(&req.params, "firstName")?,
        last_name: optional_str(&req.params, "lastName"),
        student_id: required_str(&req.params, "studentId")?,
        major: optional_str(&req.params, "major"),
        email: optional_str(&req.params, "email"),
    };
    let student = store_mut(state)?.add_student(&fields)?;
    log::info!("[{}] {} created student {}", ctx.request_id, ctx.user, student.id);
    Ok(json!({ "student": student }))
}

/// Absent keys keep the current value; `null` clears an optional column.
fn merge_optional(params: &serde_json::Value, key: &str, current: &mut Option<String>) {
    match params.get(key) {
        Some(serde_json::Value::Null) => *current = None,
        Some(v) => {
            if let Some(s) = v.as_str() {
                *current = Some(s.to_string());
            }
        }
        None => {}
    }
}

fn handle_students_update(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(&req.params, "id")?;
    let store = store_mut(state)?;
    let current = store.get_student(&id)?;

    let mut fields = StudentFields::from(&current);
    if let Some(first_name) = optional_str(&req.params, "firstName") {
        fields.first_name = first_name;
    }
    if let Some(student_id) = optional_str(&req.params, "studentId") {
        fields.student_id = student_id;
    }
    merge_optional(&req.params, "lastName", &mut fields.last_name);
    merge_optional(&req.params, "major", &mut fields.major);
    merge_optional(&req.params, "email", &mut fields.email);

    let student = store.update_student(&id, &fields)?;
    log::info!("[{}] {} updated student {}", ctx.request_id, ctx.user, id);
    Ok(json!({ "student": student }))
}

fn handle_students_delete(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(&req.params, "id")?;
    let grades_removed = store_mut(state)?.delete_student(&id)?;
    log::info!(
        "[{}] {} deleted student {} ({} grades)",
        ctx.request_id,
        ctx.user,
        id,
        grades_removed
    );
    Ok(json!({ "gradesRemoved": grades_removed }))
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state),
        "students.create" => handle_students_create(state, ctx, req),
        "students.update" => handle_students_update(state, ctx, req),
        "students.delete" => handle_students_delete(state, ctx, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
