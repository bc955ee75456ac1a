use crate::ipc::error::ok;
use crate::ipc::helpers::{required_i64, required_str, store, store_mut, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestContext};
use serde_json::json;

fn handle_grades_roster(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let rows = store(state)?.list_class_roster(&class_id)?;
    Ok(json!({ "rows": rows }))
}

fn handle_grades_student(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(&req.params, "classId")?;
    let student_id = required_str(&req.params, "studentId")?;
    let store = store(state)?;
    let rows = store.list_student_grades(&class_id, &student_id)?;
    let student = store.get_student(&student_id)?;
    Ok(json!({ "student": student, "rows": rows }))
}

fn handle_grades_set(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let grade_id = required_str(&req.params, "gradeId")?;
    let value = required_i64(&req.params, "grade")?;
    let grade = store_mut(state)?.set_grade(&grade_id, value)?;
    log::info!(
        "[{}] {} set grade {} to {}",
        ctx.request_id,
        ctx.user,
        grade.id,
        grade.grade
    );
    Ok(json!({ "grade": grade }))
}

pub fn try_handle(
    state: &mut AppState,
    ctx: &RequestContext,
    req: &Request,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.roster" => handle_grades_roster(state, req),
        "grades.student" => handle_grades_student(state, req),
        "grades.set" => handle_grades_set(state, ctx, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
