use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_gradebookd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_remove("GRADEBOOK_WORKSPACE")
            .spawn()
            .expect("spawn gradebookd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"]
            .as_str()
            .expect("error code")
            .to_string()
    }

    fn login_fresh_workspace(&mut self, workspace: &PathBuf) {
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        self.ok(
            "auth.register",
            json!({ "username": "instructor", "password": "pw" }),
        );
        self.ok(
            "auth.login",
            json!({ "username": "instructor", "password": "pw" }),
        );
    }

    fn create_student(&mut self, first: &str, ext: &str) -> String {
        let res = self.ok(
            "students.create",
            json!({ "firstName": first, "studentId": ext }),
        );
        res["student"]["id"].as_str().expect("student id").to_string()
    }

    fn assert_consistent(&mut self) {
        let res = self.ok("workspace.integrity", json!({}));
        assert_eq!(res["consistent"], json!(true), "integrity: {}", res);
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn rows(value: &serde_json::Value, key: &str) -> Vec<serde_json::Value> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

#[test]
fn math101_scenario_end_to_end() {
    let workspace = temp_dir("gradebook-math101");
    let mut sc = Sidecar::spawn();
    sc.login_fresh_workspace(&workspace);

    let class = sc.ok("classes.create", json!({ "name": "Math101" }));
    let class_id = class["class"]["id"].as_str().expect("class id").to_string();
    let hw1 = sc.ok(
        "assignments.create",
        json!({ "classId": class_id, "name": "HW1" }),
    );
    assert_eq!(hw1["gradesCreated"], json!(0));

    let s001 = sc.create_student("Ada", "S001");
    let enrolled = sc.ok(
        "classes.enrollStudent",
        json!({ "classId": class_id, "studentId": "S001" }),
    );
    assert_eq!(enrolled["studentId"], json!(s001));
    assert_eq!(enrolled["gradesCreated"], json!(1));

    let roster = rows(
        &sc.ok("grades.roster", json!({ "classId": class_id })),
        "rows",
    );
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["grade"], json!(0));
    assert_eq!(roster[0]["assignmentName"], json!("HW1"));
    assert_eq!(roster[0]["studentExternalId"], json!("S001"));
    let grade_id = roster[0]["gradeId"].as_str().expect("grade id").to_string();

    let set = sc.ok("grades.set", json!({ "gradeId": grade_id, "grade": 95 }));
    assert_eq!(set["grade"]["grade"], json!(95));
    assert_eq!(set["grade"]["classId"], json!(class_id));

    let student_view = sc.ok(
        "grades.student",
        json!({ "classId": class_id, "studentId": s001 }),
    );
    assert_eq!(student_view["student"]["studentId"], json!("S001"));
    let grades = rows(&student_view, "rows");
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0]["assignmentName"], json!("HW1"));
    assert_eq!(grades[0]["grade"], json!(95));

    // Form posts send text; integer strings are accepted, out-of-range is not.
    sc.ok("grades.set", json!({ "gradeId": grade_id, "grade": "88" }));
    assert_eq!(
        sc.err_code("grades.set", json!({ "gradeId": grade_id, "grade": 101 })),
        "bad_params"
    );
    assert_eq!(
        sc.err_code("grades.set", json!({ "gradeId": grade_id, "grade": "A+" })),
        "bad_params"
    );
    assert_eq!(
        sc.err_code("grades.set", json!({ "gradeId": "missing", "grade": 10 })),
        "not_found"
    );

    sc.ok("students.delete", json!({ "id": s001 }));
    let roster = rows(
        &sc.ok("grades.roster", json!({ "classId": class_id })),
        "rows",
    );
    assert!(roster.iter().all(|r| r["studentId"] != json!(s001)));
    assert!(roster.is_empty());
    sc.assert_consistent();

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn enrollment_and_assignment_cascades() {
    let workspace = temp_dir("gradebook-cascades");
    let mut sc = Sidecar::spawn();
    sc.login_fresh_workspace(&workspace);

    let c1 = sc.ok("classes.create", json!({ "name": "C1" }))["class"]["id"]
        .as_str()
        .expect("c1")
        .to_string();
    let c2 = sc.ok("classes.create", json!({ "name": "C2" }))["class"]["id"]
        .as_str()
        .expect("c2")
        .to_string();
    assert_eq!(
        sc.err_code("classes.create", json!({ "name": "C1" })),
        "duplicate_key"
    );

    let ada = sc.create_student("Ada", "S001");
    let bob = sc.create_student("Bob", "S002");
    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "firstName": "Eve", "studentId": "S001" })
        ),
        "duplicate_key"
    );

    sc.ok(
        "assignments.create",
        json!({ "classId": c1, "name": "HW1" }),
    );
    sc.ok(
        "assignments.create",
        json!({ "classId": c1, "name": "HW2" }),
    );
    let enrolled = sc.ok(
        "classes.enrollStudent",
        json!({ "classId": c1, "studentId": "S001" }),
    );
    assert_eq!(enrolled["gradesCreated"], json!(2));
    assert_eq!(
        sc.err_code(
            "classes.enrollStudent",
            json!({ "classId": c1, "studentId": "S001" })
        ),
        "already_enrolled"
    );
    assert_eq!(
        sc.err_code(
            "classes.enrollStudent",
            json!({ "classId": c1, "studentId": "S999" })
        ),
        "not_found"
    );
    sc.ok(
        "classes.enrollStudent",
        json!({ "classId": c1, "studentId": "S002" }),
    );

    let quiz = sc.ok(
        "assignments.create",
        json!({ "classId": c1, "name": "Quiz1" }),
    );
    assert_eq!(quiz["gradesCreated"], json!(2));
    let quiz_id = quiz["assignment"]["id"].as_str().expect("quiz id").to_string();
    assert_eq!(
        sc.err_code(
            "assignments.create",
            json!({ "classId": c2, "name": "Quiz1" })
        ),
        "duplicate_key"
    );

    let view = sc.ok("classes.get", json!({ "classId": c1 }));
    assert_eq!(rows(&view, "students").len(), 2);
    assert_eq!(rows(&view, "assignments").len(), 3);
    assert_eq!(rows(&view, "roster").len(), 6);
    sc.assert_consistent();

    let removed = sc.ok(
        "classes.removeStudent",
        json!({ "classId": c1, "studentId": bob }),
    );
    assert_eq!(removed["gradesRemoved"], json!(3));
    assert_eq!(
        sc.err_code(
            "classes.removeStudent",
            json!({ "classId": c1, "studentId": bob })
        ),
        "not_found"
    );

    assert_eq!(
        sc.err_code(
            "assignments.delete",
            json!({ "classId": c2, "assignmentId": quiz_id })
        ),
        "not_found"
    );
    let removed = sc.ok(
        "assignments.delete",
        json!({ "classId": c1, "assignmentId": quiz_id }),
    );
    assert_eq!(removed["gradesRemoved"], json!(1));
    let assignments = rows(
        &sc.ok("assignments.list", json!({ "classId": c1 })),
        "assignments",
    );
    assert_eq!(assignments.len(), 2);

    let roster = rows(&sc.ok("grades.roster", json!({ "classId": c1 })), "rows");
    assert_eq!(roster.len(), 2);
    assert!(roster.iter().all(|r| r["studentId"] == json!(ada)));
    sc.assert_consistent();

    let classes = rows(&sc.ok("classes.list", json!({})), "classes");
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0]["name"], json!("C1"));
    assert_eq!(classes[0]["studentCount"], json!(1));
    assert_eq!(classes[0]["assignmentCount"], json!(2));

    let deleted = sc.ok("classes.delete", json!({ "classId": c1 }));
    assert_eq!(deleted["gradesRemoved"], json!(2));
    assert_eq!(
        sc.err_code("classes.get", json!({ "classId": c1 })),
        "not_found"
    );
    sc.assert_consistent();

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn student_update_merges_fields() {
    let workspace = temp_dir("gradebook-student-update");
    let mut sc = Sidecar::spawn();
    sc.login_fresh_workspace(&workspace);

    let created = sc.ok(
        "students.create",
        json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "studentId": "S001",
            "major": "Mathematics",
            "email": "ada@example.edu"
        }),
    );
    let id = created["student"]["id"].as_str().expect("id").to_string();
    sc.create_student("Bob", "S002");

    let updated = sc.ok(
        "students.update",
        json!({ "id": id, "firstName": "Augusta", "major": null }),
    );
    assert_eq!(updated["student"]["firstName"], json!("Augusta"));
    assert_eq!(updated["student"]["lastName"], json!("Lovelace"));
    assert_eq!(updated["student"]["major"], json!(null));
    assert_eq!(updated["student"]["email"], json!("ada@example.edu"));

    assert_eq!(
        sc.err_code("students.update", json!({ "id": id, "studentId": "S002" })),
        "duplicate_key"
    );
    assert_eq!(
        sc.err_code("students.update", json!({ "id": id, "firstName": "  " })),
        "bad_params"
    );
    assert_eq!(
        sc.err_code("students.update", json!({ "id": "missing" })),
        "not_found"
    );

    let students = rows(&sc.ok("students.list", json!({})), "students");
    let names: Vec<&str> = students
        .iter()
        .filter_map(|s| s["firstName"].as_str())
        .collect();
    assert_eq!(names, vec!["Augusta", "Bob"]);

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn data_persists_across_restarts_but_session_does_not() {
    let workspace = temp_dir("gradebook-persist");
    {
        let mut sc = Sidecar::spawn();
        sc.login_fresh_workspace(&workspace);
        sc.ok("classes.create", json!({ "name": "Math101" }));
    }

    let mut sc = Sidecar::spawn();
    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(sc.err_code("classes.list", json!({})), "unauthenticated");
    sc.ok(
        "auth.login",
        json!({ "username": "instructor", "password": "pw" }),
    );
    let classes = rows(&sc.ok("classes.list", json!({})), "classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["name"], json!("Math101"));

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backup_restore_brings_back_grades_and_ends_session() {
    let workspace = temp_dir("gradebook-restore");
    let bundle = workspace.join("backups").join("before.gbbackup.zip");
    let mut sc = Sidecar::spawn();
    sc.login_fresh_workspace(&workspace);

    let class_id = sc.ok("classes.create", json!({ "name": "Math101" }))["class"]["id"]
        .as_str()
        .expect("class id")
        .to_string();
    sc.ok(
        "assignments.create",
        json!({ "classId": class_id, "name": "HW1" }),
    );
    sc.create_student("Ada", "S001");
    sc.ok(
        "classes.enrollStudent",
        json!({ "classId": class_id, "studentId": "S001" }),
    );

    let export = sc.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], json!("gradebook-workspace-v1"));
    assert_eq!(export["counts"]["classes"], json!(1));

    sc.ok("classes.delete", json!({ "classId": class_id }));
    let restored = sc.ok(
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        restored["bundleFormatDetected"],
        json!("gradebook-workspace-v1")
    );
    assert_eq!(restored["restored"]["grades"], json!(1));

    assert_eq!(
        sc.err_code("grades.roster", json!({ "classId": class_id })),
        "unauthenticated"
    );
    sc.ok(
        "auth.login",
        json!({ "username": "instructor", "password": "pw" }),
    );
    let roster = rows(
        &sc.ok("grades.roster", json!({ "classId": class_id })),
        "rows",
    );
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["assignmentName"], json!("HW1"));
    sc.assert_consistent();

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rejected_restore_keeps_workspace_and_ends_session() {
    let workspace = temp_dir("gradebook-bad-restore");
    let notes = workspace.join("notes.txt");
    std::fs::write(&notes, "this is not a database").expect("write notes");
    let mut sc = Sidecar::spawn();
    sc.login_fresh_workspace(&workspace);
    sc.ok("classes.create", json!({ "name": "Math101" }));

    assert_eq!(
        sc.err_code(
            "backup.importWorkspaceBundle",
            json!({ "inPath": notes.to_string_lossy() }),
        ),
        "io_failed"
    );
    assert_eq!(sc.err_code("classes.list", json!({})), "unauthenticated");

    sc.ok(
        "auth.login",
        json!({ "username": "instructor", "password": "pw" }),
    );
    let classes = rows(&sc.ok("classes.list", json!({})), "classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["name"], json!("Math101"));

    // Still selectable after the failed restore.
    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(!workspace.join("gradebook.sqlite3.restore").exists());

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}
