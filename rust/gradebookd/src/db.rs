use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            username TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT,
            student_id TEXT NOT NULL UNIQUE,
            major TEXT,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            class_id TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            grade INTEGER NOT NULL,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class_student ON grades(class_id, student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    ensure_users_created_at(conn)?;
    ensure_students_contact_columns(conn)?;

    // grades.class_id duplicates assignments.class_id; these keep the two equal.
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS trg_grades_class_insert
         BEFORE INSERT ON grades
         FOR EACH ROW
         WHEN NEW.class_id IS NOT (SELECT class_id FROM assignments WHERE id = NEW.assignment_id)
         BEGIN
           SELECT RAISE(ABORT, 'grade class_id does not match assignment class_id');
         END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS trg_grades_class_update
         BEFORE UPDATE OF class_id, assignment_id ON grades
         FOR EACH ROW
         WHEN NEW.class_id IS NOT (SELECT class_id FROM assignments WHERE id = NEW.assignment_id)
         BEGIN
           SELECT RAISE(ABORT, 'grade class_id does not match assignment class_id');
         END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS trg_assignments_class_update
         BEFORE UPDATE OF class_id ON assignments
         FOR EACH ROW
         WHEN NEW.class_id IS NOT OLD.class_id
           AND EXISTS (SELECT 1 FROM grades WHERE assignment_id = NEW.id)
         BEGIN
           SELECT RAISE(ABORT, 'assignment with grades cannot move between classes');
         END",
        [],
    )?;

    Ok(())
}

// Workspaces written before accounts were timestamped.
fn ensure_users_created_at(conn: &Connection) -> rusqlite::Result<()> {
    if table_has_column(conn, "users", "created_at")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE users ADD COLUMN created_at TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    conn.execute(
        "UPDATE users SET created_at = ? WHERE created_at = ''",
        [chrono::Utc::now().to_rfc3339()],
    )?;
    log::info!("migrated users: added created_at");
    Ok(())
}

fn ensure_students_contact_columns(conn: &Connection) -> rusqlite::Result<()> {
    for column in ["major", "email"] {
        if !table_has_column(conn, "students", column)? {
            conn.execute(&format!("ALTER TABLE students ADD COLUMN {column} TEXT"), [])?;
            log::info!("migrated students: added {column}");
        }
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}
