//! Gradebook store: entity tables plus the grade-materialisation cascades.
//!
//! Every mutating method runs in a single transaction. Returning early with an
//! error drops the transaction, which rolls back everything written so far.

mod error;
mod model;

pub use error::{Entity, StoreError, StoreResult};
pub use model::{
    check_grade, Assignment, AssignmentAdded, Class, ClassDeletion, ClassSummary, Enrollment,
    Grade, IntegrityReport, RosterRow, Student, StudentFields, StudentGradeRow,
};

use crate::{auth, db};
use model::required;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

const STUDENT_COLUMNS: &str = "id, first_name, last_name, student_id, major, email";

pub struct GradebookStore {
    conn: Connection,
}

impl GradebookStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }

    // === Users ===

    pub fn register_user(&mut self, username: &str, password: &str) -> StoreResult<String> {
        let username = required("username", username)?;
        if password.is_empty() {
            return Err(StoreError::Invalid {
                field: "password",
                reason: "must not be empty",
            });
        }

        let password_hash =
            auth::hash_password(password).map_err(|e| StoreError::PasswordHash(e.to_string()))?;

        let tx = self.conn.transaction()?;
        let taken: Option<i64> = tx
            .query_row("SELECT 1 FROM users WHERE username = ?", [&username], |r| {
                r.get(0)
            })
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::DuplicateKey {
                entity: Entity::User,
                key: username,
            });
        }
        tx.execute(
            "INSERT INTO users(username, password_hash, created_at) VALUES(?, ?, ?)",
            (
                &username,
                &password_hash,
                chrono::Utc::now().to_rfc3339(),
            ),
        )?;
        tx.commit()?;
        Ok(username)
    }

    /// Unknown users and wrong passwords both verify as `false`.
    pub fn verify_user(&self, username: &str, password: &str) -> StoreResult<bool> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?",
                [username.trim()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored
            .map(|hash| auth::verify_password(password, &hash))
            .unwrap_or(false))
    }

    // === Students ===

    pub fn add_student(&mut self, fields: &StudentFields) -> StoreResult<Student> {
        let fields = fields.normalized()?;
        let tx = self.conn.transaction()?;
        if student_by_external_id(&tx, &fields.student_id)?.is_some() {
            return Err(StoreError::DuplicateKey {
                entity: Entity::Student,
                key: fields.student_id,
            });
        }

        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO students(id, first_name, last_name, student_id, major, email)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &id,
                &fields.first_name,
                fields.last_name.as_deref(),
                &fields.student_id,
                fields.major.as_deref(),
                fields.email.as_deref(),
            ),
        )?;
        let student = load_student(&tx, &id)?;
        tx.commit()?;
        Ok(student)
    }

    pub fn get_student(&self, id: &str) -> StoreResult<Student> {
        load_student(&self.conn, id)
    }

    pub fn list_students(&self) -> StoreResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             ORDER BY first_name, last_name, student_id"
        ))?;
        let students = stmt
            .query_map([], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    /// Replaces every editable column of the student.
    pub fn update_student(&mut self, id: &str, fields: &StudentFields) -> StoreResult<Student> {
        let fields = fields.normalized()?;
        let tx = self.conn.transaction()?;
        load_student(&tx, id)?;

        let clash: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM students WHERE student_id = ? AND id <> ?",
                (&fields.student_id, id),
                |r| r.get(0),
            )
            .optional()?;
        if clash.is_some() {
            return Err(StoreError::DuplicateKey {
                entity: Entity::Student,
                key: fields.student_id,
            });
        }

        tx.execute(
            "UPDATE students
             SET first_name = ?, last_name = ?, student_id = ?, major = ?, email = ?
             WHERE id = ?",
            (
                &fields.first_name,
                fields.last_name.as_deref(),
                &fields.student_id,
                fields.major.as_deref(),
                fields.email.as_deref(),
                id,
            ),
        )?;
        let student = load_student(&tx, id)?;
        tx.commit()?;
        Ok(student)
    }

    /// Deletes the student with every grade row and enrollment they own.
    /// Returns the number of grade rows removed.
    pub fn delete_student(&mut self, id: &str) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        load_student(&tx, id)?;

        let grades_removed = tx.execute("DELETE FROM grades WHERE student_id = ?", [id])?;
        tx.execute("DELETE FROM enrollments WHERE student_id = ?", [id])?;
        tx.execute("DELETE FROM students WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(grades_removed)
    }

    // === Classes ===

    pub fn add_class(&mut self, name: &str) -> StoreResult<Class> {
        let name = required("name", name)?;
        let tx = self.conn.transaction()?;
        let taken: Option<i64> = tx
            .query_row("SELECT 1 FROM classes WHERE name = ?", [&name], |r| r.get(0))
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::DuplicateKey {
                entity: Entity::Class,
                key: name,
            });
        }

        let id = Uuid::new_v4().to_string();
        tx.execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&id, &name))?;
        tx.commit()?;
        Ok(Class { id, name })
    }

    pub fn get_class(&self, id: &str) -> StoreResult<Class> {
        load_class(&self.conn, id)
    }

    pub fn list_classes(&self) -> StoreResult<Vec<ClassSummary>> {
        // Correlated subqueries avoid double-counting from joins.
        let mut stmt = self.conn.prepare(
            "SELECT
               c.id,
               c.name,
               (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id),
               (SELECT COUNT(*) FROM assignments a WHERE a.class_id = c.id)
             FROM classes c
             ORDER BY c.name",
        )?;
        let classes = stmt
            .query_map([], |row| {
                Ok(ClassSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    student_count: row.get(2)?,
                    assignment_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    /// Deletes grades, assignments and enrollments of the class, then the class.
    pub fn delete_class(&mut self, id: &str) -> StoreResult<ClassDeletion> {
        let tx = self.conn.transaction()?;
        load_class(&tx, id)?;

        // Dependency order; the schema has no ON DELETE CASCADE.
        let grades_removed = tx.execute("DELETE FROM grades WHERE class_id = ?", [id])?;
        let assignments_removed = tx.execute("DELETE FROM assignments WHERE class_id = ?", [id])?;
        let enrollments_removed = tx.execute("DELETE FROM enrollments WHERE class_id = ?", [id])?;
        tx.execute("DELETE FROM classes WHERE id = ?", [id])?;
        tx.commit()?;

        Ok(ClassDeletion {
            grades_removed,
            assignments_removed,
            enrollments_removed,
        })
    }

    pub fn list_class_students(&self, class_id: &str) -> StoreResult<Vec<Student>> {
        load_class(&self.conn, class_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.first_name, s.last_name, s.student_id, s.major, s.email
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.class_id = ?
             ORDER BY s.first_name, s.last_name, s.student_id",
        )?;
        let students = stmt
            .query_map([class_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    pub fn list_assignments(&self, class_id: &str) -> StoreResult<Vec<Assignment>> {
        load_class(&self.conn, class_id)?;
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, class_id FROM assignments WHERE class_id = ? ORDER BY name")?;
        let assignments = stmt
            .query_map([class_id], |row| {
                Ok(Assignment {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    class_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assignments)
    }

    // === Cascades ===

    /// Enrolls the student identified by `external_student_id` and creates a
    /// zero grade for every assignment the class already has.
    pub fn enroll_student(
        &mut self,
        class_id: &str,
        external_student_id: &str,
    ) -> StoreResult<Enrollment> {
        let tx = self.conn.transaction()?;
        load_class(&tx, class_id)?;
        let student_id = student_by_external_id(&tx, external_student_id.trim())?
            .ok_or(StoreError::NotFound(Entity::Student))?;
        if is_enrolled(&tx, class_id, &student_id)? {
            return Err(StoreError::AlreadyEnrolled);
        }

        tx.execute(
            "INSERT INTO enrollments(class_id, student_id) VALUES(?, ?)",
            (class_id, &student_id),
        )?;
        let assignment_ids = query_ids(
            &tx,
            "SELECT id FROM assignments WHERE class_id = ? ORDER BY name",
            class_id,
        )?;
        for assignment_id in &assignment_ids {
            insert_zero_grade(&tx, assignment_id, &student_id)?;
        }
        tx.commit()?;

        Ok(Enrollment {
            class_id: class_id.to_string(),
            student_id,
            grades_created: assignment_ids.len(),
        })
    }

    /// Removes the enrollment and every grade the student has in the class.
    /// Returns the number of grade rows removed.
    pub fn remove_student(&mut self, class_id: &str, student_id: &str) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        if !is_enrolled(&tx, class_id, student_id)? {
            return Err(StoreError::NotFound(Entity::Enrollment));
        }

        let grades_removed = tx.execute(
            "DELETE FROM grades WHERE class_id = ? AND student_id = ?",
            (class_id, student_id),
        )?;
        tx.execute(
            "DELETE FROM enrollments WHERE class_id = ? AND student_id = ?",
            (class_id, student_id),
        )?;
        tx.commit()?;
        Ok(grades_removed)
    }

    /// Assignment names are unique across all classes, not just this one.
    pub fn add_assignment(&mut self, class_id: &str, name: &str) -> StoreResult<AssignmentAdded> {
        let name = required("name", name)?;
        let tx = self.conn.transaction()?;
        load_class(&tx, class_id)?;

        let taken: Option<i64> = tx
            .query_row("SELECT 1 FROM assignments WHERE name = ?", [&name], |r| {
                r.get(0)
            })
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::DuplicateKey {
                entity: Entity::Assignment,
                key: name,
            });
        }

        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO assignments(id, name, class_id) VALUES(?, ?, ?)",
            (&id, &name, class_id),
        )?;
        let student_ids = query_ids(
            &tx,
            "SELECT student_id FROM enrollments WHERE class_id = ?",
            class_id,
        )?;
        for student_id in &student_ids {
            insert_zero_grade(&tx, &id, student_id)?;
        }
        tx.commit()?;

        Ok(AssignmentAdded {
            assignment: Assignment {
                id,
                name,
                class_id: class_id.to_string(),
            },
            grades_created: student_ids.len(),
        })
    }

    /// Deletes the assignment's grade rows, then the assignment. The
    /// assignment must belong to `class_id`.
    pub fn remove_assignment(&mut self, class_id: &str, assignment_id: &str) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let owner: Option<String> = tx
            .query_row(
                "SELECT class_id FROM assignments WHERE id = ?",
                [assignment_id],
                |r| r.get(0),
            )
            .optional()?;
        if owner.as_deref() != Some(class_id) {
            return Err(StoreError::NotFound(Entity::Assignment));
        }

        let grades_removed = tx.execute(
            "DELETE FROM grades WHERE class_id = ? AND assignment_id = ?",
            (class_id, assignment_id),
        )?;
        tx.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])?;
        tx.commit()?;
        Ok(grades_removed)
    }

    pub fn set_grade(&mut self, grade_id: &str, value: i64) -> StoreResult<Grade> {
        let value = check_grade(value)?;
        let tx = self.conn.transaction()?;
        let changed = tx.execute("UPDATE grades SET grade = ? WHERE id = ?", (value, grade_id))?;
        if changed == 0 {
            return Err(StoreError::NotFound(Entity::Grade));
        }
        let grade = tx.query_row(
            "SELECT id, grade, assignment_id, student_id, class_id FROM grades WHERE id = ?",
            [grade_id],
            |row| {
                Ok(Grade {
                    id: row.get(0)?,
                    grade: row.get(1)?,
                    assignment_id: row.get(2)?,
                    student_id: row.get(3)?,
                    class_id: row.get(4)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(grade)
    }

    // === Grade views ===

    pub fn list_class_roster(&self, class_id: &str) -> StoreResult<Vec<RosterRow>> {
        load_class(&self.conn, class_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.grade, a.id, a.name, s.id, s.student_id, s.first_name, s.last_name
             FROM grades g
             JOIN assignments a ON a.id = g.assignment_id
             JOIN students s ON s.id = g.student_id
             WHERE g.class_id = ?
             ORDER BY s.first_name, s.last_name, s.student_id, a.name",
        )?;
        let rows = stmt
            .query_map([class_id], |row| {
                Ok(RosterRow {
                    grade_id: row.get(0)?,
                    grade: row.get(1)?,
                    assignment_id: row.get(2)?,
                    assignment_name: row.get(3)?,
                    student_id: row.get(4)?,
                    student_external_id: row.get(5)?,
                    first_name: row.get(6)?,
                    last_name: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_student_grades(
        &self,
        class_id: &str,
        student_id: &str,
    ) -> StoreResult<Vec<StudentGradeRow>> {
        load_class(&self.conn, class_id)?;
        load_student(&self.conn, student_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.grade, a.id, a.name
             FROM grades g
             JOIN assignments a ON a.id = g.assignment_id
             WHERE g.class_id = ? AND g.student_id = ?
             ORDER BY a.name",
        )?;
        let rows = stmt
            .query_map((class_id, student_id), |row| {
                Ok(StudentGradeRow {
                    grade_id: row.get(0)?,
                    grade: row.get(1)?,
                    assignment_id: row.get(2)?,
                    assignment_name: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn integrity_report(&self) -> StoreResult<IntegrityReport> {
        let missing_grades: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM enrollments e
             JOIN assignments a ON a.class_id = e.class_id
             LEFT JOIN grades g ON g.assignment_id = a.id AND g.student_id = e.student_id
             WHERE g.id IS NULL",
            [],
            |r| r.get(0),
        )?;
        let orphaned_grades: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM grades g
             LEFT JOIN enrollments e ON e.class_id = g.class_id AND e.student_id = g.student_id
             WHERE e.class_id IS NULL",
            [],
            |r| r.get(0),
        )?;
        let class_mismatches: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM grades g
             LEFT JOIN assignments a ON a.id = g.assignment_id
             WHERE a.id IS NULL OR a.class_id <> g.class_id",
            [],
            |r| r.get(0),
        )?;
        Ok(IntegrityReport {
            missing_grades,
            orphaned_grades,
            class_mismatches,
        })
    }
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        student_id: row.get(3)?,
        major: row.get(4)?,
        email: row.get(5)?,
    })
}

fn load_student(conn: &Connection, id: &str) -> StoreResult<Student> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
        [id],
        student_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound(Entity::Student))
}

fn load_class(conn: &Connection, id: &str) -> StoreResult<Class> {
    conn.query_row("SELECT id, name FROM classes WHERE id = ?", [id], |row| {
        Ok(Class {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })
    .optional()?
    .ok_or(StoreError::NotFound(Entity::Class))
}

fn student_by_external_id(conn: &Connection, external_id: &str) -> StoreResult<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM students WHERE student_id = ?",
            [external_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn is_enrolled(conn: &Connection, class_id: &str, student_id: &str) -> StoreResult<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE class_id = ? AND student_id = ?",
            (class_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn query_ids(conn: &Connection, sql: &str, key: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([key], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// The grade's class is copied from its assignment in the same statement.
fn insert_zero_grade(conn: &Connection, assignment_id: &str, student_id: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO grades(id, grade, assignment_id, student_id, class_id)
         SELECT ?, 0, a.id, ?, a.class_id FROM assignments a WHERE a.id = ?",
        (Uuid::new_v4().to_string(), student_id, assignment_id),
    )?;
    Ok(())
}
