use serde::Serialize;

use super::error::{StoreError, StoreResult};

pub const GRADE_MIN: i64 = 0;
pub const GRADE_MAX: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    /// External identifier, distinct from `id`.
    pub student_id: String,
    pub major: Option<String>,
    pub email: Option<String>,
}

/// Editable student columns, used for both create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFields {
    pub first_name: String,
    pub last_name: Option<String>,
    pub student_id: String,
    pub major: Option<String>,
    pub email: Option<String>,
}

impl StudentFields {
    #[cfg(test)]
    pub fn new(first_name: impl Into<String>, student_id: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            student_id: student_id.into(),
            ..Self::default()
        }
    }

    /// Trims every column and turns blank optionals into `None`.
    pub fn normalized(&self) -> StoreResult<StudentFields> {
        Ok(StudentFields {
            first_name: required("firstName", &self.first_name)?,
            last_name: optional(self.last_name.as_deref()),
            student_id: required("studentId", &self.student_id)?,
            major: optional(self.major.as_deref()),
            email: optional(self.email.as_deref()),
        })
    }
}

impl From<&Student> for StudentFields {
    fn from(s: &Student) -> Self {
        Self {
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            student_id: s.student_id.clone(),
            major: s.major.clone(),
            email: s.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: String,
    pub name: String,
    pub student_count: i64,
    pub assignment_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDeletion {
    pub grades_removed: usize,
    pub assignments_removed: usize,
    pub enrollments_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub name: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentAdded {
    pub assignment: Assignment,
    pub grades_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub class_id: String,
    /// Surrogate id of the enrolled student.
    pub student_id: String,
    pub grades_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub grade: i64,
    pub assignment_id: String,
    pub student_id: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub grade_id: String,
    pub grade: i64,
    pub assignment_id: String,
    pub assignment_name: String,
    pub student_id: String,
    pub student_external_id: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradeRow {
    pub grade_id: String,
    pub grade: i64,
    pub assignment_id: String,
    pub assignment_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Enrolled (student, assignment) pairs without a grade row.
    pub missing_grades: i64,
    /// Grade rows whose student is not enrolled in the grade's class.
    pub orphaned_grades: i64,
    /// Grade rows whose class differs from their assignment's class.
    pub class_mismatches: i64,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_grades == 0 && self.orphaned_grades == 0 && self.class_mismatches == 0
    }
}

pub fn check_grade(value: i64) -> StoreResult<i64> {
    if !(GRADE_MIN..=GRADE_MAX).contains(&value) {
        return Err(StoreError::InvalidGrade {
            value,
            min: GRADE_MIN,
            max: GRADE_MAX,
        });
    }
    Ok(value)
}

pub(crate) fn required(field: &'static str, value: &str) -> StoreResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(StoreError::Invalid {
            field,
            reason: "must not be empty",
        });
    }
    Ok(v.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .and_then(|s| if s.is_empty() { None } else { Some(s) })
}
