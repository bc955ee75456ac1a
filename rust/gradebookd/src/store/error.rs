use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Student,
    Class,
    Assignment,
    Enrollment,
    Grade,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::User => write!(f, "user"),
            Entity::Student => write!(f, "student"),
            Entity::Class => write!(f, "class"),
            Entity::Assignment => write!(f, "assignment"),
            Entity::Enrollment => write!(f, "enrollment"),
            Entity::Grade => write!(f, "grade"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{entity} {key:?} already exists")]
    DuplicateKey { entity: Entity, key: String },

    #[error("student is already enrolled in this class")]
    AlreadyEnrolled,

    #[error("grade must be between {min} and {max}, got {value}")]
    InvalidGrade { value: i64, min: i64, max: i64 },

    #[error("{field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Stable error code reported over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::DuplicateKey { .. } => "duplicate_key",
            StoreError::AlreadyEnrolled => "already_enrolled",
            StoreError::InvalidGrade { .. } | StoreError::Invalid { .. } => "bad_params",
            StoreError::PasswordHash(_) => "internal_error",
            StoreError::Sqlite(_) => "db_error",
        }
    }

    pub fn entity(&self) -> Option<Entity> {
        match self {
            StoreError::NotFound(entity) | StoreError::DuplicateKey { entity, .. } => Some(*entity),
            StoreError::AlreadyEnrolled => Some(Entity::Enrollment),
            StoreError::InvalidGrade { .. } => Some(Entity::Grade),
            StoreError::Invalid { .. } | StoreError::PasswordHash(_) | StoreError::Sqlite(_) => {
                None
            }
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
