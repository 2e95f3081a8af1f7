use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{AccountKind, NewTrainee, Trainee, TraineeStats, TraineeUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Unique constraint hit; carries the offending field (`email`, `fullName`).
    #[error("this {0} is already registered")]
    Duplicate(&'static str),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(duplicate_field(db.constraint()))
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

pub(crate) fn duplicate_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(c) if c.contains("full_name") => "full name",
        _ => "email",
    }
}

/// Columns written on every upsert, plus the optional ones the source
/// supplied. `None` leaves the stored value as is on update.
#[derive(Debug, Clone, PartialEq)]
pub struct TraineeSet {
    pub full_name: String,
    pub school: String,
    pub interested_in_certification: bool,
    pub account_kind: AccountKind,
    pub courses_interested: Option<Vec<String>>,
    pub courses_other: Option<Vec<String>>,
    pub training_attended: Option<bool>,
    pub mobile_number: Option<String>,
    pub grade_teach: Option<String>,
    pub years_experience: Option<i32>,
    /// Rotates the credential of an existing record.
    pub password_hash: Option<String>,
}

/// Columns only written when the upsert inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct TraineeInsertOnly {
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

/// One update-or-insert keyed on the normalized email.
#[derive(Debug, Clone, PartialEq)]
pub struct TraineeUpsert {
    pub email: String,
    pub set: TraineeSet,
    pub on_insert: TraineeInsertOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the failed operation in the submitted batch.
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub write_errors: Vec<WriteError>,
}

#[async_trait]
pub trait TraineeStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Trainee>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Trainee>, StoreError>;

    async fn create(&self, new: NewTrainee) -> Result<Trainee, StoreError>;

    /// All records of one kind, newest first.
    async fn list(&self, kind: AccountKind) -> Result<Vec<Trainee>, StoreError>;

    async fn update(&self, id: Uuid, changes: TraineeUpdate) -> Result<Trainee, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn stats(&self) -> Result<TraineeStats, StoreError>;

    /// Trainees whose `courses_interested` contains `course`.
    async fn enrolled_in(&self, course: &str) -> Result<Vec<Trainee>, StoreError>;

    /// Unordered batch: a failing operation is reported in
    /// `write_errors` and does not stop the others. `Err` means the batch
    /// as a whole could not be applied.
    async fn bulk_upsert(&self, ops: &[TraineeUpsert]) -> Result<BulkWriteResult, StoreError>;
}
