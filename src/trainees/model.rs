use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role stored in `trainees.account_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Trainee,
    Admin,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Trainee => "trainee",
            AccountKind::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trainee" => Some(AccountKind::Trainee),
            "admin" => Some(AccountKind::Admin),
            _ => None,
        }
    }
}

/// Trainee record as persisted.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Trainee {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub school: String,
    /// Empty when not given.
    pub mobile_number: String,
    pub grade_teach: String,
    pub years_experience: Option<i32>,
    pub training_attended: Option<bool>,
    pub courses_interested: Vec<String>,
    pub courses_other: Vec<String>,
    pub interested_in_certification: bool,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2, never exposed in JSON
    pub account_kind: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Trainee {
    pub fn kind(&self) -> Option<AccountKind> {
        AccountKind::parse(&self.account_kind)
    }

    pub fn is_admin(&self) -> bool {
        self.kind() == Some(AccountKind::Admin)
    }
}

/// Fields for a brand new record (sign-up, admin seeding).
#[derive(Debug, Clone)]
pub struct NewTrainee {
    pub email: String,
    pub full_name: String,
    pub school: String,
    pub mobile_number: String,
    pub grade_teach: String,
    pub years_experience: Option<i32>,
    pub training_attended: Option<bool>,
    pub courses_interested: Vec<String>,
    pub courses_other: Vec<String>,
    pub interested_in_certification: bool,
    pub password_hash: String,
    pub account_kind: AccountKind,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeUpdate {
    pub full_name: Option<String>,
    pub school: Option<String>,
    pub mobile_number: Option<String>,
    pub grade_teach: Option<String>,
    pub years_experience: Option<i32>,
    pub training_attended: Option<bool>,
    pub courses_interested: Option<Vec<String>>,
    pub courses_other: Option<Vec<String>>,
    pub interested_in_certification: Option<bool>,
}

impl TraineeUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.school.is_none()
            && self.mobile_number.is_none()
            && self.grade_teach.is_none()
            && self.years_experience.is_none()
            && self.training_attended.is_none()
            && self.courses_interested.is_none()
            && self.courses_other.is_none()
            && self.interested_in_certification.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificationSplit {
    pub yes: i64,
    pub no: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct CourseCount {
    pub course: String,
    pub count: i64,
}

/// Dashboard aggregates over trainee accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeStats {
    pub total_users: i64,
    pub cert: CertificationSplit,
    pub courses: Vec<CourseCount>,
}
