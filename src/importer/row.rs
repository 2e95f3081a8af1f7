use csv::StringRecord;
use time::OffsetDateTime;

use super::columns::{Cell, Column, Header};
use super::parse::{parse_bool, parse_created_at, parse_number, split_list, Parsed};
use crate::auth::services::is_valid_email;
use crate::trainees::{store::TraineeSet, AccountKind};

pub const MAX_COURSES: usize = 10;

/// A row that passed validation, waiting for its credential hash.
#[derive(Debug, Clone)]
pub struct ValidRow {
    pub line: u64,
    pub email: String,
    pub set: TraineeSet,
    /// Non-empty plaintext from the `password` column.
    pub password: Option<String>,
    pub created_at: Option<OffsetDateTime>,
}

fn optional_bool(cell: Cell<'_>, column: Column) -> Result<Option<bool>, String> {
    match cell.value().map(parse_bool) {
        None => Ok(None),
        Some(Parsed::Value(b)) => Ok(Some(b)),
        Some(Parsed::Invalid) => Err(format!(
            "{} must be true/false/yes/no/1/0",
            column.name()
        )),
    }
}

fn optional_years(cell: Cell<'_>) -> Result<Option<i32>, String> {
    let Some(raw) = cell.value() else {
        return Ok(None);
    };
    match parse_number(raw) {
        Parsed::Invalid => Err("yearsExperience must contain a number".into()),
        Parsed::Value(n) if n < 0.0 => Err("yearsExperience must not be negative".into()),
        Parsed::Value(n) if n > f64::from(i32::MAX) => Err("yearsExperience is too large".into()),
        Parsed::Value(n) => Ok(Some(n.trunc() as i32)),
    }
}

fn optional_list(cell: Cell<'_>, column: Column) -> Result<Option<Vec<String>>, String> {
    let list = match cell {
        Cell::Absent => return Ok(None),
        Cell::Empty => Vec::new(),
        Cell::Value(v) => split_list(v),
    };
    if list.len() > MAX_COURSES {
        return Err(format!(
            "{} has too many entries (max {MAX_COURSES})",
            column.name()
        ));
    }
    Ok(Some(list))
}

fn optional_text(cell: Cell<'_>) -> Option<String> {
    match cell {
        Cell::Absent => None,
        other => Some(other.text().to_string()),
    }
}

/// Validates one CSV row and turns it into the fields of an upsert.
/// Stops at the first violation.
pub fn validate_row(header: &Header, record: &StringRecord, line: u64) -> Result<ValidRow, String> {
    let cell = |c: Column| header.cell(record, c);

    let email = cell(Column::Email).text().to_lowercase();
    if !is_valid_email(&email) {
        return Err("email is required and must be valid".into());
    }

    let full_name = cell(Column::FullName).text().to_string();
    if full_name.is_empty() {
        return Err("fullName is required".into());
    }

    let school = cell(Column::School).text().to_string();
    if school.is_empty() {
        return Err("school is required".into());
    }

    let interested_in_certification = match parse_bool(cell(Column::InterestedInCertification).text()) {
        Parsed::Value(b) => b,
        Parsed::Invalid => {
            return Err("interestedInCertification must be true/false/yes/no/1/0".into())
        }
    };

    let training_attended = optional_bool(cell(Column::TrainingAttended), Column::TrainingAttended)?;
    let years_experience = optional_years(cell(Column::YearsExperience))?;

    let created_at = match cell(Column::CreatedAt).value().map(parse_created_at) {
        None => None,
        Some(Parsed::Value(dt)) => Some(dt),
        Some(Parsed::Invalid) => return Err("createdAt is not a recognised date".into()),
    };

    let courses_interested = optional_list(cell(Column::CoursesInterested), Column::CoursesInterested)?;
    let courses_other = optional_list(cell(Column::CoursesOther), Column::CoursesOther)?;

    Ok(ValidRow {
        line,
        email,
        set: TraineeSet {
            full_name,
            school,
            interested_in_certification,
            account_kind: AccountKind::Trainee,
            courses_interested,
            courses_other,
            training_attended,
            mobile_number: optional_text(cell(Column::MobileNumber)),
            grade_teach: optional_text(cell(Column::GradeTeach)),
            years_experience,
            password_hash: None,
        },
        password: cell(Column::Password).value().map(str::to_string),
        created_at,
    })
}
