use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use super::{dto::SignupRequest, password};
use crate::{
    config::AdminSeed,
    error::ApiError,
    importer::{normalize_email, normalize_token, MAX_COURSES},
    trainees::{AccountKind, NewTrainee, StoreError, TraineeStore, TraineeUpdate},
};

const MAX_NAME_LEN: usize = 100;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^\S+@\S+\.\S+$").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z\s]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn bad(msg: &str) -> ApiError {
    ApiError::BadRequest(msg.to_string())
}

fn full_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(bad("Full name is required."));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(bad("Full name must be 100 characters or fewer."));
    }
    if !NAME_RE.is_match(name) {
        return Err(bad("Full name may only contain letters and spaces."));
    }
    Ok(name.to_string())
}

fn school(raw: &str) -> Result<String, ApiError> {
    let school = raw.trim();
    if school.is_empty() {
        return Err(bad("School / Institution is required."));
    }
    if school.chars().count() > MAX_NAME_LEN {
        return Err(bad("School / Institution must be 100 characters or fewer."));
    }
    Ok(school.to_string())
}

fn course_list(raw: Vec<String>, field: &str) -> Result<Vec<String>, ApiError> {
    if raw.len() > MAX_COURSES {
        return Err(ApiError::BadRequest(format!("Invalid {field} value.")));
    }
    Ok(raw
        .iter()
        .map(|c| normalize_token(c))
        .filter(|c| !c.is_empty())
        .collect())
}

fn years(raw: Option<i32>) -> Result<Option<i32>, ApiError> {
    match raw {
        Some(n) if n < 0 => Err(bad("Years of experience cannot be negative.")),
        other => Ok(other),
    }
}

fn trimmed_or_empty(raw: Option<String>) -> String {
    raw.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Validates a sign-up request and hashes its password.
pub fn new_trainee_from_signup(req: SignupRequest) -> Result<NewTrainee, ApiError> {
    let full_name = full_name(&req.full_name)?;
    let school = school(&req.school)?;

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(bad("A valid email address is required."));
    }

    if req.password.is_empty() {
        return Err(bad("Password is required."));
    }
    password::check_strength(&req.password).map_err(bad)?;

    let courses_interested = course_list(req.courses_interested, "coursesInterested")?;
    let courses_other = course_list(req.courses_other, "coursesOther")?;
    let years_experience = years(req.years_experience)?;

    let password_hash = password::hash_password(&req.password).map_err(ApiError::internal)?;

    Ok(NewTrainee {
        email,
        full_name,
        school,
        mobile_number: trimmed_or_empty(req.mobile_number),
        grade_teach: trimmed_or_empty(req.grade_teach),
        years_experience,
        training_attended: Some(req.training_attended == Some(true)),
        courses_interested,
        courses_other,
        interested_in_certification: req.interested_in_certification,
        password_hash,
        account_kind: AccountKind::Trainee,
    })
}

/// Applies the sign-up field rules to a partial profile edit.
pub fn validate_update(mut changes: TraineeUpdate) -> Result<TraineeUpdate, ApiError> {
    if changes.is_empty() {
        return Err(bad("Nothing to update."));
    }
    if let Some(n) = changes.full_name.take() {
        changes.full_name = Some(full_name(&n)?);
    }
    if let Some(s) = changes.school.take() {
        changes.school = Some(school(&s)?);
    }
    if let Some(list) = changes.courses_interested.take() {
        changes.courses_interested = Some(course_list(list, "coursesInterested")?);
    }
    if let Some(list) = changes.courses_other.take() {
        changes.courses_other = Some(course_list(list, "coursesOther")?);
    }
    changes.mobile_number = changes.mobile_number.map(|m| m.trim().to_string());
    changes.grade_teach = changes.grade_teach.map(|g| g.trim().to_string());
    changes.years_experience = years(changes.years_experience)?;
    Ok(changes)
}

/// Creates the configured admin account unless one with that email exists.
pub async fn seed_admin(store: &dyn TraineeStore, seed: &AdminSeed) -> anyhow::Result<()> {
    let email = normalize_email(&seed.email);
    if store.find_by_email(&email).await?.is_some() {
        info!(%email, "admin already exists");
        return Ok(());
    }
    let password_hash = password::hash_password(&seed.password)?;
    let admin = NewTrainee {
        email: email.clone(),
        full_name: "Admin".into(),
        school: "N/A".into(),
        mobile_number: String::new(),
        grade_teach: String::new(),
        years_experience: None,
        training_attended: None,
        courses_interested: vec![],
        courses_other: vec![],
        interested_in_certification: false,
        password_hash,
        account_kind: AccountKind::Admin,
    };
    match store.create(admin).await {
        Ok(_) => info!(%email, "admin created"),
        Err(StoreError::Duplicate(field)) => {
            anyhow::bail!("cannot seed admin {email}: {field} already taken")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
