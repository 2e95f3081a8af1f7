use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{
    AccountKind, CertificationSplit, CourseCount, NewTrainee, Trainee, TraineeStats,
    TraineeUpdate,
};
use super::store::{
    BulkWriteResult, StoreError, TraineeStore, TraineeUpsert, WriteError,
};

/// Process-local store with the same uniqueness and modify semantics as
/// the Postgres one.
#[derive(Default)]
pub struct InMemoryTraineeStore {
    rows: RwLock<Vec<Trainee>>,
}

impl InMemoryTraineeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_unique(
    rows: &[Trainee],
    skip: Option<Uuid>,
    email: Option<&str>,
    full_name: Option<&str>,
) -> Result<(), StoreError> {
    for r in rows.iter().filter(|r| Some(r.id) != skip) {
        if email.is_some_and(|e| r.email == e) {
            return Err(StoreError::Duplicate("email"));
        }
        if full_name.is_some_and(|n| r.full_name == n) {
            return Err(StoreError::Duplicate("full name"));
        }
    }
    Ok(())
}

fn assign<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Applies the set-group of an upsert; returns whether anything changed.
fn apply_set(row: &mut Trainee, op: &TraineeUpsert) -> bool {
    let s = &op.set;
    let mut changed = false;
    changed |= assign(&mut row.full_name, s.full_name.clone());
    changed |= assign(&mut row.school, s.school.clone());
    changed |= assign(&mut row.interested_in_certification, s.interested_in_certification);
    changed |= assign(&mut row.account_kind, s.account_kind.as_str().to_string());
    if let Some(v) = &s.courses_interested {
        changed |= assign(&mut row.courses_interested, v.clone());
    }
    if let Some(v) = &s.courses_other {
        changed |= assign(&mut row.courses_other, v.clone());
    }
    if let Some(v) = s.training_attended {
        changed |= assign(&mut row.training_attended, Some(v));
    }
    if let Some(v) = &s.mobile_number {
        changed |= assign(&mut row.mobile_number, v.clone());
    }
    if let Some(v) = &s.grade_teach {
        changed |= assign(&mut row.grade_teach, v.clone());
    }
    if let Some(v) = s.years_experience {
        changed |= assign(&mut row.years_experience, Some(v));
    }
    if let Some(v) = &s.password_hash {
        changed |= assign(&mut row.password_hash, v.clone());
    }
    changed
}

fn insert_row(op: &TraineeUpsert) -> Trainee {
    let s = &op.set;
    Trainee {
        id: Uuid::new_v4(),
        email: op.email.clone(),
        full_name: s.full_name.clone(),
        school: s.school.clone(),
        mobile_number: s.mobile_number.clone().unwrap_or_default(),
        grade_teach: s.grade_teach.clone().unwrap_or_default(),
        years_experience: s.years_experience,
        training_attended: s.training_attended,
        courses_interested: s.courses_interested.clone().unwrap_or_default(),
        courses_other: s.courses_other.clone().unwrap_or_default(),
        interested_in_certification: s.interested_in_certification,
        password_hash: s
            .password_hash
            .clone()
            .unwrap_or_else(|| op.on_insert.password_hash.clone()),
        account_kind: s.account_kind.as_str().to_string(),
        created_at: op.on_insert.created_at,
    }
}

fn newest_first(mut rows: Vec<Trainee>) -> Vec<Trainee> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl TraineeStore for InMemoryTraineeStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Trainee>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| r.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Trainee>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn create(&self, new: NewTrainee) -> Result<Trainee, StoreError> {
        let mut rows = self.rows.write().await;
        check_unique(&rows, None, Some(&new.email), Some(&new.full_name))?;
        let row = Trainee {
            id: Uuid::new_v4(),
            email: new.email,
            full_name: new.full_name,
            school: new.school,
            mobile_number: new.mobile_number,
            grade_teach: new.grade_teach,
            years_experience: new.years_experience,
            training_attended: new.training_attended,
            courses_interested: new.courses_interested,
            courses_other: new.courses_other,
            interested_in_certification: new.interested_in_certification,
            password_hash: new.password_hash,
            account_kind: new.account_kind.as_str().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn list(&self, kind: AccountKind) -> Result<Vec<Trainee>, StoreError> {
        let rows = self.rows.read().await;
        let out = rows
            .iter()
            .filter(|r| r.kind() == Some(kind))
            .cloned()
            .collect();
        Ok(newest_first(out))
    }

    async fn update(&self, id: Uuid, changes: TraineeUpdate) -> Result<Trainee, StoreError> {
        let mut rows = self.rows.write().await;
        let idx = rows
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        check_unique(&rows, Some(id), None, changes.full_name.as_deref())?;
        let row = &mut rows[idx];

        if let Some(v) = changes.full_name {
            row.full_name = v;
        }
        if let Some(v) = changes.school {
            row.school = v;
        }
        if let Some(v) = changes.mobile_number {
            row.mobile_number = v;
        }
        if let Some(v) = changes.grade_teach {
            row.grade_teach = v;
        }
        if let Some(v) = changes.years_experience {
            row.years_experience = Some(v);
        }
        if let Some(v) = changes.training_attended {
            row.training_attended = Some(v);
        }
        if let Some(v) = changes.courses_interested {
            row.courses_interested = v;
        }
        if let Some(v) = changes.courses_other {
            row.courses_other = v;
        }
        if let Some(v) = changes.interested_in_certification {
            row.interested_in_certification = v;
        }
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }

    async fn stats(&self) -> Result<TraineeStats, StoreError> {
        let rows = self.rows.read().await;
        let trainees: Vec<&Trainee> = rows
            .iter()
            .filter(|r| r.kind() == Some(AccountKind::Trainee))
            .collect();

        let mut per_course: BTreeMap<&str, i64> = BTreeMap::new();
        for t in &trainees {
            for c in &t.courses_interested {
                *per_course.entry(c.as_str()).or_default() += 1;
            }
        }
        let mut courses: Vec<CourseCount> = per_course
            .into_iter()
            .map(|(course, count)| CourseCount {
                course: course.to_string(),
                count,
            })
            .collect();
        courses.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.course.cmp(&b.course)));

        let yes = trainees.iter().filter(|t| t.interested_in_certification).count() as i64;
        Ok(TraineeStats {
            total_users: trainees.len() as i64,
            cert: CertificationSplit {
                yes,
                no: trainees.len() as i64 - yes,
            },
            courses,
        })
    }

    async fn enrolled_in(&self, course: &str) -> Result<Vec<Trainee>, StoreError> {
        let rows = self.rows.read().await;
        let out = rows
            .iter()
            .filter(|r| r.kind() == Some(AccountKind::Trainee))
            .filter(|r| r.courses_interested.iter().any(|c| c == course))
            .cloned()
            .collect();
        Ok(newest_first(out))
    }

    async fn bulk_upsert(&self, ops: &[TraineeUpsert]) -> Result<BulkWriteResult, StoreError> {
        let mut rows = self.rows.write().await;
        let mut result = BulkWriteResult::default();

        for (index, op) in ops.iter().enumerate() {
            let existing = rows.iter().position(|r| r.email == op.email);
            let skip = existing.map(|i| rows[i].id);
            if let Err(e) = check_unique(&rows, skip, None, Some(&op.set.full_name)) {
                result.write_errors.push(WriteError {
                    index,
                    message: e.to_string(),
                });
                continue;
            }
            match existing {
                Some(i) => {
                    result.matched += 1;
                    if apply_set(&mut rows[i], op) {
                        result.modified += 1;
                    }
                }
                None => {
                    rows.push(insert_row(op));
                    result.inserted += 1;
                }
            }
        }
        Ok(result)
    }
}
