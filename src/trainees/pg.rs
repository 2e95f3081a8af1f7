use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};
use time::OffsetDateTime;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{
    AccountKind, CertificationSplit, CourseCount, NewTrainee, Trainee, TraineeStats,
    TraineeUpdate,
};
use super::store::{
    duplicate_field, BulkWriteResult, StoreError, TraineeStore, TraineeUpsert, WriteError,
};

const COLUMNS: &str = "id, email, full_name, school, mobile_number, grade_teach, \
     years_experience, training_attended, courses_interested, courses_other, \
     interested_in_certification, password_hash, account_kind, created_at";

#[derive(Clone)]
pub struct PgTraineeStore {
    db: PgPool,
    write_concurrency: usize,
}

impl PgTraineeStore {
    pub fn new(db: PgPool, write_concurrency: usize) -> Self {
        Self {
            db,
            write_concurrency: write_concurrency.max(1),
        }
    }
}

enum Value {
    Text(String),
    Bool(bool),
    Int(i32),
    List(Vec<String>),
    Time(OffsetDateTime),
}

/// Column/value pairs for the INSERT and the column names for the
/// `DO UPDATE SET` list of one upsert.
fn upsert_columns(op: &TraineeUpsert) -> (Vec<(&'static str, Value)>, Vec<&'static str>) {
    let s = &op.set;
    let mut insert = vec![
        ("email", Value::Text(op.email.clone())),
        ("full_name", Value::Text(s.full_name.clone())),
        ("school", Value::Text(s.school.clone())),
        ("interested_in_certification", Value::Bool(s.interested_in_certification)),
        ("account_kind", Value::Text(s.account_kind.as_str().to_string())),
    ];
    let mut update = vec!["full_name", "school", "interested_in_certification", "account_kind"];

    let mut optional = |col: &'static str, v: Option<Value>| {
        if let Some(v) = v {
            insert.push((col, v));
            update.push(col);
        }
    };
    optional("courses_interested", s.courses_interested.clone().map(Value::List));
    optional("courses_other", s.courses_other.clone().map(Value::List));
    optional("training_attended", s.training_attended.map(Value::Bool));
    optional("mobile_number", s.mobile_number.clone().map(Value::Text));
    optional("grade_teach", s.grade_teach.clone().map(Value::Text));
    optional("years_experience", s.years_experience.map(Value::Int));
    optional("password_hash", s.password_hash.clone().map(Value::Text));

    if s.password_hash.is_none() {
        insert.push(("password_hash", Value::Text(op.on_insert.password_hash.clone())));
    }
    insert.push(("created_at", Value::Time(op.on_insert.created_at)));

    (insert, update)
}

/// `INSERT … ON CONFLICT (email) DO UPDATE … WHERE <changed>`; the row
/// comes back only when something was written, with `inserted` telling
/// insert from update.
fn build_upsert(op: &TraineeUpsert) -> QueryBuilder<'static, Postgres> {
    let (insert, update) = upsert_columns(op);

    let mut qb = QueryBuilder::new("INSERT INTO trainees (");
    let mut cols = qb.separated(", ");
    for (col, _) in &insert {
        cols.push(*col);
    }
    qb.push(") VALUES (");
    let mut vals = qb.separated(", ");
    for (_, v) in insert {
        match v {
            Value::Text(t) => vals.push_bind(t),
            Value::Bool(b) => vals.push_bind(b),
            Value::Int(i) => vals.push_bind(i),
            Value::List(l) => vals.push_bind(l),
            Value::Time(t) => vals.push_bind(t),
        };
    }
    qb.push(") ON CONFLICT (email) DO UPDATE SET ");
    let set = update
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    qb.push(set);

    let current = update
        .iter()
        .map(|c| format!("trainees.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let incoming = update
        .iter()
        .map(|c| format!("EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    qb.push(format!(
        " WHERE ({current}) IS DISTINCT FROM ({incoming}) RETURNING (xmax = 0) AS inserted"
    ));
    qb
}

fn write_error_message(e: &(dyn sqlx::error::DatabaseError + 'static)) -> String {
    if e.is_unique_violation() {
        format!("This {} is already registered.", duplicate_field(e.constraint()))
    } else {
        e.message().to_string()
    }
}

async fn upsert_one(db: &PgPool, op: &TraineeUpsert) -> Result<Option<bool>, sqlx::Error> {
    let mut qb = build_upsert(op);
    let row: Option<PgRow> = qb.build().fetch_optional(db).await?;
    row.map(|r| r.try_get::<bool, _>("inserted")).transpose()
}

#[async_trait]
impl TraineeStore for PgTraineeStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Trainee>, StoreError> {
        let row = sqlx::query_as::<_, Trainee>(&format!(
            "SELECT {COLUMNS} FROM trainees WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Trainee>, StoreError> {
        let row = sqlx::query_as::<_, Trainee>(&format!(
            "SELECT {COLUMNS} FROM trainees WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(&self, new: NewTrainee) -> Result<Trainee, StoreError> {
        let row = sqlx::query_as::<_, Trainee>(&format!(
            r#"
            INSERT INTO trainees (email, full_name, school, mobile_number, grade_teach,
                                  years_experience, training_attended, courses_interested,
                                  courses_other, interested_in_certification, password_hash,
                                  account_kind)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&new.school)
        .bind(&new.mobile_number)
        .bind(&new.grade_teach)
        .bind(new.years_experience)
        .bind(new.training_attended)
        .bind(&new.courses_interested)
        .bind(&new.courses_other)
        .bind(new.interested_in_certification)
        .bind(&new.password_hash)
        .bind(new.account_kind.as_str())
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn list(&self, kind: AccountKind) -> Result<Vec<Trainee>, StoreError> {
        let rows = sqlx::query_as::<_, Trainee>(&format!(
            "SELECT {COLUMNS} FROM trainees WHERE account_kind = $1 ORDER BY created_at DESC"
        ))
        .bind(kind.as_str())
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, changes: TraineeUpdate) -> Result<Trainee, StoreError> {
        let row = sqlx::query_as::<_, Trainee>(&format!(
            r#"
            UPDATE trainees SET
                full_name = COALESCE($2, full_name),
                school = COALESCE($3, school),
                mobile_number = COALESCE($4, mobile_number),
                grade_teach = COALESCE($5, grade_teach),
                years_experience = COALESCE($6, years_experience),
                training_attended = COALESCE($7, training_attended),
                courses_interested = COALESCE($8, courses_interested),
                courses_other = COALESCE($9, courses_other),
                interested_in_certification = COALESCE($10, interested_in_certification)
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.full_name)
        .bind(changes.school)
        .bind(changes.mobile_number)
        .bind(changes.grade_teach)
        .bind(changes.years_experience)
        .bind(changes.training_attended)
        .bind(changes.courses_interested)
        .bind(changes.courses_other)
        .bind(changes.interested_in_certification)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM trainees WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<TraineeStats, StoreError> {
        let (total_users, yes): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE interested_in_certification)
              FROM trainees
             WHERE account_kind = 'trainee'
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let courses = sqlx::query_as::<_, CourseCount>(
            r#"
            SELECT c AS course, COUNT(*) AS count
              FROM trainees
             CROSS JOIN LATERAL unnest(courses_interested) AS c
             WHERE account_kind = 'trainee'
             GROUP BY c
             ORDER BY count DESC, course ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(TraineeStats {
            total_users,
            cert: CertificationSplit {
                yes,
                no: total_users - yes,
            },
            courses,
        })
    }

    async fn enrolled_in(&self, course: &str) -> Result<Vec<Trainee>, StoreError> {
        let rows = sqlx::query_as::<_, Trainee>(&format!(
            r#"
            SELECT {COLUMNS}
              FROM trainees
             WHERE account_kind = 'trainee' AND $1 = ANY(courses_interested)
             ORDER BY created_at DESC
            "#
        ))
        .bind(course)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn bulk_upsert(&self, ops: &[TraineeUpsert]) -> Result<BulkWriteResult, StoreError> {
        let permits = Arc::new(Semaphore::new(self.write_concurrency));
        let mut tasks = JoinSet::new();
        for (index, op) in ops.iter().cloned().enumerate() {
            let db = self.db.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, upsert_one(&db, &op).await)
            });
        }

        let mut result = BulkWriteResult::default();
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| StoreError::Backend(e.to_string()))?;
            match outcome {
                Ok(Some(true)) => result.inserted += 1,
                Ok(Some(false)) => {
                    result.matched += 1;
                    result.modified += 1;
                }
                Ok(None) => result.matched += 1,
                Err(sqlx::Error::Database(db)) => {
                    let message = write_error_message(db.as_ref());
                    debug!(index, %message, "upsert rejected");
                    result.write_errors.push(WriteError { index, message });
                }
                Err(e) => {
                    warn!(error = %e, index, "bulk upsert aborted");
                    tasks.abort_all();
                    return Err(StoreError::Backend(e.to_string()));
                }
            }
        }
        result.write_errors.sort_by_key(|e| e.index);
        Ok(result)
    }
}
