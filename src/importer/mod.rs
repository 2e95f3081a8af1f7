//! Bulk trainee import from CSV.
//!
//! The whole payload is parsed before anything is written. Rows are keyed
//! by normalized email (last row wins), validated one by one, and the
//! survivors go to the store as a single unordered batch of upserts. Row
//! level problems end up in [`ImportReport::errors`]; only problems with
//! the payload as a whole, or with the store itself, fail the request.

mod columns;
mod parse;
mod row;

use std::collections::{HashMap, HashSet};

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use crate::auth::password::hash_password;
use crate::config::ImportConfig;
use crate::trainees::store::{StoreError, TraineeInsertOnly, TraineeStore, TraineeUpsert};

pub use columns::Column;
pub use parse::{normalize_email, normalize_token};
pub use row::MAX_COURSES;

use columns::Header;
use row::{validate_row, ValidRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_number: u64,
    pub email: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub processed_rows: usize,
    pub unique_emails: usize,
    pub upserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub error_count: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV file is larger than {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("CSV header row is empty")]
    EmptyHeader,

    #[error("CSV is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    #[error("could not parse CSV: {0}")]
    Malformed(String),

    #[error("no valid rows to import")]
    NoValidRows(ImportReport),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("import failed: {0}")]
    Internal(String),
}

struct CsvRow {
    line: u64,
    record: StringRecord,
}

struct ParsedCsv {
    header: Header,
    rows: Vec<CsvRow>,
}

fn read_csv(bytes: &[u8]) -> Result<ParsedCsv, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header_record = reader
        .headers()
        .map_err(|e| ImportError::Malformed(e.to_string()))?
        .clone();
    if header_record.iter().all(|h| h.trim_start_matches('\u{feff}').trim().is_empty()) {
        return Err(ImportError::EmptyHeader);
    }
    let header = Header::from_record(&header_record).map_err(ImportError::MissingColumns)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ImportError::Malformed(e.to_string()))?;
        let line = record.position().map_or(0, |p| p.line());
        rows.push(CsvRow { line, record });
    }
    Ok(ParsedCsv { header, rows })
}

/// Keeps the last row per normalized email, in line order. Rows without
/// an email are never merged. Returns the rows to validate and the number
/// of distinct emails seen.
fn dedupe(parsed: &ParsedCsv) -> (Vec<&CsvRow>, usize) {
    let mut last_for: HashMap<String, usize> = HashMap::new();
    for (i, row) in parsed.rows.iter().enumerate() {
        let email = normalize_email(parsed.header.cell(&row.record, Column::Email).text());
        if !email.is_empty() {
            last_for.insert(email, i);
        }
    }
    let winners: HashSet<usize> = last_for.values().copied().collect();

    let kept = parsed
        .rows
        .iter()
        .enumerate()
        .filter(|(i, row)| {
            winners.contains(i)
                || parsed.header.cell(&row.record, Column::Email).value().is_none()
        })
        .map(|(_, row)| row)
        .collect();
    (kept, last_for.len())
}

/// Attaches credential hashes, each with its own salt, so two accounts
/// created with the default password never share a hash. Runs on a
/// blocking thread; argon2 is slow on purpose.
fn into_upserts(
    rows: Vec<ValidRow>,
    default_password: &str,
    now: OffsetDateTime,
) -> Result<Vec<(u64, TraineeUpsert)>, ImportError> {
    let hash = |plain: &str| hash_password(plain).map_err(|e| ImportError::Internal(e.to_string()));

    rows.into_iter()
        .map(|r| {
            let mut set = r.set;
            let insert_hash = match r.password.as_deref() {
                Some(plain) => {
                    let h = hash(plain)?;
                    set.password_hash = Some(h.clone());
                    h
                }
                None => hash(default_password)?,
            };
            let op = TraineeUpsert {
                email: r.email,
                set,
                on_insert: TraineeInsertOnly {
                    password_hash: insert_hash,
                    created_at: r.created_at.unwrap_or(now),
                },
            };
            Ok((r.line, op))
        })
        .collect()
}

/// Runs a full import of `bytes` against `store`.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub async fn import_trainees(
    store: &dyn TraineeStore,
    settings: &ImportConfig,
    bytes: &[u8],
) -> Result<ImportReport, ImportError> {
    if bytes.len() > settings.max_bytes {
        return Err(ImportError::PayloadTooLarge {
            limit: settings.max_bytes,
        });
    }

    let parsed = read_csv(bytes)?;
    let (candidates, unique_emails) = dedupe(&parsed);

    let mut report = ImportReport {
        processed_rows: parsed.rows.len(),
        unique_emails,
        ..ImportReport::default()
    };

    let mut valid = Vec::with_capacity(candidates.len());
    for row in candidates {
        match validate_row(&parsed.header, &row.record, row.line) {
            Ok(v) => valid.push(v),
            Err(error) => {
                let email = normalize_email(parsed.header.cell(&row.record, Column::Email).text());
                debug!(line = row.line, %error, "row rejected");
                report.errors.push(RowError {
                    row_number: row.line,
                    email: (!email.is_empty()).then_some(email),
                    error,
                });
            }
        }
    }

    if valid.is_empty() {
        report.error_count = report.errors.len();
        return Err(ImportError::NoValidRows(report));
    }

    let default_password = settings.default_password.clone();
    let now = OffsetDateTime::now_utc();
    let planned = tokio::task::spawn_blocking(move || into_upserts(valid, &default_password, now))
        .await
        .map_err(|e| ImportError::Internal(e.to_string()))??;
    let (lines, ops): (Vec<u64>, Vec<TraineeUpsert>) = planned.into_iter().unzip();

    let outcome = store.bulk_upsert(&ops).await?;

    report.upserted_count = outcome.inserted;
    report.matched_count = outcome.matched;
    report.modified_count = outcome.modified;
    for we in outcome.write_errors {
        let (Some(line), Some(op)) = (lines.get(we.index), ops.get(we.index)) else {
            return Err(ImportError::Internal(format!(
                "store reported unknown operation index {}",
                we.index
            )));
        };
        report.errors.push(RowError {
            row_number: *line,
            email: Some(op.email.clone()),
            error: we.message,
        });
    }
    report.errors.sort_by_key(|e| e.row_number);
    report.error_count = report.errors.len();

    info!(
        processed = report.processed_rows,
        unique = report.unique_emails,
        upserted = report.upserted_count,
        matched = report.matched_count,
        modified = report.modified_count,
        errors = report.error_count,
        "csv import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::trainees::InMemoryTraineeStore;

    fn settings() -> ImportConfig {
        ImportConfig::default()
    }

    async fn run(store: &InMemoryTraineeStore, csv: &str) -> Result<ImportReport, ImportError> {
        import_trainees(store, &settings(), csv.as_bytes()).await
    }

    const SCENARIO: &str = "\
email,fullName,school,interestedInCertification
a@x.com,Alice,S,yes
B@X.com,Bob,S,no
A@x.com,Alice2,S2,true
";

    #[tokio::test]
    async fn missing_required_column_names_it_and_writes_nothing() {
        let store = InMemoryTraineeStore::new();
        let err = run(&store, "email,fullName,interestedInCertification\na@x.com,A,yes\n")
            .await
            .unwrap_err();
        match err {
            ImportError::MissingColumns(cols) => assert_eq!(cols, vec!["school"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_payload_is_an_empty_header() {
        let store = InMemoryTraineeStore::new();
        assert!(matches!(run(&store, "").await, Err(ImportError::EmptyHeader)));
        assert!(matches!(run(&store, ",,\n").await, Err(ImportError::EmptyHeader)));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_parsing() {
        let store = InMemoryTraineeStore::new();
        let cfg = ImportConfig {
            max_bytes: 16,
            ..ImportConfig::default()
        };
        let err = import_trainees(&store, &cfg, SCENARIO.as_bytes()).await.unwrap_err();
        assert!(matches!(err, ImportError::PayloadTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn malformed_body_fails_whole_request() {
        let store = InMemoryTraineeStore::new();
        let mut bytes = b"email,fullName,school,interestedInCertification\n".to_vec();
        bytes.extend_from_slice(b"ok@x.com,Ok,S,yes\n");
        bytes.extend_from_slice(b"bad@x.com,\xff\xfe,S,yes\n");
        let err = import_trainees(&store, &settings(), &bytes).await.unwrap_err();
        assert!(matches!(err, ImportError::Malformed(_)));
        assert!(store.find_by_email("ok@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_emails_resolve_to_the_last_row() {
        let store = InMemoryTraineeStore::new();
        let report = run(&store, SCENARIO).await.unwrap();
        assert_eq!(report.processed_rows, 3);
        assert_eq!(report.unique_emails, 2);
        assert_eq!(report.upserted_count, 2);
        assert_eq!(report.error_count, 0);

        let alice = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(alice.full_name, "Alice2");
        assert_eq!(alice.school, "S2");
        assert!(alice.interested_in_certification);
        let bob = store.find_by_email("b@x.com").await.unwrap().unwrap();
        assert!(!bob.interested_in_certification);
        assert_eq!(bob.account_kind, "trainee");
    }

    #[tokio::test]
    async fn reimport_matches_everything_and_modifies_nothing() {
        let store = InMemoryTraineeStore::new();
        let first = run(&store, SCENARIO).await.unwrap();
        let second = run(&store, SCENARIO).await.unwrap();
        assert_eq!(second.upserted_count, 0);
        assert_eq!(second.matched_count, first.unique_emails as u64);
        assert_eq!(second.modified_count, 0);
    }

    #[tokio::test]
    async fn invalid_row_is_reported_and_others_import() {
        let store = InMemoryTraineeStore::new();
        let csv = "\
email,fullName,school,interestedInCertification
a@x.com,Alice,S,yes
c@x.com,Carla,S,maybe
b@x.com,Bob,S,0
";
        let report = run(&store, csv).await.unwrap();
        assert_eq!(report.upserted_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(
            report.errors,
            vec![RowError {
                row_number: 3,
                email: Some("c@x.com".into()),
                error: "interestedInCertification must be true/false/yes/no/1/0".into(),
            }]
        );
        assert!(store.find_by_email("c@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_valid_rows_fails_with_full_error_list() {
        let store = InMemoryTraineeStore::new();
        let csv = "\
email,fullName,school,interestedInCertification
,Nobody,S,yes
x@x.com,,S,yes
";
        match run(&store, csv).await.unwrap_err() {
            ImportError::NoValidRows(report) => {
                assert_eq!(report.processed_rows, 2);
                assert_eq!(report.error_count, 2);
                assert_eq!(report.errors[0].row_number, 2);
                assert_eq!(report.errors[0].email, None);
                assert_eq!(report.errors[1].error, "fullName is required");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_name_collision_is_a_row_error() {
        let store = InMemoryTraineeStore::new();
        run(&store, "email,fullName,school,interestedInCertification\nold@x.com,Alice,S,yes\n")
            .await
            .unwrap();

        let csv = "\
email,fullName,school,interestedInCertification
new@x.com,Alice,S,yes
b@x.com,Bob,S,no
";
        let report = run(&store, csv).await.unwrap();
        assert_eq!(report.upserted_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].row_number, 2);
        assert_eq!(report.errors[0].email.as_deref(), Some("new@x.com"));
        assert!(report.errors[0].error.contains("full name"));
    }

    #[tokio::test]
    async fn password_column_rotates_only_when_non_empty() {
        let store = InMemoryTraineeStore::new();
        run(
            &store,
            "email,fullName,school,interestedInCertification,password\n\
             a@x.com,Alice,S,yes,First#Pass1\n\
             b@x.com,Bob,S,yes,\n",
        )
        .await
        .unwrap();
        let alice = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(verify_password("First#Pass1", &alice.password_hash).unwrap());
        let bob = store.find_by_email("b@x.com").await.unwrap().unwrap();
        assert!(verify_password(&settings().default_password, &bob.password_hash).unwrap());

        let report = run(
            &store,
            "email,fullName,school,interestedInCertification,password\n\
             a@x.com,Alice,S,yes,Second#Pass2\n\
             b@x.com,Bob,S,yes,\n",
        )
        .await
        .unwrap();
        assert_eq!(report.matched_count, 2);
        assert_eq!(report.modified_count, 1);

        let alice_after = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(verify_password("Second#Pass2", &alice_after.password_hash).unwrap());
        let bob_after = store.find_by_email("b@x.com").await.unwrap().unwrap();
        assert_eq!(bob_after.password_hash, bob.password_hash);

        // no password column at all
        run(&store, "email,fullName,school,interestedInCertification\na@x.com,Alice,S,yes\n")
            .await
            .unwrap();
        let alice_last = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(alice_last.password_hash, alice_after.password_hash);
    }

    #[tokio::test]
    async fn default_password_gets_a_fresh_salt_per_account() {
        let store = InMemoryTraineeStore::new();
        run(
            &store,
            "email,fullName,school,interestedInCertification
             a@x.com,Alice,S,yes
             b@x.com,Bob,S,yes
",
        )
        .await
        .unwrap();
        let alice = store.find_by_email("a@x.com").await.unwrap().unwrap();
        let bob = store.find_by_email("b@x.com").await.unwrap().unwrap();
        assert_ne!(alice.password_hash, bob.password_hash);
        assert!(verify_password(&settings().default_password, &alice.password_hash).unwrap());
        assert!(verify_password(&settings().default_password, &bob.password_hash).unwrap());
    }

    #[tokio::test]
    async fn created_at_applies_on_insert_only() {
        let store = InMemoryTraineeStore::new();
        run(
            &store,
            "email,fullName,school,interestedInCertification,createdAt\na@x.com,A,S,1,1/15/2021 09:30\n",
        )
        .await
        .unwrap();
        let before = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(before.created_at, time::macros::datetime!(2021-01-15 9:30 UTC));

        run(
            &store,
            "email,fullName,school,interestedInCertification,createdAt\na@x.com,A,S,1,6/1/2023\n",
        )
        .await
        .unwrap();
        let after = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn list_columns_replace_and_absent_columns_preserve() {
        let store = InMemoryTraineeStore::new();
        run(
            &store,
            "email,fullName,school,interestedInCertification,coursesInterested,mobileNumber\n\
             a@x.com,A,S,yes,\"AWS Gen. AI; Kubernetes, Basics\",0917\n",
        )
        .await
        .unwrap();
        let t = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(t.courses_interested, vec!["AWS Gen. AI", "Kubernetes", "Basics"]);
        assert_eq!(t.mobile_number, "0917");

        run(
            &store,
            "email,fullName,school,interestedInCertification,coursesInterested\na@x.com,A,S,yes,Rust\n",
        )
        .await
        .unwrap();
        let t = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(t.courses_interested, vec!["Rust"]);
        assert_eq!(t.mobile_number, "0917");

        run(&store, "email,fullName,school,interestedInCertification\na@x.com,A,S,yes\n")
            .await
            .unwrap();
        let t = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(t.courses_interested, vec!["Rust"]);
    }

    #[tokio::test]
    async fn short_rows_leave_trailing_columns_untouched() {
        let store = InMemoryTraineeStore::new();
        run(
            &store,
            "email,fullName,school,interestedInCertification,gradeTeach\na@x.com,A,S,yes,Grade 5\n",
        )
        .await
        .unwrap();
        let report = run(
            &store,
            "email,fullName,school,interestedInCertification,gradeTeach\na@x.com,A,S,yes\n",
        )
        .await
        .unwrap();
        assert_eq!(report.modified_count, 0);
        let t = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(t.grade_teach, "Grade 5");
    }

    #[test]
    fn report_serializes_with_camel_case_keys() {
        let report = ImportReport {
            processed_rows: 1,
            errors: vec![RowError {
                row_number: 2,
                email: None,
                error: "x".into(),
            }],
            error_count: 1,
            ..ImportReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        for key in [
            "processedRows",
            "uniqueEmails",
            "upsertedCount",
            "matchedCount",
            "modifiedCount",
            "errorCount",
        ] {
            assert!(json.get(key).is_some(), "{key}");
        }
        assert_eq!(json["errors"][0]["rowNumber"], 2);
        assert!(json["errors"][0]["email"].is_null());
    }
}
