use csv::Writer;
use time::format_description::well_known::Rfc3339;

use crate::{importer::Column, trainees::Trainee};

/// Joins list cells with `;`, which the importer splits on.
const LIST_JOIN: &str = ";";

/// Columns written by the export; every importable column except `password`.
fn export_columns() -> impl Iterator<Item = Column> {
    Column::ALL.into_iter().filter(|c| *c != Column::Password)
}

fn cell(t: &Trainee, col: Column) -> anyhow::Result<String> {
    Ok(match col {
        Column::FullName => t.full_name.clone(),
        Column::School => t.school.clone(),
        Column::InterestedInCertification => t.interested_in_certification.to_string(),
        Column::Email => t.email.clone(),
        Column::CoursesInterested => t.courses_interested.join(LIST_JOIN),
        Column::CoursesOther => t.courses_other.join(LIST_JOIN),
        Column::CreatedAt => t.created_at.format(&Rfc3339)?,
        Column::TrainingAttended => t.training_attended.map(|b| b.to_string()).unwrap_or_default(),
        Column::MobileNumber => t.mobile_number.clone(),
        Column::GradeTeach => t.grade_teach.clone(),
        Column::YearsExperience => t.years_experience.map(|n| n.to_string()).unwrap_or_default(),
        Column::Password => String::new(),
    })
}

/// Renders trainees as a CSV document the importer accepts back.
pub fn trainees_csv(trainees: &[Trainee]) -> anyhow::Result<Vec<u8>> {
    let mut w = Writer::from_writer(Vec::new());
    w.write_record(export_columns().map(Column::name))?;
    for t in trainees {
        let row = export_columns()
            .map(|c| cell(t, c))
            .collect::<anyhow::Result<Vec<_>>>()?;
        w.write_record(&row)?;
    }
    w.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn trainee() -> Trainee {
        Trainee {
            id: Uuid::new_v4(),
            email: "ana@example.com".into(),
            full_name: "Ana Reyes".into(),
            school: "Quezon, City School".into(),
            mobile_number: String::new(),
            grade_teach: "Grade 5".into(),
            years_experience: Some(3),
            training_attended: Some(true),
            courses_interested: vec!["Python".into(), "AWS Gen. AI".into()],
            courses_other: vec![],
            interested_in_certification: false,
            password_hash: "$argon2id$secret".into(),
            account_kind: "trainee".into(),
            created_at: datetime!(2024-03-01 08:30 UTC),
        }
    }

    #[test]
    fn writes_header_and_rows_without_password() {
        let out = String::from_utf8(trainees_csv(&[trainee()]).unwrap()).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "fullName,school,interestedInCertification,email,coursesInterested,coursesOther,\
             createdAt,trainingAttended,mobileNumber,gradeTeach,yearsExperience"
        );
        assert_eq!(
            lines.next().unwrap(),
            "Ana Reyes,\"Quezon, City School\",false,ana@example.com,Python;AWS Gen. AI,,\
             2024-03-01T08:30:00Z,true,,Grade 5,3"
        );
        assert!(lines.next().is_none());
        assert!(!out.contains("argon2"));
    }

    #[test]
    fn empty_list_still_has_header() {
        let out = String::from_utf8(trainees_csv(&[]).unwrap()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
