use std::collections::HashMap;

use csv::StringRecord;

/// Columns the importer understands; anything else in the header is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    FullName,
    School,
    InterestedInCertification,
    Email,
    CoursesInterested,
    CoursesOther,
    Password,
    CreatedAt,
    TrainingAttended,
    MobileNumber,
    GradeTeach,
    YearsExperience,
}

impl Column {
    pub const REQUIRED: [Column; 4] = [
        Column::FullName,
        Column::School,
        Column::InterestedInCertification,
        Column::Email,
    ];

    pub const ALL: [Column; 12] = [
        Column::FullName,
        Column::School,
        Column::InterestedInCertification,
        Column::Email,
        Column::CoursesInterested,
        Column::CoursesOther,
        Column::Password,
        Column::CreatedAt,
        Column::TrainingAttended,
        Column::MobileNumber,
        Column::GradeTeach,
        Column::YearsExperience,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::FullName => "fullName",
            Column::School => "school",
            Column::InterestedInCertification => "interestedInCertification",
            Column::Email => "email",
            Column::CoursesInterested => "coursesInterested",
            Column::CoursesOther => "coursesOther",
            Column::Password => "password",
            Column::CreatedAt => "createdAt",
            Column::TrainingAttended => "trainingAttended",
            Column::MobileNumber => "mobileNumber",
            Column::GradeTeach => "gradeTeach",
            Column::YearsExperience => "yearsExperience",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// A row's view of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell<'a> {
    /// Column not in the header, or the row ends before it.
    Absent,
    /// Present but blank after trimming.
    Empty,
    Value(&'a str),
}

impl<'a> Cell<'a> {
    pub fn value(self) -> Option<&'a str> {
        match self {
            Cell::Value(v) => Some(v),
            Cell::Absent | Cell::Empty => None,
        }
    }

    pub fn text(self) -> &'a str {
        self.value().unwrap_or("")
    }
}

/// Known columns mapped to their position in the header row.
#[derive(Debug, Clone)]
pub struct Header {
    positions: HashMap<Column, usize>,
}

impl Header {
    /// Builds the header, returning the names of missing required columns
    /// on failure.
    pub fn from_record(record: &StringRecord) -> Result<Self, Vec<&'static str>> {
        let mut positions = HashMap::new();
        for (idx, raw) in record.iter().enumerate() {
            let name = raw.trim_start_matches('\u{feff}').trim();
            if let Some(col) = Column::from_name(name) {
                positions.entry(col).or_insert(idx);
            }
        }

        let missing: Vec<&'static str> = Column::REQUIRED
            .into_iter()
            .filter(|c| !positions.contains_key(c))
            .map(Column::name)
            .collect();
        if missing.is_empty() {
            Ok(Self { positions })
        } else {
            Err(missing)
        }
    }

    pub fn cell<'r>(&self, record: &'r StringRecord, col: Column) -> Cell<'r> {
        let Some(raw) = self.positions.get(&col).and_then(|&i| record.get(i)) else {
            return Cell::Absent;
        };
        match raw.trim() {
            "" => Cell::Empty,
            v => Cell::Value(v),
        }
    }
}
