use crate::error::{InvalidMarkSnafu, InvalidSubjectSnafu, MarksNotArraySnafu, TallyResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ensure};
use sqlx::FromRow;
use time::OffsetDateTime;

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;

/// Name reported for a mark whose student is gone and which never had a
/// stored name.
pub const UNKNOWN_STUDENT_NAME: &str = "Unknown";

/// A row from the `marks` table.
///
/// `name` is the student's name copied in when the mark was written. It is not
/// refreshed on rename, so anything that lists marks with names should prefer
/// the live student name and only fall back to this.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: i32,
    pub parent_id: i32,
    pub subject: String,
    pub score: i32,
    pub name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The subject/score projection nested under a student.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct MarkSummary {
    pub subject: String,
    pub score: i32,
}

impl From<&Mark> for MarkSummary {
    fn from(mark: &Mark) -> Self {
        Self {
            subject: mark.subject.clone(),
            score: mark.score,
        }
    }
}

/// A validated mark, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMark {
    pub subject: String,
    pub score: i32,
}

impl NewMark {
    fn from_json(index: usize, entry: &Value) -> TallyResult<Self> {
        let entry = entry.as_object().context(InvalidMarkSnafu {
            index,
            reason: "expected an object of { subject, score }",
        })?;

        let subject = entry
            .get("subject")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .context(InvalidMarkSnafu {
                index,
                reason: "subject must be a non-empty string",
            })?;

        let score = entry
            .get("score")
            .and_then(Value::as_i64)
            .filter(|score| (MIN_SCORE..=MAX_SCORE).contains(score))
            .and_then(|score| i32::try_from(score).ok())
            .context(InvalidMarkSnafu {
                index,
                reason: format!("score must be an integer between {MIN_SCORE} and {MAX_SCORE}"),
            })?;

        Ok(Self {
            subject: subject.to_string(),
            score,
        })
    }
}

/// Validates a `marks` payload as a whole: either every entry is valid, or the
/// first bad entry is reported and nothing is returned.
pub fn parse_marks(marks: Option<&Value>) -> TallyResult<Vec<NewMark>> {
    let entries = marks.and_then(Value::as_array).context(MarksNotArraySnafu)?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| NewMark::from_json(index, entry))
        .collect()
}

/// `{ "marks": [...] }`
#[derive(Deserialize, Debug, Default)]
pub struct MarksForm {
    pub marks: Option<Value>,
}

/// Optional body of a mark deletion. No `subject` means every mark goes.
#[derive(Deserialize, Debug, Default)]
pub struct DeleteMarksForm {
    pub subject: Option<Value>,
}

impl DeleteMarksForm {
    pub fn subject(&self) -> TallyResult<Option<String>> {
        let Some(subject) = &self.subject else {
            return Ok(None);
        };

        let subject = subject.as_str().map(str::trim).unwrap_or_default();
        ensure!(!subject.is_empty(), InvalidSubjectSnafu);
        Ok(Some(subject.to_string()))
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMarks {
    pub message: String,
    pub deleted_count: usize,
    pub deleted_marks: Vec<Mark>,
}

impl DeletedMarks {
    pub fn new(subject: Option<&str>, deleted_marks: Vec<Mark>) -> Self {
        let deleted_count = deleted_marks.len();
        let message = match subject {
            Some(subject) => {
                format!("Successfully deleted {deleted_count} mark(s) for subject '{subject}'")
            }
            None => format!("Successfully deleted {deleted_count} mark(s)"),
        };

        Self {
            message,
            deleted_count,
            deleted_marks,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct SubjectQuery {
    pub subject: Option<String>,
}

impl SubjectQuery {
    pub fn subject(&self) -> Option<String> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(ToString::to_string)
    }
}
