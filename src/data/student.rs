use crate::{
    data::mark::{MarkSummary, NewMark, parse_marks},
    error::{InvalidStudentSnafu, TallyResult},
};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ensure};
use sqlx::FromRow;
use std::str::FromStr;
use time::OffsetDateTime;

pub const MAX_AGE: i32 = 150;

/// A row from the `students` table. `parent_id` is the key every route and
/// every mark uses; `id` is only the surrogate.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i32,
    pub parent_id: i32,
    pub name: String,
    pub email: String,
    pub age: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StudentWithMarks {
    #[serde(flatten)]
    pub student: Student,
    pub marks: Vec<MarkSummary>,
}

pub struct NewStudent {
    pub parent_id: Option<i32>,
    pub name: String,
    pub email: EmailAddress,
    pub age: Option<i32>,
}

/// Fields to change on an existing student. `None` leaves the column alone.
#[derive(Default)]
pub struct StudentChanges {
    pub name: Option<String>,
    pub email: Option<EmailAddress>,
    pub age: Option<i32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddStudentForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
    pub parent_id: Option<i32>,
    pub marks: Option<Value>,
}

impl AddStudentForm {
    /// Checks every field, including any initial marks, before anything is
    /// written. Initial marks are optional, so a `marks: null` is treated as
    /// absent.
    pub fn validate(self) -> TallyResult<(NewStudent, Vec<NewMark>)> {
        let Self {
            name,
            email,
            age,
            parent_id,
            marks,
        } = self;

        let name = validate_name(name.as_deref().context(InvalidStudentSnafu {
            reason: "name is required",
        })?)?;
        let email = validate_email(email.as_deref().context(InvalidStudentSnafu {
            reason: "email is required",
        })?)?;
        let age = age.map(validate_age).transpose()?;

        if let Some(parent_id) = parent_id {
            ensure!(
                parent_id > 0,
                InvalidStudentSnafu {
                    reason: "parentId must be a positive integer"
                }
            );
        }

        let marks = match marks {
            None | Some(Value::Null) => Vec::new(),
            Some(marks) => parse_marks(Some(&marks))?,
        };

        Ok((
            NewStudent {
                parent_id,
                name,
                email,
                age,
            },
            marks,
        ))
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
    pub marks: Option<Value>,
}

impl UpdateStudentForm {
    /// `marks` present means "replace the whole mark set with this".
    pub fn validate(self) -> TallyResult<(StudentChanges, Option<Vec<NewMark>>)> {
        let Self {
            name,
            email,
            age,
            marks,
        } = self;

        let changes = StudentChanges {
            name: name.as_deref().map(validate_name).transpose()?,
            email: email.as_deref().map(validate_email).transpose()?,
            age: age.map(validate_age).transpose()?,
        };

        let marks = match marks {
            None | Some(Value::Null) => None,
            Some(marks) => Some(parse_marks(Some(&marks))?),
        };

        Ok((changes, marks))
    }
}

#[derive(Serialize, Debug)]
pub struct DeletedStudent {
    pub message: &'static str,
    pub student: Student,
}

impl From<Student> for DeletedStudent {
    fn from(student: Student) -> Self {
        Self {
            message: "Student deleted successfully",
            student,
        }
    }
}

fn validate_name(name: &str) -> TallyResult<String> {
    let name = name.trim();
    ensure!(
        !name.is_empty(),
        InvalidStudentSnafu {
            reason: "name must be a non-empty string"
        }
    );
    Ok(name.to_string())
}

fn validate_email(email: &str) -> TallyResult<EmailAddress> {
    EmailAddress::from_str(email.trim()).ok().context(InvalidStudentSnafu {
        reason: format!("{email:?} is not a valid email address"),
    })
}

fn validate_age(age: i32) -> TallyResult<i32> {
    ensure!(
        (0..=MAX_AGE).contains(&age),
        InvalidStudentSnafu {
            reason: format!("age must be between 0 and {MAX_AGE}")
        }
    );
    Ok(age)
}
