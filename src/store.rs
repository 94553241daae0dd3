//! Repository interfaces for the two entities. Handlers only ever see these
//! traits; the concrete backend is picked once in `main`.

use crate::{
    data::{
        Page,
        mark::{Mark, NewMark},
        student::{NewStudent, Student, StudentChanges, StudentWithMarks},
    },
    error::TallyResult,
};
use async_trait::async_trait;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Inserts the student and any initial marks together.
    async fn create_student(
        &self,
        student: NewStudent,
        marks: Vec<NewMark>,
    ) -> TallyResult<StudentWithMarks>;

    /// Newest first. Returns the page and the total number of students.
    async fn list_students(&self, page: Page) -> TallyResult<(Vec<Student>, u64)>;

    async fn list_students_with_marks(
        &self,
        page: Page,
    ) -> TallyResult<(Vec<StudentWithMarks>, u64)>;

    async fn get_student(&self, key: i32) -> TallyResult<Option<StudentWithMarks>>;

    async fn student_exists(&self, key: i32) -> TallyResult<bool>;

    /// `marks`, when given, replaces the student's whole mark set as part of
    /// the same update.
    async fn update_student(
        &self,
        key: i32,
        changes: StudentChanges,
        marks: Option<Vec<NewMark>>,
    ) -> TallyResult<Option<StudentWithMarks>>;

    /// Marks go with the student.
    async fn delete_student(&self, key: i32) -> TallyResult<Option<Student>>;
}

/// Every method that takes a key returns `Ok(None)` when no student has it.
#[async_trait]
pub trait MarkStore: Send + Sync {
    async fn add_marks(&self, key: i32, marks: Vec<NewMark>) -> TallyResult<Option<Vec<Mark>>>;

    /// Marks carry the student's live name.
    async fn marks_for_student(&self, key: i32) -> TallyResult<Option<Vec<Mark>>>;

    /// Deletes then inserts in one transaction; readers see the old set or the
    /// new one, never neither.
    async fn replace_marks(
        &self,
        key: i32,
        marks: Vec<NewMark>,
    ) -> TallyResult<Option<Vec<Mark>>>;

    /// Deletes marks for one subject, or all of them when `subject` is `None`,
    /// returning what was removed.
    async fn delete_marks(
        &self,
        key: i32,
        subject: Option<String>,
    ) -> TallyResult<Option<Vec<Mark>>>;

    /// Every mark, named by the live student name, else the stored name, else
    /// [`UNKNOWN_STUDENT_NAME`](crate::data::mark::UNKNOWN_STUDENT_NAME).
    async fn all_marks_with_names(&self, subject: Option<String>) -> TallyResult<Vec<Mark>>;
}
