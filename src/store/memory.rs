//! In-process backend for exercising handlers without a database. One mutex
//! over everything stands in for Postgres' transactions.

use crate::{
    data::{
        Page,
        mark::{Mark, MarkSummary, NewMark, UNKNOWN_STUDENT_NAME},
        student::{NewStudent, Student, StudentChanges, StudentWithMarks},
    },
    error::{TallyError, TallyResult},
    store::{MarkStore, StudentStore},
};
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    students: Vec<Student>,
    marks: Vec<Mark>,
    next_student_id: i32,
    next_mark_id: i32,
    next_parent_id: i32,
}

impl Tables {
    fn student(&self, key: i32) -> Option<&Student> {
        self.students.iter().find(|student| student.parent_id == key)
    }

    fn summaries(&self, key: i32) -> Vec<MarkSummary> {
        self.marks
            .iter()
            .filter(|mark| mark.parent_id == key)
            .map(MarkSummary::from)
            .collect()
    }

    fn with_marks(&self, student: Student) -> StudentWithMarks {
        StudentWithMarks {
            marks: self.summaries(student.parent_id),
            student,
        }
    }

    fn insert_marks(&mut self, key: i32, name: &str, marks: Vec<NewMark>) -> Vec<Mark> {
        let now = OffsetDateTime::now_utc();
        let created: Vec<Mark> = marks
            .into_iter()
            .map(|NewMark { subject, score }| {
                self.next_mark_id += 1;
                Mark {
                    id: self.next_mark_id,
                    parent_id: key,
                    subject,
                    score,
                    name: Some(name.to_string()),
                    created_at: now,
                    updated_at: now,
                }
            })
            .collect();

        self.marks.extend(created.iter().cloned());
        created
    }

    fn named(&self, mark: &Mark) -> Mark {
        let name = self
            .student(mark.parent_id)
            .map(|student| student.name.clone())
            .or_else(|| mark.name.clone())
            .unwrap_or_else(|| UNKNOWN_STUDENT_NAME.to_string());

        Mark {
            name: Some(name),
            ..mark.clone()
        }
    }

    fn newest_first(&self, page: Page) -> Vec<Student> {
        let mut students = self.students.clone();
        students.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        students
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or_default())
            .take(page.limit as usize)
            .collect()
    }
}

impl MemoryStore {
    /// Simulates a mark whose student row vanished without the cascade, as
    /// can happen with data imported from elsewhere.
    pub async fn insert_orphan_mark(
        &self,
        key: i32,
        subject: &str,
        score: i32,
        name: Option<&str>,
    ) {
        let mut tables = self.inner.lock().await;
        let created = tables.insert_marks(
            key,
            "",
            vec![NewMark {
                subject: subject.to_string(),
                score,
            }],
        );
        let id = created[0].id;
        if let Some(mark) = tables.marks.iter_mut().find(|mark| mark.id == id) {
            mark.name = name.map(ToString::to_string);
        }
    }

    pub async fn mark_count(&self) -> usize {
        self.inner.lock().await.marks.len()
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    async fn create_student(
        &self,
        student: NewStudent,
        marks: Vec<NewMark>,
    ) -> TallyResult<StudentWithMarks> {
        let mut tables = self.inner.lock().await;

        let parent_id = match student.parent_id {
            Some(parent_id) => {
                if tables.student(parent_id).is_some() {
                    return Err(TallyError::DuplicateParentId);
                }
                tables.next_parent_id = tables.next_parent_id.max(parent_id);
                parent_id
            }
            None => {
                tables.next_parent_id += 1;
                while tables.student(tables.next_parent_id).is_some() {
                    tables.next_parent_id += 1;
                }
                tables.next_parent_id
            }
        };

        tables.next_student_id += 1;
        let now = OffsetDateTime::now_utc();
        let created = Student {
            id: tables.next_student_id,
            parent_id,
            name: student.name,
            email: student.email.to_string(),
            age: student.age,
            created_at: now,
            updated_at: now,
        };
        tables.students.push(created.clone());
        tables.insert_marks(parent_id, &created.name, marks);

        Ok(tables.with_marks(created))
    }

    async fn list_students(&self, page: Page) -> TallyResult<(Vec<Student>, u64)> {
        let tables = self.inner.lock().await;
        Ok((tables.newest_first(page), tables.students.len() as u64))
    }

    async fn list_students_with_marks(
        &self,
        page: Page,
    ) -> TallyResult<(Vec<StudentWithMarks>, u64)> {
        let tables = self.inner.lock().await;
        let students = tables
            .newest_first(page)
            .into_iter()
            .map(|student| tables.with_marks(student))
            .collect();
        Ok((students, tables.students.len() as u64))
    }

    async fn get_student(&self, key: i32) -> TallyResult<Option<StudentWithMarks>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .student(key)
            .cloned()
            .map(|student| tables.with_marks(student)))
    }

    async fn student_exists(&self, key: i32) -> TallyResult<bool> {
        Ok(self.inner.lock().await.student(key).is_some())
    }

    async fn update_student(
        &self,
        key: i32,
        changes: StudentChanges,
        marks: Option<Vec<NewMark>>,
    ) -> TallyResult<Option<StudentWithMarks>> {
        let mut tables = self.inner.lock().await;

        let Some(student) = tables
            .students
            .iter_mut()
            .find(|student| student.parent_id == key)
        else {
            return Ok(None);
        };

        if let Some(name) = changes.name {
            student.name = name;
        }
        if let Some(email) = changes.email {
            student.email = email.to_string();
        }
        if let Some(age) = changes.age {
            student.age = Some(age);
        }
        student.updated_at = OffsetDateTime::now_utc();
        let student = student.clone();

        if let Some(marks) = marks {
            tables.marks.retain(|mark| mark.parent_id != key);
            tables.insert_marks(key, &student.name, marks);
        }

        Ok(Some(tables.with_marks(student)))
    }

    async fn delete_student(&self, key: i32) -> TallyResult<Option<Student>> {
        let mut tables = self.inner.lock().await;

        let Some(position) = tables
            .students
            .iter()
            .position(|student| student.parent_id == key)
        else {
            return Ok(None);
        };

        let removed = tables.students.remove(position);
        tables.marks.retain(|mark| mark.parent_id != key);
        Ok(Some(removed))
    }
}

#[async_trait]
impl MarkStore for MemoryStore {
    async fn add_marks(&self, key: i32, marks: Vec<NewMark>) -> TallyResult<Option<Vec<Mark>>> {
        let mut tables = self.inner.lock().await;
        let Some(name) = tables.student(key).map(|student| student.name.clone()) else {
            return Ok(None);
        };
        Ok(Some(tables.insert_marks(key, &name, marks)))
    }

    async fn marks_for_student(&self, key: i32) -> TallyResult<Option<Vec<Mark>>> {
        let tables = self.inner.lock().await;
        if tables.student(key).is_none() {
            return Ok(None);
        }

        Ok(Some(
            tables
                .marks
                .iter()
                .filter(|mark| mark.parent_id == key)
                .map(|mark| tables.named(mark))
                .collect(),
        ))
    }

    async fn replace_marks(
        &self,
        key: i32,
        marks: Vec<NewMark>,
    ) -> TallyResult<Option<Vec<Mark>>> {
        let mut tables = self.inner.lock().await;
        let Some(name) = tables.student(key).map(|student| student.name.clone()) else {
            return Ok(None);
        };

        tables.marks.retain(|mark| mark.parent_id != key);
        Ok(Some(tables.insert_marks(key, &name, marks)))
    }

    async fn delete_marks(
        &self,
        key: i32,
        subject: Option<String>,
    ) -> TallyResult<Option<Vec<Mark>>> {
        let mut tables = self.inner.lock().await;
        if tables.student(key).is_none() {
            return Ok(None);
        }

        let (deleted, kept): (Vec<Mark>, Vec<Mark>) =
            tables.marks.drain(..).partition(|mark| {
                mark.parent_id == key
                    && subject
                        .as_deref()
                        .is_none_or(|subject| mark.subject == subject)
            });
        tables.marks = kept;

        Ok(Some(deleted))
    }

    async fn all_marks_with_names(&self, subject: Option<String>) -> TallyResult<Vec<Mark>> {
        let tables = self.inner.lock().await;

        let mut marks: Vec<Mark> = tables
            .marks
            .iter()
            .filter(|mark| {
                subject
                    .as_deref()
                    .is_none_or(|subject| mark.subject == subject)
            })
            .map(|mark| tables.named(mark))
            .collect();
        marks.sort_by_key(|mark| (mark.parent_id, mark.id));

        Ok(marks)
    }
}
