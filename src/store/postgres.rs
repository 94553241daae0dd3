use crate::{
    config::DbConfig,
    data::{
        Page,
        mark::{Mark, MarkSummary, NewMark, UNKNOWN_STUDENT_NAME},
        student::{NewStudent, Student, StudentChanges, StudentWithMarks},
    },
    error::{
        CommitTransactionSnafu, GetDatabaseConnectionSnafu, MakeQuerySnafu, MigrateSnafu,
        OpenDatabaseSnafu, TallyError, TallyResult,
    },
    store::{MarkStore, StudentStore},
};
use async_trait::async_trait;
use snafu::ResultExt;
use sqlx::{
    FromRow, PgConnection, Pool, Postgres, QueryBuilder, Transaction, postgres::PgPoolOptions,
};
use std::collections::HashMap;

const STUDENT_COLUMNS: &str = "id, parent_id, name, email, age, created_at, updated_at";
const MARK_COLUMNS: &str = "id, parent_id, subject, score, name, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

#[derive(FromRow)]
struct KeyedSummary {
    parent_id: i32,
    subject: String,
    score: i32,
}

impl PgStore {
    pub async fn connect(options: PgPoolOptions, config: &DbConfig) -> TallyResult<Self> {
        let pool = options
            .max_connections(config.max_connections())
            .connect(&config.get_db_path())
            .await
            .context(OpenDatabaseSnafu)?;

        Ok(Self { pool })
    }

    /// Applies any migrations the database hasn't seen yet. Never destructive.
    pub async fn migrate(&self) -> TallyResult<()> {
        sqlx::migrate!().run(&self.pool).await.context(MigrateSnafu)
    }

    /// Drops every table (and the migration history) then re-applies the
    /// schema. Only ever run on explicit request.
    pub async fn reset(&self) -> TallyResult<()> {
        let mut transaction = self.get_transaction().await?;
        sqlx::query("DROP TABLE IF EXISTS marks, students, _sqlx_migrations CASCADE")
            .execute(&mut *transaction)
            .await
            .context(MakeQuerySnafu)?;
        sqlx::query("DROP SEQUENCE IF EXISTS students_parent_id_seq")
            .execute(&mut *transaction)
            .await
            .context(MakeQuerySnafu)?;
        transaction.commit().await.context(CommitTransactionSnafu)?;

        self.migrate().await?;
        warn!("Database reset");
        Ok(())
    }

    pub async fn sensible_shutdown(&self) {
        self.pool.close().await;
    }

    async fn get_transaction(&self) -> TallyResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.context(GetDatabaseConnectionSnafu)
    }

    /// Locks the student row for the rest of the transaction, so it can't be
    /// deleted or renamed under a batch of marks.
    async fn lock_student_name(key: i32, conn: &mut PgConnection) -> TallyResult<Option<String>> {
        sqlx::query_scalar("SELECT name FROM students WHERE parent_id = $1 FOR UPDATE")
            .bind(key)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    /// Keeps generated keys clear of one the caller chose.
    async fn advance_parent_id_seq(taken: i32, conn: &mut PgConnection) -> TallyResult<()> {
        sqlx::query(
            "SELECT setval('students_parent_id_seq', \
             GREATEST($1, (SELECT last_value FROM students_parent_id_seq)))",
        )
        .bind(i64::from(taken))
        .execute(conn)
        .await
        .context(MakeQuerySnafu)?;
        Ok(())
    }

    async fn insert_marks(
        key: i32,
        name: &str,
        marks: Vec<NewMark>,
        conn: &mut PgConnection,
    ) -> TallyResult<Vec<Mark>> {
        if marks.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO marks (parent_id, subject, score, name) ");
        builder.push_values(marks, |mut row, NewMark { subject, score }| {
            row.push_bind(key)
                .push_bind(subject)
                .push_bind(score)
                .push_bind(name.to_string());
        });
        builder.push(" RETURNING ");
        builder.push(MARK_COLUMNS);

        builder
            .build_query_as::<Mark>()
            .fetch_all(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn summaries_for(key: i32, conn: &mut PgConnection) -> TallyResult<Vec<MarkSummary>> {
        sqlx::query_as("SELECT subject, score FROM marks WHERE parent_id = $1 ORDER BY id")
            .bind(key)
            .fetch_all(conn)
            .await
            .context(MakeQuerySnafu)
    }

    /// A read-only snapshot, so a page and its counts agree with each other.
    async fn get_snapshot(&self) -> TallyResult<Transaction<'static, Postgres>> {
        let mut transaction = self.get_transaction().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *transaction)
            .await
            .context(MakeQuerySnafu)?;
        Ok(transaction)
    }

    /// Newest first, with the total number of students.
    async fn page_of_students(
        page: Page,
        conn: &mut PgConnection,
    ) -> TallyResult<(Vec<Student>, u64)> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;

        let students = sqlx::query_as(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok((students, u64::try_from(count).unwrap_or_default()))
    }

    async fn named_marks(
        &self,
        key: Option<i32>,
        subject: Option<String>,
    ) -> TallyResult<Vec<Mark>> {
        sqlx::query_as(
            "SELECT m.id, m.parent_id, m.subject, m.score, COALESCE(s.name, m.name, $3) AS name, \
             m.created_at, m.updated_at \
             FROM marks m LEFT JOIN students s ON s.parent_id = m.parent_id \
             WHERE ($1::int IS NULL OR m.parent_id = $1) \
             AND ($2::text IS NULL OR m.subject = $2) \
             ORDER BY m.parent_id, m.id",
        )
        .bind(key)
        .bind(subject)
        .bind(UNKNOWN_STUDENT_NAME)
        .fetch_all(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }
}

/// Unique violations on insert mean the caller picked a `parentId` that's
/// already taken.
fn insert_student_error(source: sqlx::Error) -> TallyError {
    if source
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        TallyError::DuplicateParentId
    } else {
        TallyError::MakeQuery { source }
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn create_student(
        &self,
        student: NewStudent,
        marks: Vec<NewMark>,
    ) -> TallyResult<StudentWithMarks> {
        let NewStudent {
            parent_id,
            name,
            email,
            age,
        } = student;

        let mut transaction = self.get_transaction().await?;

        let student: Student = sqlx::query_as(&format!(
            "INSERT INTO students (parent_id, name, email, age) \
             VALUES (COALESCE($1, nextval('students_parent_id_seq')::int), $2, $3, $4) \
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(parent_id)
        .bind(&name)
        .bind(email.as_str())
        .bind(age)
        .fetch_one(&mut *transaction)
        .await
        .map_err(insert_student_error)?;

        if parent_id.is_some() {
            Self::advance_parent_id_seq(student.parent_id, &mut transaction).await?;
        }

        let marks = Self::insert_marks(student.parent_id, &name, marks, &mut transaction).await?;
        transaction.commit().await.context(CommitTransactionSnafu)?;

        Ok(StudentWithMarks {
            student,
            marks: marks.iter().map(MarkSummary::from).collect(),
        })
    }

    async fn list_students(&self, page: Page) -> TallyResult<(Vec<Student>, u64)> {
        let mut snapshot = self.get_snapshot().await?;
        let listed = Self::page_of_students(page, &mut snapshot).await?;
        snapshot.commit().await.context(CommitTransactionSnafu)?;

        Ok(listed)
    }

    async fn list_students_with_marks(
        &self,
        page: Page,
    ) -> TallyResult<(Vec<StudentWithMarks>, u64)> {
        let mut snapshot = self.get_snapshot().await?;
        let (students, total) = Self::page_of_students(page, &mut snapshot).await?;

        let keys: Vec<i32> = students.iter().map(|student| student.parent_id).collect();
        let rows: Vec<KeyedSummary> = sqlx::query_as(
            "SELECT parent_id, subject, score FROM marks WHERE parent_id = ANY($1) ORDER BY id",
        )
        .bind(keys)
        .fetch_all(&mut *snapshot)
        .await
        .context(MakeQuerySnafu)?;
        snapshot.commit().await.context(CommitTransactionSnafu)?;

        let mut by_key: HashMap<i32, Vec<MarkSummary>> = HashMap::new();
        for KeyedSummary {
            parent_id,
            subject,
            score,
        } in rows
        {
            by_key
                .entry(parent_id)
                .or_default()
                .push(MarkSummary { subject, score });
        }

        let students = students
            .into_iter()
            .map(|student| StudentWithMarks {
                marks: by_key.remove(&student.parent_id).unwrap_or_default(),
                student,
            })
            .collect();

        Ok((students, total))
    }

    async fn get_student(&self, key: i32) -> TallyResult<Option<StudentWithMarks>> {
        let mut conn = self.pool.acquire().await.context(GetDatabaseConnectionSnafu)?;

        let Some(student) = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE parent_id = $1"
        ))
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .context(MakeQuerySnafu)?
        else {
            return Ok(None);
        };

        let marks = Self::summaries_for(key, &mut conn).await?;
        Ok(Some(StudentWithMarks { student, marks }))
    }

    async fn student_exists(&self, key: i32) -> TallyResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM students WHERE parent_id = $1)")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn update_student(
        &self,
        key: i32,
        changes: StudentChanges,
        marks: Option<Vec<NewMark>>,
    ) -> TallyResult<Option<StudentWithMarks>> {
        let StudentChanges { name, email, age } = changes;

        let mut transaction = self.get_transaction().await?;

        let Some(student) = sqlx::query_as::<_, Student>(&format!(
            "UPDATE students SET name = COALESCE($2, name), email = COALESCE($3, email), \
             age = COALESCE($4, age), updated_at = now() \
             WHERE parent_id = $1 RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(key)
        .bind(name)
        .bind(email.as_ref().map(|email| email.as_str().to_string()))
        .bind(age)
        .fetch_optional(&mut *transaction)
        .await
        .context(MakeQuerySnafu)?
        else {
            return Ok(None);
        };

        if let Some(marks) = marks {
            sqlx::query("DELETE FROM marks WHERE parent_id = $1")
                .bind(key)
                .execute(&mut *transaction)
                .await
                .context(MakeQuerySnafu)?;
            Self::insert_marks(key, &student.name, marks, &mut transaction).await?;
        }

        let marks = Self::summaries_for(key, &mut transaction).await?;
        transaction.commit().await.context(CommitTransactionSnafu)?;

        Ok(Some(StudentWithMarks { student, marks }))
    }

    async fn delete_student(&self, key: i32) -> TallyResult<Option<Student>> {
        sqlx::query_as(&format!(
            "DELETE FROM students WHERE parent_id = $1 RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }
}

#[async_trait]
impl MarkStore for PgStore {
    async fn add_marks(&self, key: i32, marks: Vec<NewMark>) -> TallyResult<Option<Vec<Mark>>> {
        let mut transaction = self.get_transaction().await?;

        let Some(name) = Self::lock_student_name(key, &mut transaction).await? else {
            return Ok(None);
        };
        let created = Self::insert_marks(key, &name, marks, &mut transaction).await?;

        transaction.commit().await.context(CommitTransactionSnafu)?;
        Ok(Some(created))
    }

    async fn marks_for_student(&self, key: i32) -> TallyResult<Option<Vec<Mark>>> {
        if !self.student_exists(key).await? {
            return Ok(None);
        }

        self.named_marks(Some(key), None).await.map(Some)
    }

    async fn replace_marks(
        &self,
        key: i32,
        marks: Vec<NewMark>,
    ) -> TallyResult<Option<Vec<Mark>>> {
        let mut transaction = self.get_transaction().await?;

        let Some(name) = Self::lock_student_name(key, &mut transaction).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM marks WHERE parent_id = $1")
            .bind(key)
            .execute(&mut *transaction)
            .await
            .context(MakeQuerySnafu)?;
        let created = Self::insert_marks(key, &name, marks, &mut transaction).await?;

        transaction.commit().await.context(CommitTransactionSnafu)?;
        Ok(Some(created))
    }

    async fn delete_marks(
        &self,
        key: i32,
        subject: Option<String>,
    ) -> TallyResult<Option<Vec<Mark>>> {
        let mut transaction = self.get_transaction().await?;

        if Self::lock_student_name(key, &mut transaction).await?.is_none() {
            return Ok(None);
        }

        let deleted = sqlx::query_as(&format!(
            "DELETE FROM marks WHERE parent_id = $1 AND ($2::text IS NULL OR subject = $2) \
             RETURNING {MARK_COLUMNS}"
        ))
        .bind(key)
        .bind(subject)
        .fetch_all(&mut *transaction)
        .await
        .context(MakeQuerySnafu)?;

        transaction.commit().await.context(CommitTransactionSnafu)?;
        Ok(Some(deleted))
    }

    async fn all_marks_with_names(&self, subject: Option<String>) -> TallyResult<Vec<Mark>> {
        self.named_marks(None, subject).await
    }
}
