use crate::{
    data::{
        Page, PageQuery, Paged,
        mark::{DeleteMarksForm, DeletedMarks, Mark, MarksForm, SubjectQuery, parse_marks},
        student::StudentWithMarks,
    },
    error::{
        MalformedBodySnafu, MissingStudentSnafu, NoMarksForStudentSnafu, NoMarksForSubjectSnafu,
        TallyResult,
    },
    extract::{ApiJson, ApiQuery, Key},
    state::TallyState,
};
use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use snafu::{OptionExt, ResultExt, ensure};

pub async fn post_add_marks(
    State(state): State<TallyState>,
    Key(key): Key,
    ApiJson(form): ApiJson<MarksForm>,
) -> TallyResult<(StatusCode, Json<Vec<Mark>>)> {
    ensure!(
        state.students().student_exists(key).await?,
        MissingStudentSnafu { key }
    );
    let marks = parse_marks(form.marks.as_ref())?;

    let created = state
        .marks()
        .add_marks(key, marks)
        .await?
        .context(MissingStudentSnafu { key })?;

    info!(parent_id = key, count = created.len(), "Added marks");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_student_marks(
    State(state): State<TallyState>,
    Key(key): Key,
) -> TallyResult<Json<Vec<Mark>>> {
    let marks = state
        .marks()
        .marks_for_student(key)
        .await?
        .context(MissingStudentSnafu { key })?;
    ensure!(!marks.is_empty(), NoMarksForStudentSnafu { key });

    Ok(Json(marks))
}

pub async fn put_update_marks(
    State(state): State<TallyState>,
    Key(key): Key,
    ApiJson(form): ApiJson<MarksForm>,
) -> TallyResult<Json<Vec<Mark>>> {
    ensure!(
        state.students().student_exists(key).await?,
        MissingStudentSnafu { key }
    );
    let marks = parse_marks(form.marks.as_ref())?;

    let replaced = state
        .marks()
        .replace_marks(key, marks)
        .await?
        .context(MissingStudentSnafu { key })?;

    info!(parent_id = key, count = replaced.len(), "Replaced marks");
    Ok(Json(replaced))
}

/// With a `{subject}` body only that subject's marks go, otherwise all of the
/// student's marks do.
pub async fn delete_marks(
    State(state): State<TallyState>,
    Key(key): Key,
    body: Bytes,
) -> TallyResult<Json<DeletedMarks>> {
    let form: DeleteMarksForm = if body.iter().all(u8::is_ascii_whitespace) {
        DeleteMarksForm::default()
    } else {
        serde_json::from_slice(&body).context(MalformedBodySnafu)?
    };
    let subject = form.subject()?;

    let deleted = state
        .marks()
        .delete_marks(key, subject.clone())
        .await?
        .context(MissingStudentSnafu { key })?;

    if deleted.is_empty() {
        return match subject {
            Some(subject) => NoMarksForSubjectSnafu { key, subject }.fail(),
            None => NoMarksForStudentSnafu { key }.fail(),
        };
    }

    info!(parent_id = key, ?subject, count = deleted.len(), "Deleted marks");
    Ok(Json(DeletedMarks::new(subject.as_deref(), deleted)))
}

pub async fn get_all_marks_with_names(
    State(state): State<TallyState>,
    ApiQuery(query): ApiQuery<SubjectQuery>,
) -> TallyResult<Json<Vec<Mark>>> {
    let marks = state
        .marks()
        .all_marks_with_names(query.subject())
        .await?;

    Ok(Json(marks))
}

pub async fn get_all_students_with_marks(
    State(state): State<TallyState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> TallyResult<Json<Paged<StudentWithMarks>>> {
    let page = Page::from_query(&query)?;
    let (students, total) = state.students().list_students_with_marks(page).await?;

    Ok(Json(page.paged(students, total)))
}
