use crate::{
    data::{
        Page, PageQuery, Paged,
        student::{AddStudentForm, DeletedStudent, Student, StudentWithMarks, UpdateStudentForm},
    },
    error::{MissingStudentSnafu, TallyResult},
    extract::{ApiJson, ApiQuery, Key},
    state::TallyState,
};
use axum::{Json, extract::State, http::StatusCode};
use snafu::{OptionExt, ensure};

pub async fn post_add_student(
    State(state): State<TallyState>,
    ApiJson(form): ApiJson<AddStudentForm>,
) -> TallyResult<(StatusCode, Json<StudentWithMarks>)> {
    let (student, marks) = form.validate()?;
    let created = state.students().create_student(student, marks).await?;

    info!(
        parent_id = created.student.parent_id,
        marks = created.marks.len(),
        "Added student"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_all_students(
    State(state): State<TallyState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> TallyResult<Json<Paged<Student>>> {
    let page = Page::from_query(&query)?;
    let (students, total) = state.students().list_students(page).await?;

    Ok(Json(page.paged(students, total)))
}

pub async fn get_student(
    State(state): State<TallyState>,
    Key(key): Key,
) -> TallyResult<Json<StudentWithMarks>> {
    state
        .students()
        .get_student(key)
        .await?
        .context(MissingStudentSnafu { key })
        .map(Json)
}

pub async fn put_update_student(
    State(state): State<TallyState>,
    Key(key): Key,
    ApiJson(form): ApiJson<UpdateStudentForm>,
) -> TallyResult<Json<StudentWithMarks>> {
    ensure!(
        state.students().student_exists(key).await?,
        MissingStudentSnafu { key }
    );
    let (changes, marks) = form.validate()?;
    let replacing_marks = marks.is_some();

    let updated = state
        .students()
        .update_student(key, changes, marks)
        .await?
        .context(MissingStudentSnafu { key })?;

    info!(parent_id = key, replacing_marks, "Updated student");
    Ok(Json(updated))
}

pub async fn delete_student(
    State(state): State<TallyState>,
    Key(key): Key,
) -> TallyResult<Json<DeletedStudent>> {
    let student = state
        .students()
        .delete_student(key)
        .await?
        .context(MissingStudentSnafu { key })?;

    info!(parent_id = key, "Deleted student");
    Ok(Json(student.into()))
}
