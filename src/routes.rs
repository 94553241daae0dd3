use crate::{
    routes::{
        marks::{
            delete_marks, get_all_marks_with_names, get_all_students_with_marks,
            get_student_marks, post_add_marks, put_update_marks,
        },
        students::{
            delete_student, get_all_students, get_student, post_add_student, put_update_student,
        },
    },
    state::TallyState,
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

pub mod marks;
pub mod students;


pub fn router() -> Router<TallyState> {
    Router::new()
        .route("/api/students/add", post(post_add_student))
        .route("/api/students/viewall", get(get_all_students))
        .route("/api/students/view/{key}", get(get_student))
        .route("/api/students/update/{key}", put(put_update_student))
        .route("/api/students/delete/{key}", delete(delete_student))
        .route("/api/students/mark/add/{key}", post(post_add_marks))
        .route("/api/students/mark/view/{key}", get(get_student_marks))
        .route("/api/students/mark/update/{key}", put(put_update_marks))
        .route("/api/students/mark/delete/{key}", delete(delete_marks))
        .route(
            "/api/students/mark/viewallwithmarks",
            get(get_all_marks_with_names),
        )
        .route(
            "/api/students/mark/viewallstudents",
            get(get_all_students_with_marks),
        )
}
