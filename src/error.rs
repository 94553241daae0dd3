use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use snafu::Snafu;
use std::num::ParseIntError;

pub type TallyResult<T> = Result<T, TallyError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TallyError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error getting db connection"))]
    GetDatabaseConnection { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error commiting SQL transaction"))]
    CommitTransaction { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    Migrate { source: sqlx::migrate::MigrateError },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse `{}` as a number", name))]
    ParseNumber {
        source: ParseIntError,
        name: &'static str,
    },
    #[snafu(display("Student not found"))]
    MissingStudent { key: i32 },
    #[snafu(display("No marks found for this student"))]
    NoMarksForStudent { key: i32 },
    #[snafu(display("No marks found for subject '{}'", subject))]
    NoMarksForSubject { key: i32, subject: String },
    #[snafu(display("A student with that parentId already exists"))]
    DuplicateParentId,
    #[snafu(display("{}", reason))]
    InvalidStudent { reason: String },
    #[snafu(display("Invalid mark at index {}: {}", index, reason))]
    InvalidMark { index: usize, reason: String },
    #[snafu(display("Marks must be an array of {{ subject, score }}"))]
    MarksNotArray,
    #[snafu(display("Subject must be a non-empty string"))]
    InvalidSubject,
    #[snafu(display("`{}` must be a positive integer, got {:?}", param, value))]
    InvalidPagination { param: &'static str, value: String },
    #[snafu(display("Malformed request body: {}", source.body_text()))]
    MalformedJson { source: JsonRejection },
    #[snafu(display("Malformed request body: {}", source))]
    MalformedBody { source: serde_json::Error },
    #[snafu(display("Invalid path: {}", source.body_text()))]
    BadPath { source: PathRejection },
    #[snafu(display("Invalid query string: {}", source.body_text()))]
    BadQuery { source: QueryRejection },
}

impl From<JsonRejection> for TallyError {
    fn from(source: JsonRejection) -> Self {
        Self::MalformedJson { source }
    }
}

impl From<PathRejection> for TallyError {
    fn from(source: PathRejection) -> Self {
        Self::BadPath { source }
    }
}

impl From<QueryRejection> for TallyError {
    fn from(source: QueryRejection) -> Self {
        Self::BadQuery { source }
    }
}

impl TallyError {
    pub fn status_code(&self) -> StatusCode {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input

        match self {
            Self::OpenDatabase { .. } | Self::GetDatabaseConnection { .. } => ISE,
            Self::Migrate { .. } => ISE,
            Self::MakeQuery { source } => match source {
                sqlx::Error::RowNotFound => NF,
                sqlx::Error::Database(db) if db.is_check_violation() => BI,
                _ => ISE,
            },
            Self::CommitTransaction { .. } => ISE,
            Self::BadEnvVar { .. } | Self::ParseNumber { .. } => ISE,
            Self::MissingStudent { .. }
            | Self::NoMarksForStudent { .. }
            | Self::NoMarksForSubject { .. } => NF,
            Self::DuplicateParentId => BI,
            Self::InvalidStudent { .. }
            | Self::InvalidMark { .. }
            | Self::MarksNotArray
            | Self::InvalidSubject
            | Self::InvalidPagination { .. } => BI,
            Self::MalformedJson { .. }
            | Self::MalformedBody { .. }
            | Self::BadPath { .. }
            | Self::BadQuery { .. } => BI,
        }
    }
}

impl IntoResponse for TallyError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let message = if status_code.is_server_error() {
            error!(?self, "Error!");
            "Internal server error".to_string()
        } else {
            debug!(%self, %status_code, "Rejected request");
            self.to_string()
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}
