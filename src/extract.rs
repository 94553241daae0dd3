//! Extractors whose rejections come back as JSON `{error}` bodies like every
//! other failure.

use crate::error::TallyError;
use axum::extract::{FromRequest, FromRequestParts, Path, Query};
use serde::Deserialize;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(TallyError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(TallyError))]
pub struct ApiQuery<T>(pub T);

/// The `:key` segment, a student's `parentId`.
#[derive(FromRequestParts, Deserialize)]
#[from_request(via(Path), rejection(TallyError))]
pub struct Key(pub i32);
