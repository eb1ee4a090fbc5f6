//! Error → HTTP response mapping (spec §7): validation/not-found/
//! authorization failures are 400, storage/internal faults are 500, body
//! is always `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use grove_core::error::GroveError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(pub GroveError);

impl From<GroveError> for ApiError {
    fn from(e: GroveError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

fn status_for(e: &GroveError) -> StatusCode {
    use GroveError::*;
    match e {
        Storage(_) | StorageLocked | Serialization(_) | Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}
