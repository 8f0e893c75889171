use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;

use crate::orchestrator::ValidationError;
use crate::types::ErrorResponse;

/// 返回给客户端的 HTTP 错误：状态码 + `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: Status::BadRequest,
            message: msg.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .respond_to(req)
    }
}
