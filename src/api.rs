use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::{Error as JsonError, Json};
use rocket::{catch, get, post, Request, State};
use tracing::debug;

use crate::app_state::AppState;
use crate::engine::InferenceError;
use crate::error::ApiError;
use crate::orchestrator::{self, AskOutcome, ValidationError};
use crate::types::{AskRequest, AskResponse, ErrorResponse, HealthResponse};

#[get("/health")]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// 请求体解析失败（JSON 语法错误、字段类型不对、缺 question）也走 400，
/// 所以这里用 `Result` 接住 Json 的错误，而不是交给 Rocket 默认的 422。
#[post("/api/ask", data = "<req>")]
pub async fn ask(
    state: &State<Arc<AppState>>,
    req: Result<Json<AskRequest>, JsonError<'_>>,
) -> Result<(Status, Json<AskResponse>), ApiError> {
    let req = req.map_err(|e| ValidationError::MalformedBody(e.to_string()))?;

    let outcome = orchestrator::handle(state, req.into_inner()).await?;
    let status = outcome_status(&outcome, state.config.degrade_on_failure);
    debug!(stage = ?outcome.stage, status = status.code, "ask finished");

    Ok((status, Json(outcome.response)))
}

/// 降级开着时一律 200；关掉时按失败类型给 502 / 503
fn outcome_status(outcome: &AskOutcome, degrade_on_failure: bool) -> Status {
    match &outcome.failure {
        None => Status::Ok,
        Some(_) if degrade_on_failure => Status::Ok,
        Some(InferenceError::Upstream(_)) => Status::BadGateway,
        Some(_) => Status::ServiceUnavailable,
    }
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: "bad request".to_string(),
    })
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: "route not found".to_string(),
    })
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: "internal server error".to_string(),
    })
}
