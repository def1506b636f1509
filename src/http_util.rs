use crate::errors::{AgentError, ErrorKind};
use actix_web::{HttpResponse, ResponseError};
use anyhow::Result;
use log::{error, warn};
use serde::Serialize;

/// Trait for converting service results into HTTP responses
pub trait ServiceResultResponse {
    fn into_response(self) -> HttpResponse;
}

impl ServiceResultResponse for () {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().finish()
    }
}

impl ServiceResultResponse for String {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().body(self)
    }
}

/// Wrapper answering with the JSON encoding of its content.
pub struct JsonBody<T>(pub T);

impl<T> ServiceResultResponse for JsonBody<T>
where
    T: Serialize,
{
    fn into_response(self) -> HttpResponse {
        match serde_json::to_string(&self.0) {
            Ok(json) => HttpResponse::Ok()
                .content_type("application/json")
                .body(json),
            Err(e) => {
                error!("failed to serialize response: {e:#}");
                HttpResponse::InternalServerError().body("failed to serialize response")
            }
        }
    }
}

/// Handle Result and convert data to Response
///
/// # Arguments
/// * `result` - The Result to handle
/// * `operation` - Context message describing the operation
///
/// # Returns
/// * `HttpResponse` - The ServiceResultResponse or HttpResponse::InternalServerError
pub fn handle_service_result<T>(result: Result<T>, operation: &str) -> HttpResponse
where
    T: ServiceResultResponse,
{
    match result {
        Ok(data) => data.into_response(),
        Err(e) => {
            error!("{operation} failed: {e:#}");
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

/// Like [`handle_service_result`], with the status derived from the error kind.
pub fn handle_agent_result<T>(result: Result<T, AgentError>) -> HttpResponse
where
    T: ServiceResultResponse,
{
    match result {
        Ok(data) => data.into_response(),
        Err(e) => {
            if e.kind() == ErrorKind::Invalid {
                warn!("{e}");
            } else {
                error!("{e}");
            }
            e.error_response()
        }
    }
}
