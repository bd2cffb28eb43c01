mod service;
mod submissions;

pub use service::{health_handler, index_handler, languages_handler};
pub use submissions::{SubmissionRequest, post_submission_handler};

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse::new("Invalid JSON request"));
    InternalError::from_response(err, response).into()
}

/// Answers CORS preflights on any path and 404s everything else
pub async fn fallback_handler(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        HttpResponse::Ok().finish()
    } else {
        HttpResponse::NotFound().json(ErrorResponse::new("Not found"))
    }
}

/// Registers every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(index_handler)
        .service(health_handler)
        .service(languages_handler)
        .service(post_submission_handler)
        .default_service(web::to(fallback_handler));
}
