use std::time::Instant;

use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;
use uuid::Uuid;

use super::ErrorResponse;
use crate::broker::{Broker, CompileRequest, ValidationError};
use crate::judge0::SubmissionResponse;
use crate::{KOTLIN_LANGUAGE_ID, create_timestamp};

#[derive(Deserialize, Debug)]
pub struct SubmissionRequest {
    pub source_code: Option<String>,
    pub language_id: Option<u32>,
    pub stdin: Option<String>,
}

impl SubmissionRequest {
    /// Checks the submission before any provider or sandbox work
    pub fn validate(self) -> Result<CompileRequest, ValidationError> {
        let source_code = match self.source_code {
            Some(source_code) if !source_code.is_empty() => source_code,
            _ => return Err(ValidationError::MissingSource),
        };

        if let Some(language_id) = self.language_id
            && language_id != KOTLIN_LANGUAGE_ID
        {
            return Err(ValidationError::UnsupportedLanguage(language_id));
        }

        CompileRequest::new(source_code, self.stdin.unwrap_or_default())
    }
}

#[post("/submissions")]
pub async fn post_submission_handler(
    broker: web::Data<Broker>,
    body: web::Json<SubmissionRequest>,
) -> impl Responder {
    let request = match body.into_inner().validate() {
        Ok(request) => request,
        Err(e) => {
            log::info!("Rejected submission: {e}");
            return HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string()));
        }
    };

    let created_at = create_timestamp();
    let start_time = Instant::now();
    let result = broker.compile(&request).await;
    let wall_time = start_time.elapsed();

    let response = SubmissionResponse::from_result(
        result,
        Uuid::new_v4().to_string(),
        wall_time,
        created_at,
        create_timestamp(),
    );
    log::info!(
        "Submission {} finished: {}",
        response.token,
        response.status.description
    );

    HttpResponse::Ok().json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_SOURCE_BYTES;

    fn submission(source: Option<&str>, language_id: Option<u32>) -> SubmissionRequest {
        SubmissionRequest {
            source_code: source.map(String::from),
            language_id,
            stdin: None,
        }
    }

    #[test]
    fn test_validation_order() {
        assert_eq!(
            submission(None, Some(71)).validate(),
            Err(ValidationError::MissingSource)
        );
        assert_eq!(
            submission(Some(""), None).validate(),
            Err(ValidationError::MissingSource)
        );
        assert_eq!(
            submission(Some("fun main() {}"), Some(71)).validate(),
            Err(ValidationError::UnsupportedLanguage(71))
        );
    }

    #[test]
    fn test_oversized_source_rejected() {
        let source = "a".repeat(MAX_SOURCE_BYTES + 1);
        assert_eq!(
            submission(Some(&source), Some(78)).validate(),
            Err(ValidationError::SourceTooLong(MAX_SOURCE_BYTES + 1))
        );
    }

    #[test]
    fn test_language_id_is_optional() {
        let request = submission(Some("fun main() {}"), None).validate().unwrap();
        assert_eq!(request.source_code(), "fun main() {}");
        assert_eq!(request.stdin(), "");
        assert_eq!(request.language_id(), 78);
    }
}
