use serde::Deserialize;
use serde_json::{Value, json};

use crate::broker::{NormalizedResult, Status};

use super::remote::{RemoteApi, decode_reply};

/// Programiz: an explicit `success` flag, absent meaning failure
pub struct ProgramizApi {
    endpoint: String,
}

impl ProgramizApi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ProgramizReply {
    success: Option<bool>,
    output: Option<String>,
    error: Option<String>,
}

impl RemoteApi for ProgramizApi {
    fn name(&self) -> &'static str {
        "Programiz"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, source_code: &str, stdin: &str) -> Value {
        json!({
            "language": "kotlin",
            "version": "latest",
            "code": source_code,
            "input": stdin,
        })
    }

    fn parse_response(&self, raw: Value) -> NormalizedResult {
        let reply: ProgramizReply = match decode_reply(self.name(), raw) {
            Ok(reply) => reply,
            Err(result) => return result,
        };

        let output = reply.output.unwrap_or_default();
        let error = reply.error.unwrap_or_default();
        if reply.success.unwrap_or(false) {
            NormalizedResult::accepted(output).with_error(error)
        } else {
            NormalizedResult::failure(Status::CompilationError, error).with_output(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_build_request() {
        let api = ProgramizApi::new("http://localhost");
        assert_eq!(
            api.build_request("fun main() {}", "5"),
            json!({ "language": "kotlin", "version": "latest", "code": "fun main() {}", "input": "5" })
        );
    }

    #[test]
    fn test_parse_success_flag() {
        let api = ProgramizApi::new("http://localhost");
        let result = api.parse_response(json!({ "success": true, "output": "hi\n" }));
        assert_eq!(result, NormalizedResult::accepted("hi\n"));

        let result = api.parse_response(json!({ "success": false, "error": "syntax error" }));
        assert_eq!(result.status, Status::CompilationError);
        assert_eq!(result.error, "syntax error");
    }

    #[test]
    fn test_missing_success_flag_is_failure() {
        let api = ProgramizApi::new("http://localhost");
        let result = api.parse_response(json!({ "output": "partial" }));
        assert!(!result.success);
        assert_eq!(result.status, Status::CompilationError);
        assert_eq!(result.output, "partial");
    }
}
