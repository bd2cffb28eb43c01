use serde::Deserialize;
use serde_json::{Value, json};

use crate::broker::{NormalizedResult, Status};

use super::remote::{RemoteApi, decode_reply, non_empty};

/// CodeX (`api.codex.jaagrav.in`): a single `error` string signals failure
pub struct CodexApi {
    endpoint: String,
}

impl CodexApi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct CodexReply {
    output: Option<String>,
    error: Option<String>,
}

impl RemoteApi for CodexApi {
    fn name(&self) -> &'static str {
        "CodeX"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, source_code: &str, stdin: &str) -> Value {
        json!({
            "language": "kt",
            "code": source_code,
            "input": stdin,
        })
    }

    fn parse_response(&self, raw: Value) -> NormalizedResult {
        let reply: CodexReply = match decode_reply(self.name(), raw) {
            Ok(reply) => reply,
            Err(result) => return result,
        };

        match non_empty(reply.error) {
            Some(error) => NormalizedResult::failure(Status::CompilationError, error),
            None => NormalizedResult::accepted(reply.output.unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::providers::parse_body;

    #[test]
    fn test_build_request() {
        let api = CodexApi::new("http://localhost");
        assert_eq!(
            api.build_request("fun main() {}", "1 2"),
            json!({ "language": "kt", "code": "fun main() {}", "input": "1 2" })
        );
    }

    #[test]
    fn test_parse_success() {
        let api = CodexApi::new("http://localhost");
        let result = api.parse_response(json!({ "output": "hi\n", "error": "" }));
        assert_eq!(result, NormalizedResult::accepted("hi\n"));
    }

    #[test]
    fn test_parse_error_is_compilation_error() {
        let api = CodexApi::new("http://localhost");
        let result = api.parse_response(json!({ "error": "Main.kt:1:5: error: expecting '('" }));
        assert!(!result.success);
        assert_eq!(result.status, Status::CompilationError);
        assert_eq!(result.output, "");
        assert_eq!(result.error, "Main.kt:1:5: error: expecting '('");
    }

    #[test]
    fn test_parse_invalid_json_is_api_error() {
        let api = CodexApi::new("http://localhost");
        let result = api.parse_response(parse_body("Service Unavailable"));
        assert_eq!(result.status, Status::ApiError);
    }
}
