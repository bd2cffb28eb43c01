use serde::Deserialize;
use serde_json::{Value, json};

use crate::broker::{NormalizedResult, Status};

use super::remote::{RemoteApi, decode_reply, non_empty};

/// OneCompiler: sources travel as a file list, failures as `exception`
pub struct OneCompilerApi {
    endpoint: String,
}

impl OneCompilerApi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct OneCompilerReply {
    stdout: Option<String>,
    stderr: Option<String>,
    exception: Option<String>,
}

impl RemoteApi for OneCompilerApi {
    fn name(&self) -> &'static str {
        "OneCompiler"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, source_code: &str, stdin: &str) -> Value {
        json!({
            "language": "kotlin",
            "stdin": stdin,
            "files": [{ "name": "main.kt", "content": source_code }],
        })
    }

    fn parse_response(&self, raw: Value) -> NormalizedResult {
        let reply: OneCompilerReply = match decode_reply(self.name(), raw) {
            Ok(reply) => reply,
            Err(result) => return result,
        };

        let stdout = reply.stdout.unwrap_or_default();
        let stderr = non_empty(reply.stderr);
        match non_empty(reply.exception) {
            Some(exception) => NormalizedResult::failure(
                Status::CompilationError,
                stderr.unwrap_or(exception),
            )
            .with_output(stdout),
            None => NormalizedResult::accepted(stdout).with_error(stderr.unwrap_or_default()),
        }
    }
}
