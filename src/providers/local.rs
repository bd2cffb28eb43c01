use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::{CompileRequest, NormalizedResult};
use crate::sandbox::SandboxExecutor;

use super::{Provider, ProviderError};

/// Compiles and runs on this machine's toolchain inside a sandbox session
pub struct LocalProvider {
    executor: Arc<SandboxExecutor>,
}

impl LocalProvider {
    pub fn new(executor: Arc<SandboxExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "Local"
    }

    fn deadline(&self) -> Duration {
        self.executor.deadline()
    }

    /// A sandbox still saturated after the admission wait counts as unavailable
    async fn invoke(&self, request: &CompileRequest) -> Result<NormalizedResult, ProviderError> {
        let _permit = self
            .executor
            .admit()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{e:#}")))?;

        Ok(self
            .executor
            .run_admitted(request.source_code(), request.stdin())
            .await)
    }

    async fn is_available(&self) -> bool {
        self.executor.toolchain_available()
    }
}
