use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;

use crate::cache::{CacheKey, ResultCache};
use crate::providers::{Provider, ProviderError};
use crate::{KOTLIN_LANGUAGE_ID, MAX_SOURCE_BYTES};

/// Outcome category shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Accepted,
    CompilationError,
    RuntimeError,
    ApiError,
    ServiceError,
    InternalError,
}

impl Status {
    pub fn description(self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::CompilationError => "Compilation Error",
            Self::RuntimeError => "Runtime Error",
            Self::ApiError => "API Error",
            Self::ServiceError => "Service Error",
            Self::InternalError => "Internal Error",
        }
    }
}

/// The canonical outcome every provider is normalized into
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub status: Status,
    pub elapsed_seconds: Option<f64>,
    pub memory: Option<u64>,
}

impl NormalizedResult {
    pub fn accepted(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            status: Status::Accepted,
            elapsed_seconds: None,
            memory: None,
        }
    }

    /// A failed outcome with empty output
    pub fn failure(status: Status, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            status,
            elapsed_seconds: None,
            memory: None,
        }
    }

    pub fn service_unavailable() -> Self {
        Self::failure(
            Status::ServiceError,
            "All compiler services are temporarily unavailable",
        )
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn with_elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source_code is required")]
    MissingSource,
    #[error("Only Kotlin (language_id: 78) is supported")]
    UnsupportedLanguage(u32),
    #[error("Source code is too long ({0} bytes)")]
    SourceTooLong(usize),
}

/// A validated request, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    source_code: String,
    stdin: String,
}

impl CompileRequest {
    pub fn new(
        source_code: impl Into<String>,
        stdin: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let source_code = source_code.into();
        if source_code.is_empty() {
            return Err(ValidationError::MissingSource);
        }
        if source_code.len() > MAX_SOURCE_BYTES {
            return Err(ValidationError::SourceTooLong(source_code.len()));
        }
        Ok(Self {
            source_code,
            stdin: stdin.into(),
        })
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn stdin(&self) -> &str {
        &self.stdin
    }

    pub fn language_id(&self) -> u32 {
        KOTLIN_LANGUAGE_ID
    }
}

/// Availability of one configured provider, as reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub available: bool,
}

/// Drives the ordered provider list against the result cache
///
/// Providers are tried in declaration order; the first one that answers wins,
/// whatever the answer says. A provider that errors out or misses its deadline
/// is skipped in favor of the next one.
pub struct Broker {
    providers: Vec<Arc<dyn Provider>>,
    cache: Arc<dyn ResultCache>,
    cache_failed_results: bool,
}

impl Broker {
    pub fn new(providers: Vec<Arc<dyn Provider>>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            providers,
            cache,
            cache_failed_results: true,
        }
    }

    /// Whether results with `success == false` are memoized as well
    pub fn cache_failed_results(mut self, enabled: bool) -> Self {
        self.cache_failed_results = enabled;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.cache
    }

    /// Compile and run `request`, always producing a result
    pub async fn compile(&self, request: &CompileRequest) -> NormalizedResult {
        let key = CacheKey::new(request.source_code(), request.stdin());
        if let Some(hit) = self.cache.get(&key) {
            log::info!("Cache hit for {key}");
            return hit;
        }

        for provider in &self.providers {
            log::info!("Trying {}...", provider.name());

            let deadline = provider.deadline();
            let attempt = match timeout(deadline, provider.invoke(request)).await {
                Ok(attempt) => attempt,
                Err(_) => Err(ProviderError::Timeout(deadline)),
            };

            match attempt {
                Ok(result) => {
                    log::info!(
                        "{} answered with {}",
                        provider.name(),
                        result.status.description()
                    );
                    if result.success || self.cache_failed_results {
                        self.cache.put(key, result.clone());
                    }
                    return result;
                }
                Err(e) => {
                    log::warn!("{} failed: {e}", provider.name());
                }
            }
        }

        log::error!("All {} providers failed for {key}", self.providers.len());
        NormalizedResult::service_unavailable()
    }

    pub async fn provider_health(&self) -> Vec<ProviderHealth> {
        let mut health = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            health.push(ProviderHealth {
                name: provider.name().to_string(),
                available: provider.is_available().await,
            });
        }
        health
    }
}
