mod codex;
mod local;
mod onecompiler;
mod programiz;
mod remote;

pub use codex::CodexApi;
pub use local::LocalProvider;
pub use onecompiler::OneCompilerApi;
pub use programiz::ProgramizApi;
pub use remote::{INVALID_JSON_RESPONSE, RemoteApi, RemoteProvider, parse_body};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use thiserror::Error;

use crate::broker::{CompileRequest, NormalizedResult};
use crate::config::{LocalConfig, ProviderConfig, RemoteConfig};
use crate::sandbox::SandboxExecutor;

/// Transport-level failures; the broker moves on to the next provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Unavailable(String),
}

/// A backend able to compile and run Kotlin, seen through one uniform shape
///
/// Any answer a provider manages to produce is returned as `Ok`, including
/// compile and runtime failures. `Err` means the provider could not be
/// reached or understood.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Upper bound the broker allows for one `invoke`
    fn deadline(&self) -> Duration;

    async fn invoke(&self, request: &CompileRequest) -> Result<NormalizedResult, ProviderError>;

    async fn is_available(&self) -> bool {
        true
    }
}

/// Builds the providers in the configured priority order
pub fn build_providers(
    entries: &[ProviderConfig],
    remote: &RemoteConfig,
    local: &LocalConfig,
) -> Result<Vec<Arc<dyn Provider>>> {
    if entries.is_empty() {
        bail!("At least one provider must be configured");
    }

    let client = reqwest::Client::builder()
        .timeout(remote.time_limit.as_duration())
        .build()?;
    let mut executor: Option<Arc<SandboxExecutor>> = None;

    let providers = entries
        .iter()
        .map(|entry| -> Arc<dyn Provider> {
            match entry {
                ProviderConfig::Codex { endpoint } => Arc::new(RemoteProvider::new(
                    CodexApi::new(endpoint.clone()),
                    client.clone(),
                    remote,
                )),
                ProviderConfig::OneCompiler { endpoint } => Arc::new(RemoteProvider::new(
                    OneCompilerApi::new(endpoint.clone()),
                    client.clone(),
                    remote,
                )),
                ProviderConfig::Programiz { endpoint } => Arc::new(RemoteProvider::new(
                    ProgramizApi::new(endpoint.clone()),
                    client.clone(),
                    remote,
                )),
                ProviderConfig::Local => {
                    let executor = executor
                        .get_or_insert_with(|| Arc::new(SandboxExecutor::new(local.clone())));
                    Arc::new(LocalProvider::new(executor.clone()))
                }
            }
        })
        .collect();

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_build_providers_keeps_declared_order() {
        let config: Config = serde_json::from_str(
            r#"{ "providers": [ { "kind": "local" }, { "kind": "programiz" }, { "kind": "codex" } ] }"#,
        )
        .unwrap();
        let providers = build_providers(&config.providers, &config.remote, &config.local).unwrap();
        let names: Vec<_> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Local", "Programiz", "CodeX"]);
    }

    #[test]
    fn test_build_providers_rejects_empty_list() {
        let config = Config::default();
        assert!(build_providers(&[], &config.remote, &config.local).is_err());
    }
}
