use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "ktjudge", version = "2.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Address to listen on, overrides the configuration file
    #[arg(long = "bind-address")]
    pub bind_address: Option<String>,

    /// Port to listen on, overrides the configuration file
    #[arg(long = "port", short = 'p', env = "PORT")]
    pub port: Option<u16>,

    /// Compile and run locally instead of going through remote providers
    #[arg(long = "local", default_value_t = false)]
    pub local: bool,
}

impl CliArgs {
    /// Load the configuration file (if any) and apply command line overrides
    pub fn to_config(&self) -> std::io::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)?
            }
            None => Config::default(),
        };

        if let Some(address) = &self.bind_address {
            config.server.bind_address = Some(address.clone());
        }
        if let Some(port) = self.port {
            config.server.bind_port = Some(port);
        }
        if self.local {
            config.providers = vec![ProviderConfig::Local];
        }

        Ok(config)
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    /// Providers in priority order, first match wins
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            broker: BrokerConfig::default(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            providers: vec![
                ProviderConfig::Codex {
                    endpoint: default_codex_endpoint(),
                },
                ProviderConfig::OneCompiler {
                    endpoint: default_onecompiler_endpoint(),
                },
                ProviderConfig::Programiz {
                    endpoint: default_programiz_endpoint(),
                },
            ],
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    /// Every cached result is dropped on this interval
    pub cache_clear_interval: Second,
    /// Whether results with `success == false` are memoized too
    pub cache_failed_results: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cache_clear_interval: Second(3600),
            cache_failed_results: true,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub time_limit: Second,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            time_limit: Second(30),
            user_agent: "KotlinCompilerAPI/1.0".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LocalConfig {
    /// Parent of the per-request workspaces, defaults to the system temp dir
    pub workspace_root: Option<PathBuf>,
    pub source_file: String,
    pub artifact_file: String,
    /// `%INPUT%`, `%OUTPUT%` and `%HEAP%` are substituted
    pub compile_command: Vec<String>,
    pub run_command: Vec<String>,
    pub compile_time_limit: MilliSecond,
    pub run_time_limit: MilliSecond,
    /// Passed to the compiler JVM through `JAVA_OPTS` when set
    pub compile_memory_limit: Option<MegaByte>,
    pub run_memory_limit: MegaByte,
    /// Per stream cap on captured stdout/stderr
    pub output_limit: ByteSize,
    /// Unbounded when absent
    pub max_concurrent_sessions: Option<usize>,
    /// Longest wait for a free session slot before the local provider gives up
    pub admission_timeout: MilliSecond,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            source_file: "Main.kt".to_string(),
            artifact_file: "program.jar".to_string(),
            compile_command: ["kotlinc", "%INPUT%", "-include-runtime", "-d", "%OUTPUT%"]
                .map(String::from)
                .to_vec(),
            run_command: ["java", "-Xmx%HEAP%m", "-jar", "%OUTPUT%"]
                .map(String::from)
                .to_vec(),
            compile_time_limit: MilliSecond(10_000),
            run_time_limit: MilliSecond(15_000),
            compile_memory_limit: None,
            run_memory_limit: MegaByte(64),
            output_limit: ByteSize(1024 * 1024),
            max_concurrent_sessions: None,
            admission_timeout: MilliSecond(60_000),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Codex {
        #[serde(default = "default_codex_endpoint")]
        endpoint: String,
    },
    #[serde(rename = "onecompiler")]
    OneCompiler {
        #[serde(default = "default_onecompiler_endpoint")]
        endpoint: String,
    },
    Programiz {
        #[serde(default = "default_programiz_endpoint")]
        endpoint: String,
    },
    Local,
}

fn default_codex_endpoint() -> String {
    "https://api.codex.jaagrav.in".to_string()
}

fn default_onecompiler_endpoint() -> String {
    "https://onecompiler.com/api/code/exec".to_string()
}

fn default_programiz_endpoint() -> String {
    "https://api.programiz.com/compiler-api/compile".to_string()
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Second(pub u64);

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MegaByte(pub u32);

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl Second {
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl MilliSecond {
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}
