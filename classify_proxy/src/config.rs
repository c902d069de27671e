use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_body_limit_bytes() -> usize {
    50 * 1024 * 1024
}

// Without a `url` the proxy either simulates a model or refuses with
// MODEL_NOT_CONFIGURED.
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_simulate_when_unconfigured")]
    pub simulate_when_unconfigured: bool,
    #[serde(default = "default_simulated_latency_ms")]
    pub simulated_latency_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_ms: default_timeout_ms(),
            simulate_when_unconfigured: default_simulate_when_unconfigured(),
            simulated_latency_ms: default_simulated_latency_ms(),
        }
    }
}

// Blank env vars count as unset.
fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_simulate_when_unconfigured() -> bool {
    true
}

fn default_simulated_latency_ms() -> u64 {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyConfig {
    #[serde(default = "default_max_top_k")]
    pub max_top_k: u32,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            max_top_k: default_max_top_k(),
        }
    }
}

fn default_max_top_k() -> u32 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), &environment)
}

pub fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("CLASSIFY")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("inference.url", std::env::var("INFERENCE_URL").ok())?
        .set_override_option("inference.api_key", std::env::var("INFERENCE_API_KEY").ok())?
        .build()?;

    config.try_deserialize::<Config>()
}
