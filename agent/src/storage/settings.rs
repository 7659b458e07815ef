//! Settings file management

use std::time::Duration;

use openapi_client::models::{Capabilities, CapabilitySpec};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to a daily rolling file under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Control plane configuration
    #[serde(default)]
    pub platform: PlatformSettings,

    /// Externally reachable base URL of this host (no port)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model container configuration
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Capabilities advertised during pairing
    #[serde(default)]
    pub pairing: PairingSettings,

    /// Local HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Task polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Interval between local deployment reconciliations in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Per-deployment health probe timeout used by reconciliation
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Enable local HTTP server
    #[serde(default = "default_true")]
    pub enable_server: bool,

    /// Enable the task poller
    #[serde(default = "default_true")]
    pub enable_poller: bool,

    /// Enable the reconciler
    #[serde(default = "default_true")]
    pub enable_reconciler: bool,
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost".to_string()
}

fn default_poll_interval() -> f64 {
    2.0
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            platform: PlatformSettings::default(),
            base_url: default_base_url(),
            deploy: DeploySettings::default(),
            pairing: PairingSettings::default(),
            server: ServerSettings::default(),
            poll_interval_secs: default_poll_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            probe_timeout_secs: default_probe_timeout(),
            enable_server: true,
            enable_poller: true,
            enable_reconciler: true,
        }
    }
}

impl Settings {
    /// Load settings from `file`; a missing file yields the defaults
    pub async fn load(file: &File) -> Result<Self, AgentError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await.map_err(|e| {
            AgentError::ConfigError(format!(
                "unable to parse {}: {}",
                file.path().display(),
                e
            ))
        })
    }

    /// Apply environment overrides (`SATELLITE_TOKEN`, `PLATFORM_URL`, ...)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("SATELLITE_TOKEN") {
            self.platform.token = Some(SecretString::from(token));
        }
        if let Some(url) = lookup("PLATFORM_URL") {
            self.platform.url = url;
        }
        if let Some(url) = lookup("BASE_URL") {
            self.base_url = url;
        }
        if let Some(image) = lookup("MODEL_IMAGE") {
            self.deploy.model_image = image;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.parse().map_err(AgentError::ConfigError)?;
        }
        if let Some(secs) = lookup("POLL_INTERVAL_SEC") {
            self.poll_interval_secs = parse_env("POLL_INTERVAL_SEC", &secs)?;
        }
        if let Some(port) = lookup("CONTAINER_PORT") {
            self.deploy.container_port = parse_env("CONTAINER_PORT", &port)?;
        }
        if let Some(port) = lookup("AUTH_PORT") {
            self.server.port = parse_env("AUTH_PORT", &port)?;
        }
        Ok(())
    }

    /// Check the settings are usable before starting any worker
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.platform.token.is_none() {
            return Err(AgentError::ConfigError(
                "satellite token is not configured (set SATELLITE_TOKEN)".to_string(),
            ));
        }
        url::Url::parse(&self.platform.url).map_err(|e| {
            AgentError::ConfigError(format!("invalid platform url {}: {}", self.platform.url, e))
        })?;
        url::Url::parse(&self.base_url).map_err(|e| {
            AgentError::ConfigError(format!("invalid base url {}: {}", self.base_url, e))
        })?;
        self.poll_interval()?;
        Ok(())
    }

    /// Poll interval as a `Duration`; must be positive and representable
    pub fn poll_interval(&self) -> Result<Duration, AgentError> {
        let invalid = || {
            AgentError::ConfigError(format!(
                "poll interval must be a positive number of seconds, got {}",
                self.poll_interval_secs
            ))
        };
        let interval = Duration::try_from_secs_f64(self.poll_interval_secs).map_err(|_| invalid())?;
        if interval.is_zero() {
            return Err(invalid());
        }
        Ok(interval)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AgentError> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::ConfigError(format!("invalid value for {}: {}", name, value)))
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|t| !t.is_empty()).map(SecretString::from))
}

/// Control plane settings
#[derive(Debug, Deserialize)]
pub struct PlatformSettings {
    /// Base URL of the control plane API
    #[serde(default = "default_platform_url")]
    pub url: String,

    /// Satellite API token
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,

    /// Timeout for each control plane request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_platform_url() -> String {
    "https://dev-api.dataforce.studio".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            url: default_platform_url(),
            token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Model container settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySettings {
    /// Image used for every model container
    #[serde(default = "default_model_image")]
    pub model_image: String,

    /// Port the model server listens on inside the container
    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// How long to wait for a new container to report healthy
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Delay between health probes
    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_ms: u64,

    /// Number of log lines captured when a container fails to become healthy
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    /// Upper bound for any single `docker` invocation
    #[serde(default = "default_docker_timeout")]
    pub docker_timeout_secs: u64,
}

fn default_model_image() -> String {
    "df-random-svc:latest".to_string()
}

fn default_container_port() -> u16 {
    8080
}

fn default_health_timeout() -> u64 {
    45
}

fn default_health_poll_interval() -> u64 {
    1000
}

fn default_log_tail_lines() -> usize {
    80
}

fn default_docker_timeout() -> u64 {
    300
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            model_image: default_model_image(),
            container_port: default_container_port(),
            health_timeout_secs: default_health_timeout(),
            health_poll_interval_ms: default_health_poll_interval(),
            log_tail_lines: default_log_tail_lines(),
            docker_timeout_secs: default_docker_timeout(),
        }
    }
}

/// Capabilities advertised to the control plane when pairing
#[derive(Debug, Clone, Deserialize)]
pub struct PairingSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

fn default_max_concurrency() -> u32 {
    2
}

fn default_labels() -> Vec<String> {
    vec!["docker".to_string(), "demo".to_string()]
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            labels: default_labels(),
        }
    }
}

impl PairingSettings {
    /// The capability descriptor sent with `pair_satellite`
    pub fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::new();
        capabilities.insert(
            "deploy".to_string(),
            CapabilitySpec {
                max_concurrency: self.max_concurrency,
                labels: self.labels.clone(),
            },
        );
        capabilities
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    7000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
