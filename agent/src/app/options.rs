//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::docker;
use crate::errors::AgentError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::tasks::TaskOptions;
use crate::workers::{poller, reconciler};

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Control plane connection
    pub platform: PlatformOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Enable local HTTP server
    pub enable_server: bool,

    /// Enable task poller
    pub enable_poller: bool,

    /// Enable deployment reconciler
    pub enable_reconciler: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Task poller options
    pub poller: poller::Options,

    /// Reconciler options
    pub reconciler: reconciler::Options,

    /// Docker runtime options
    pub docker: docker::Options,

    /// Task handler settings
    pub tasks: TaskOptions,
}

impl AppOptions {
    /// Build options from validated settings
    pub fn from_settings(settings: Settings, layout: StorageLayout) -> Result<Self, AgentError> {
        let tasks = TaskOptions::from_settings(&settings);
        let poll_interval = settings.poll_interval()?;
        let token = settings.platform.token.ok_or_else(|| {
            AgentError::ConfigError("satellite token is not configured".to_string())
        })?;
        let probe_timeout = Duration::from_secs(settings.probe_timeout_secs);

        Ok(Self {
            lifecycle: LifecycleOptions::default(),
            tasks,
            platform: PlatformOptions {
                url: settings.platform.url,
                token,
                request_timeout: Duration::from_secs(settings.platform.request_timeout_secs),
            },
            layout,
            enable_server: settings.enable_server,
            enable_poller: settings.enable_poller,
            enable_reconciler: settings.enable_reconciler,
            server: ServerOptions {
                host: settings.server.host,
                port: settings.server.port,
                ..Default::default()
            },
            poller: poller::Options {
                interval: poll_interval,
            },
            reconciler: reconciler::Options {
                interval: Duration::from_secs(settings.reconcile_interval_secs),
                probe_timeout,
            },
            docker: docker::Options {
                command_timeout: Duration::from_secs(settings.deploy.docker_timeout_secs),
                health_poll_interval: Duration::from_millis(settings.deploy.health_poll_interval_ms),
                ..Default::default()
            },
        })
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown; an in-flight deploy may need
    /// its full health timeout to finish
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(90),
        }
    }
}

/// Control plane connection options
#[derive(Debug)]
pub struct PlatformOptions {
    /// Control plane base URL
    pub url: String,

    /// Satellite token sent as the bearer credential
    pub token: SecretString,

    /// Timeout for each control plane request
    pub request_timeout: Duration,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Timeout for requests forwarded to model servers
    pub proxy_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7000,
            proxy_timeout: Duration::from_secs(45),
        }
    }
}
