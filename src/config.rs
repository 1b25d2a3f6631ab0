use std::time::Duration;

/// Default base interval for reconnection backoff
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);
/// Default reconnection attempt budget
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// Default interval between heartbeat pings
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(50_000);
/// Default outgoing heartbeat sentinel
pub const DEFAULT_PING_MESSAGE: &str = "ping";
/// Default incoming heartbeat reply sentinel
pub const DEFAULT_PONG_MESSAGE: &str = "pong";
/// Default service name used in log lines
pub const DEFAULT_SERVICE_NAME: &str = "WebSocket";

/// Auto-reconnection option as supplied by the caller.
///
/// Normalized into a [`ReconnectConfig`] when the configuration is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoReconnect {
    /// Never reconnect
    #[default]
    Disabled,
    /// Reconnect with the default interval and attempt budget
    Enabled,
    /// Reconnect with overrides; missing fields take the defaults
    Custom {
        interval: Option<Duration>,
        max_attempts: Option<u32>,
    },
}

impl From<bool> for AutoReconnect {
    fn from(enabled: bool) -> Self {
        if enabled {
            AutoReconnect::Enabled
        } else {
            AutoReconnect::Disabled
        }
    }
}

/// Ping/pong option as supplied by the caller.
///
/// Normalized into a [`KeepaliveConfig`] when the configuration is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingPong {
    /// No heartbeat
    #[default]
    Disabled,
    /// Heartbeat every [`DEFAULT_PING_INTERVAL`]
    Enabled,
    /// Heartbeat with a custom interval
    Interval(Duration),
}

impl From<bool> for PingPong {
    fn from(enabled: bool) -> Self {
        if enabled {
            PingPong::Enabled
        } else {
            PingPong::Disabled
        }
    }
}

impl From<Duration> for PingPong {
    fn from(interval: Duration) -> Self {
        PingPong::Interval(interval)
    }
}

/// Fully resolved reconnection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Whether unclean closes trigger reconnection
    pub enabled: bool,
    /// Upper bound of the random base delay drawn on every reset
    pub base_interval: Duration,
    /// Maximum reconnection attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(AutoReconnect::Disabled)
    }
}

impl From<AutoReconnect> for ReconnectConfig {
    fn from(option: AutoReconnect) -> Self {
        let (enabled, interval, max_attempts) = match option {
            AutoReconnect::Disabled => (false, None, None),
            AutoReconnect::Enabled => (true, None, None),
            AutoReconnect::Custom {
                interval,
                max_attempts,
            } => (true, interval, max_attempts),
        };

        Self {
            enabled,
            base_interval: interval.unwrap_or(DEFAULT_RECONNECT_INTERVAL),
            max_attempts: max_attempts.unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        }
    }
}

/// Fully resolved keepalive settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Whether heartbeat pings are sent
    pub enabled: bool,
    /// Delay between connection open (or the last pong) and the next ping
    pub interval: Duration,
    /// Text sent as the ping
    pub ping_message: String,
    /// Text that is consumed as the pong reply
    pub pong_message: String,
    /// Optional deadline for the pong after each ping.
    /// `None` means an unanswered ping is never acted upon.
    pub pong_timeout: Option<Duration>,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self::from(PingPong::Disabled)
    }
}

impl From<PingPong> for KeepaliveConfig {
    fn from(option: PingPong) -> Self {
        let (enabled, interval) = match option {
            PingPong::Disabled => (false, DEFAULT_PING_INTERVAL),
            PingPong::Enabled => (true, DEFAULT_PING_INTERVAL),
            PingPong::Interval(interval) => (true, interval),
        };

        Self {
            enabled,
            interval,
            ping_message: DEFAULT_PING_MESSAGE.to_string(),
            pong_message: DEFAULT_PONG_MESSAGE.to_string(),
            pong_timeout: None,
        }
    }
}

/// Configuration for a [`WebSocket`](crate::WebSocket)
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Label used in diagnostics only
    pub service_name: String,
    /// Reconnection settings
    pub reconnect: ReconnectConfig,
    /// Keepalive settings
    pub keepalive: KeepaliveConfig,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl WebSocketConfig {
    /// Create a new builder for configuration
    pub fn builder() -> WebSocketConfigBuilder {
        WebSocketConfigBuilder::default()
    }
}

/// Builder for WebSocketConfig
#[derive(Debug, Clone, Default)]
pub struct WebSocketConfigBuilder {
    config: WebSocketConfig,
}

impl WebSocketConfigBuilder {
    /// Set the diagnostic service name
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the auto-reconnect option (`bool` or [`AutoReconnect`])
    pub fn auto_reconnect(mut self, option: impl Into<AutoReconnect>) -> Self {
        self.config.reconnect = ReconnectConfig::from(option.into());
        self
    }

    /// Set the ping/pong option (`bool`, `Duration` or [`PingPong`])
    pub fn ping_pong(mut self, option: impl Into<PingPong>) -> Self {
        let keepalive = KeepaliveConfig::from(option.into());
        self.config.keepalive.enabled = keepalive.enabled;
        self.config.keepalive.interval = keepalive.interval;
        self
    }

    /// Override the heartbeat sentinels
    pub fn heartbeat_messages(mut self, ping: impl Into<String>, pong: impl Into<String>) -> Self {
        self.config.keepalive.ping_message = ping.into();
        self.config.keepalive.pong_message = pong.into();
        self
    }

    /// Treat a ping left unanswered for `timeout` as a dead connection
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.config.keepalive.pong_timeout = Some(timeout);
        self
    }

    /// Build the configuration with validation.
    ///
    /// Returns an error for invalid configurations (e.g., a zero ping interval).
    pub fn build(self) -> Result<WebSocketConfig, ConfigError> {
        let keepalive = &self.config.keepalive;

        if keepalive.enabled && keepalive.interval.is_zero() {
            return Err(ConfigError::InvalidKeepalive(
                "ping interval must be > 0".to_string(),
            ));
        }

        if keepalive.pong_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidKeepalive(
                "pong_timeout must be > 0".to_string(),
            ));
        }

        if keepalive.ping_message.is_empty() || keepalive.pong_message.is_empty() {
            return Err(ConfigError::InvalidKeepalive(
                "heartbeat messages cannot be empty".to_string(),
            ));
        }

        if self.config.service_name.is_empty() {
            return Err(ConfigError::InvalidServiceName);
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid keepalive configuration
    #[error("Invalid keepalive configuration: {0}")]
    InvalidKeepalive(String),
    /// Empty service name
    #[error("Service name cannot be empty")]
    InvalidServiceName,
}
