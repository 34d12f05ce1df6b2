//! Client configuration for the connection manager.

use std::time::Duration;

/// Default relay endpoint, matching the relay server's default bind port.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:9400/ws";

/// Default interval between heartbeat envelopes on an open connection.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default time allowed for a single connection attempt to complete.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the client event channel.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Default pause between automatic reconnect attempts.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of reconnect attempts before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Policy for automatic reconnection after an unexpected connection loss.
///
/// The interval is fixed, not backed off: consultations are short-lived and
/// a patient waiting on a doctor needs the session back quickly or not at
/// all.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Pause before each reconnect attempt.
    pub retry_interval: Duration,
    /// Attempts made before the client gives up and enters the error state.
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Creates the default reconnect policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a [`ChatClient`](crate::manager::ChatClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay server (e.g. `ws://127.0.0.1:9400/ws`).
    pub server_url: String,
    /// Interval between heartbeat envelopes while connected.
    pub heartbeat_interval: Duration,
    /// Time allowed for a single connection attempt.
    pub connect_timeout: Duration,
    /// Reconnect policy applied after an unexpected connection loss.
    pub reconnect: ReconnectConfig,
    /// Capacity of the event channel handed back by the client constructor.
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Creates a configuration pointing at `server_url` with default timing.
    #[must_use]
    pub const fn new(server_url: String) -> Self {
        Self {
            server_url,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectConfig::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL.to_owned())
    }
}
