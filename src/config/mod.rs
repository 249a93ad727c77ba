//! Client configuration
//!
//! Locates the display server and tunes the transport's waiting behaviour
//! and the size of the object pools.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known path of the display server socket
pub const DEFAULT_SOCKET_PATH: &str = "/run/wsserver.sock";

/// Environment variable overriding [`DEFAULT_SOCKET_PATH`]
pub const SOCKET_ENV: &str = "WSCLIENT_SOCKET";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server socket path
    pub socket_path: PathBuf,

    /// Upper bound on one wait inside `next` before the queue is re-polled
    pub poll_interval: Duration,

    /// Deadline for blocking request/reply round trips (None = wait forever)
    pub reply_timeout: Option<Duration>,

    /// Free-list capacity of each object pool
    pub pool_capacity: usize,

    /// Entries allocated into each pool up front
    pub pool_prefill: usize,

    /// Name prefix of shared-memory segments (`/<prefix><handle>`)
    pub shm_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            poll_interval: Duration::from_millis(20),
            reply_timeout: Some(Duration::from_secs(5)),
            pool_capacity: 256,
            pool_prefill: 32,
            shm_prefix: "wsserver-canvas-".to_string(),
        }
    }
}

impl ClientConfig {
    /// Default configuration with the socket path taken from the environment
    pub fn from_env() -> Self {
        let mut config = ClientConfig::default();
        if let Some(path) = env::var_os(SOCKET_ENV) {
            config.socket_path = PathBuf::from(path);
        }
        config
    }

    /// Short deadlines for tests against an in-process server
    pub fn testing() -> Self {
        ClientConfig {
            poll_interval: Duration::from_millis(5),
            reply_timeout: Some(Duration::from_secs(2)),
            pool_capacity: 64,
            pool_prefill: 16,
            ..ClientConfig::default()
        }
    }

    pub fn with_socket_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }
}
