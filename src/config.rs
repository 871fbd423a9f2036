use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 10301;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 3;

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Soft cap on fan-out width. Unset means the caller controls it.
    pub max_fanout: Option<usize>,
    /// How long in-flight connections get to finish on shutdown.
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let listen_addr = match env::var("MANIFOLD_LISTEN") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "MANIFOLD_LISTEN is not a socket address, using default");
                default_listen_addr()
            }),
            Err(_) => default_listen_addr(),
        };

        let max_fanout = env::var("MANIFOLD_MAX_FANOUT")
            .ok()
            .and_then(|raw| match raw.parse::<usize>() {
                Ok(0) => {
                    tracing::warn!("MANIFOLD_MAX_FANOUT of 0 ignored");
                    None
                }
                Ok(cap) => Some(cap),
                Err(_) => {
                    tracing::warn!(value = %raw, "MANIFOLD_MAX_FANOUT is not a number, ignored");
                    None
                }
            });

        let shutdown_grace = env::var("MANIFOLD_SHUTDOWN_GRACE_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(
                Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
                Duration::from_secs,
            );

        Config {
            listen_addr,
            max_fanout,
            shutdown_grace,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_fanout: None,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}
