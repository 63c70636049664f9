//! Connection settings for the search client.
//!
//! Settings are resolved in layers: [`ClientConfig::default`] first, then an
//! optional TOML file, then `SEARCHD_*` environment variables, then whatever
//! the caller sets explicitly.
//!
//! ```toml
//! host = "search.internal"
//! port = 9312
//! connect_timeout_ms = 2500
//! retry_count = 2
//! retry_delay_ms = 50
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9312;
pub const DEFAULT_SQL_PORT: u16 = 9306;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Client-level settings: where to connect and how patiently.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Host name for TCP connections, also used by the SQL side.
    pub host: String,
    /// Binary protocol port.
    pub port: u16,
    /// Unix socket path; takes precedence over host/port when set.
    pub socket: Option<PathBuf>,
    /// Port of the SQL listener used by the relational bridge.
    pub sql_port: u16,
    /// Unix socket of the SQL listener.
    pub sql_socket: Option<PathBuf>,
    /// Deadline applied to dialing and the version handshake only.
    pub connect_timeout: Duration,
    /// Advisory retry count forwarded to the daemon for its sub-queries.
    pub retry_count: u32,
    /// Advisory retry delay in milliseconds forwarded with the retry count.
    pub retry_delay: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            socket: None,
            sql_port: DEFAULT_SQL_PORT,
            sql_socket: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_count: 0,
            retry_delay: 0,
        }
    }
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    socket: Option<PathBuf>,
    sql_port: Option<u16>,
    sql_socket: Option<PathBuf>,
    connect_timeout_ms: Option<u64>,
    retry_count: Option<u32>,
    retry_delay_ms: Option<u32>,
}

/// Splits a server string into a socket path when it names one.
fn unix_path(host: &str) -> Option<PathBuf> {
    if host.starts_with('/') {
        Some(PathBuf::from(host))
    } else {
        host.strip_prefix("unix://")
            .filter(|rest| !rest.is_empty())
            .map(PathBuf::from)
    }
}

impl ClientConfig {
    /// Defaults overlaid with `SEARCHD_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Defaults overlaid with a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        let mut cfg = Self::default();
        cfg.apply_toml(&text)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded client config");
        Ok(cfg)
    }

    /// Default config file location for the current platform, if one exists.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "searchd", "searchd-client")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    fn apply_toml(&mut self, text: &str) -> std::result::Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if file.socket.is_some() {
            self.socket = file.socket;
        }
        if let Some(port) = file.sql_port {
            self.sql_port = port;
        }
        if file.sql_socket.is_some() {
            self.sql_socket = file.sql_socket;
        }
        if let Some(ms) = file.connect_timeout_ms {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = file.retry_count {
            self.retry_count = n;
        }
        if let Some(ms) = file.retry_delay_ms {
            self.retry_delay = ms;
        }
        Ok(())
    }

    /// Overlay `SEARCHD_*` environment variables. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(host) = dotenvy::var("SEARCHD_HOST") {
            let port = self.port;
            self.set_server(&host, port);
        }

        if let Ok(val) = dotenvy::var("SEARCHD_PORT")
            && let Ok(port) = val.parse::<u16>()
        {
            self.port = port;
        }

        if let Ok(path) = dotenvy::var("SEARCHD_SOCKET")
            && !path.is_empty()
        {
            self.socket = Some(unix_path(&path).unwrap_or_else(|| PathBuf::from(path)));
        }

        if let Ok(val) = dotenvy::var("SEARCHD_SQL_PORT")
            && let Ok(port) = val.parse::<u16>()
        {
            self.sql_port = port;
        }

        if let Ok(val) = dotenvy::var("SEARCHD_CONNECT_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            self.connect_timeout = Duration::from_millis(ms);
        }

        if let Ok(val) = dotenvy::var("SEARCHD_RETRY_COUNT")
            && let Ok(n) = val.parse::<u32>()
        {
            self.retry_count = n;
        }

        if let Ok(val) = dotenvy::var("SEARCHD_RETRY_DELAY_MS")
            && let Ok(ms) = val.parse::<u32>()
        {
            self.retry_delay = ms;
        }
    }

    /// Builder form of [`set_server`](Self::set_server).
    pub fn with_server(mut self, host: &str, port: u16) -> Self {
        self.set_server(host, port);
        self
    }

    /// Point the binary protocol at `host:port` or at a Unix socket.
    ///
    /// A host beginning with `/` or `unix://` is a socket path and leaves the
    /// port alone. An empty host means [`DEFAULT_HOST`]; port 0 means
    /// [`DEFAULT_PORT`].
    pub fn set_server(&mut self, host: &str, port: u16) {
        if let Some(path) = unix_path(host) {
            self.socket = Some(path);
            return;
        }
        self.socket = None;
        self.host = if host.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.to_string()
        };
        self.port = if port > 0 { port } else { DEFAULT_PORT };
    }

    /// Same rules as [`set_server`](Self::set_server), for the SQL listener.
    pub fn with_sql_server(mut self, host: &str, port: u16) -> Self {
        if let Some(path) = unix_path(host) {
            self.sql_socket = Some(path);
            return self;
        }
        self.sql_socket = None;
        self.host = if host.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.to_string()
        };
        self.sql_port = if port > 0 { port } else { DEFAULT_SQL_PORT };
        self
    }

    /// Set the advisory retry count and delay the daemon uses for its own sub-queries.
    pub fn set_retries(&mut self, count: i32, delay: i32) -> Result<&mut Self> {
        if count < 0 {
            return Err(Error::config(format!(
                "retry count must not be negative: {count}"
            )));
        }
        if delay < 0 {
            return Err(Error::config(format!(
                "retry delay must not be negative: {delay}"
            )));
        }
        self.retry_count = count as u32;
        self.retry_delay = delay as u32;
        Ok(self)
    }

    /// Set the dial + handshake deadline in milliseconds.
    pub fn set_connect_timeout(&mut self, millis: i64) -> Result<&mut Self> {
        if millis < 0 {
            return Err(Error::config(format!(
                "connect timeout must not be negative: {millis}"
            )));
        }
        self.connect_timeout = Duration::from_millis(millis as u64);
        Ok(self)
    }

    /// Resolve the binary protocol endpoint.
    pub fn endpoint(&self) -> Result<Endpoint> {
        if let Some(path) = &self.socket {
            return Ok(Endpoint::Unix(path.clone()));
        }
        if self.port == 0 {
            return Err(Error::config("no valid socket or port configured"));
        }
        Ok(Endpoint::Tcp {
            host: self.host.clone(),
            port: self.port,
        })
    }

    /// Resolve the SQL listener endpoint for the relational bridge.
    pub fn sql_endpoint(&self) -> Result<Endpoint> {
        if let Some(path) = &self.sql_socket {
            return Ok(Endpoint::Unix(path.clone()));
        }
        if self.sql_port == 0 {
            return Err(Error::config("no valid SQL socket or port configured"));
        }
        Ok(Endpoint::Tcp {
            host: self.host.clone(),
            port: self.sql_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                // SAFETY: test helper restores prior process env for isolation.
                unsafe {
                    std::env::set_var(self.key, value);
                }
            } else {
                // SAFETY: test helper restores prior process env for isolation.
                unsafe {
                    std::env::remove_var(self.key);
                }
            }
        }
    }

    fn set_env(key: &'static str, value: &str) -> EnvGuard {
        let previous = dotenvy::var(key).ok();
        // SAFETY: test helper toggles a process-local env var for isolation.
        unsafe {
            std::env::set_var(key, value);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn test_config_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 9312);
        assert_eq!(cfg.sql_port, 9306);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(1000));
        assert_eq!(
            cfg.endpoint().unwrap(),
            Endpoint::Tcp {
                host: "localhost".into(),
                port: 9312
            }
        );
    }

    #[test]
    fn test_server_parsing() {
        let cfg = ClientConfig::default().with_server("/var/run/searchd.sock", 0);
        assert_eq!(
            cfg.endpoint().unwrap(),
            Endpoint::Unix(PathBuf::from("/var/run/searchd.sock"))
        );

        let cfg = ClientConfig::default().with_server("unix:///tmp/s.sock", 0);
        assert_eq!(cfg.socket, Some(PathBuf::from("/tmp/s.sock")));

        let cfg = ClientConfig::default().with_server("", 0);
        assert_eq!(cfg.host, DEFAULT_HOST);
        assert_eq!(cfg.port, DEFAULT_PORT);

        let cfg = ClientConfig::default().with_server("search01", 9400);
        assert_eq!(cfg.endpoint().unwrap().to_string(), "search01:9400");
    }

    #[test]
    fn test_sql_server_parsing() {
        let cfg = ClientConfig::default().with_sql_server("", 0);
        assert_eq!(cfg.sql_port, DEFAULT_SQL_PORT);
        let cfg = ClientConfig::default().with_sql_server("/tmp/sql.sock", 0);
        assert_eq!(
            cfg.sql_endpoint().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/sql.sock"))
        );
    }

    #[test]
    fn test_negative_settings_rejected() {
        let mut cfg = ClientConfig::default();
        assert!(cfg.set_retries(-1, 0).is_err());
        assert!(cfg.set_retries(1, -5).is_err());
        assert_eq!(cfg.retry_count, 0);
        assert!(cfg.set_connect_timeout(-1).is_err());
        assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        cfg.set_retries(3, 100).unwrap();
        assert_eq!((cfg.retry_count, cfg.retry_delay), (3, 100));
    }

    #[test]
    fn test_port_zero_without_socket_has_no_endpoint() {
        let cfg = ClientConfig {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.endpoint(), Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_layer() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            "host = \"search.internal\"\nport = 9400\nconnect_timeout_ms = 2500\nretry_count = 2\n",
        )
        .unwrap();

        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.host, "search.internal");
        assert_eq!(cfg.port, 9400);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.retry_count, 2);
        assert_eq!(cfg.sql_port, DEFAULT_SQL_PORT);
    }

    #[test]
    fn test_toml_unknown_key_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "hots = \"typo\"\n").unwrap();
        assert!(matches!(ClientConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_layer() {
        let _host = set_env("SEARCHD_HOST", "envhost");
        let _port = set_env("SEARCHD_PORT", "9555");
        let _timeout = set_env("SEARCHD_CONNECT_TIMEOUT_MS", "not-a-number");

        let cfg = ClientConfig::from_env();
        assert_eq!(cfg.host, "envhost");
        assert_eq!(cfg.port, 9555);
        assert_eq!(cfg.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    #[serial]
    fn test_env_socket_wins() {
        let _socket = set_env("SEARCHD_SOCKET", "unix:///run/searchd.sock");
        let cfg = ClientConfig::from_env();
        assert_eq!(
            cfg.endpoint().unwrap(),
            Endpoint::Unix(PathBuf::from("/run/searchd.sock"))
        );
    }
}
