const DEFAULT_PORT: u16 = 7420;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// Daemon configuration, resolved from CLI flags / environment at startup.
///
/// There is no config file: the daemon holds no persistent state and the
/// personal access token is never written to disk — it arrives per
/// `azure_devops_connect` call and lives only in the session slot.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Port for the JSON-RPC WebSocket server (and the HTTP /health probe).
    pub port: u16,
    /// Bind address. Defaults to loopback; the editor runs on the same host.
    pub bind_address: String,
    /// tracing env-filter directive, e.g. "info" or "azdod=debug".
    pub log_level: String,
    /// Per-request timeout for Azure DevOps REST calls, in seconds.
    pub http_timeout_secs: u64,
}

impl DaemonConfig {
    pub fn new(
        port: Option<u16>,
        bind_address: Option<String>,
        log_level: Option<String>,
        http_timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            port: port.unwrap_or(DEFAULT_PORT),
            bind_address: bind_address.unwrap_or_else(default_bind_address),
            log_level: log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            http_timeout_secs: http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new(None, None, None, None)
    }
}
