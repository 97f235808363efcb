use std::net::SocketAddr;
use std::path::PathBuf;

use huddle_gateway::config::{DEFAULT_HISTORY_WINDOW, MAX_HISTORY_WINDOW};
use huddle_gateway::{ClearPolicy, GatewayConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub store: StoreBackend,
    pub gateway: GatewayConfig,
    pub jwt_secret: Option<String>,
    pub media_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset or blank keys take the
    /// default; anything unparseable is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("HUDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match get("HUDDLE_PORT") {
            Some(v) => v.trim().parse().map_err(|_| invalid("HUDDLE_PORT", format!("'{v}' is not a port")))?,
            None => 3000,
        };
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| invalid("HUDDLE_HOST", format!("'{host}' is not an IP address")))?;

        let db_path = PathBuf::from(get("HUDDLE_DB_PATH").unwrap_or_else(|| "huddle.db".into()));
        let store = match get("HUDDLE_STORE").as_deref().map(str::trim) {
            None | Some("sqlite") => StoreBackend::Sqlite(db_path),
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(invalid("HUDDLE_STORE", format!("unknown backend '{other}'")));
            }
        };

        let history_window = match get("HUDDLE_HISTORY_WINDOW") {
            Some(v) => {
                let n: usize = v
                    .trim()
                    .parse()
                    .map_err(|_| invalid("HUDDLE_HISTORY_WINDOW", format!("'{v}' is not a number")))?;
                if !(1..=MAX_HISTORY_WINDOW).contains(&n) {
                    return Err(invalid(
                        "HUDDLE_HISTORY_WINDOW",
                        format!("must be between 1 and {MAX_HISTORY_WINDOW}"),
                    ));
                }
                n
            }
            None => DEFAULT_HISTORY_WINDOW,
        };

        let clear_policy = match get("HUDDLE_CLEAR_POLICY") {
            Some(v) => v
                .parse::<ClearPolicy>()
                .map_err(|e| invalid("HUDDLE_CLEAR_POLICY", e.to_string()))?,
            None => ClearPolicy::Anyone,
        };

        let max_upload_mb: usize = match get("HUDDLE_MAX_UPLOAD_MB") {
            Some(v) => v
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid("HUDDLE_MAX_UPLOAD_MB", format!("'{v}' is not a positive number")))?,
            None => 25,
        };
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| invalid("HUDDLE_MAX_UPLOAD_MB", format!("{max_upload_mb} MB is too large")))?;

        Ok(Self {
            addr,
            store,
            gateway: GatewayConfig {
                history_window,
                clear_policy,
            },
            jwt_secret: get("HUDDLE_JWT_SECRET"),
            media_dir: PathBuf::from(get("HUDDLE_MEDIA_DIR").unwrap_or_else(|| "./media".into())),
            max_upload_bytes,
        })
    }
}
