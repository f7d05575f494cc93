use std::env;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use ipnet::{Ipv4Net, Ipv6Net};

use crate::ip_pool::{AddressPool, AddressPoolError};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub max_devices: i64,
    pub ipv4_subnet: String,
    pub ipv4_start: String,
    pub ipv6_prefix: String,
    pub resource_dir: PathBuf,
    pub change_feed_table: String,
    pub max_payload_bytes: usize,
    pub heartbeat_secs: u64,
}

#[derive(Debug)]
pub enum AddressConfigError {
    Parse { var: &'static str, value: String },
    Pool(AddressPoolError),
}

impl std::fmt::Display for AddressConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressConfigError::Parse { var, value } => write!(f, "invalid {var}: {value:?}"),
            AddressConfigError::Pool(e) => write!(f, "invalid address plan: {e}"),
        }
    }
}

impl std::error::Error for AddressConfigError {}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:vpn-account-api.db".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_devices: env::var("MAX_DEVICES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            ipv4_subnet: env::var("IPV4_SUBNET").unwrap_or_else(|_| "10.64.0.0/10".to_string()),
            ipv4_start: env::var("IPV4_START").unwrap_or_else(|_| "10.64.3.1".to_string()),
            ipv6_prefix: env::var("IPV6_PREFIX")
                .unwrap_or_else(|_| "fc00:bbbb:bbbb:bb01::/64".to_string()),
            resource_dir: env::var("RESOURCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("json")),
            change_feed_table: env::var("CHANGE_FEED_TABLE")
                .unwrap_or_else(|_| "devices".to_string()),
            max_payload_bytes: env::var("MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(65_536),
            heartbeat_secs: env::var("HEARTBEAT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(10),
        }
    }

    /// Validates the tunnel address settings.
    pub fn address_pool(&self) -> Result<AddressPool, AddressConfigError> {
        let subnet: Ipv4Net = self
            .ipv4_subnet
            .parse()
            .map_err(|_| AddressConfigError::Parse {
                var: "IPV4_SUBNET",
                value: self.ipv4_subnet.clone(),
            })?;
        let start: Ipv4Addr = self
            .ipv4_start
            .parse()
            .map_err(|_| AddressConfigError::Parse {
                var: "IPV4_START",
                value: self.ipv4_start.clone(),
            })?;
        let v6_prefix: Ipv6Net = self
            .ipv6_prefix
            .parse()
            .map_err(|_| AddressConfigError::Parse {
                var: "IPV6_PREFIX",
                value: self.ipv6_prefix.clone(),
            })?;

        AddressPool::new(subnet, start, v6_prefix).map_err(AddressConfigError::Pool)
    }
}
