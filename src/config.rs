//! Deployment configuration.
//!
//! Every struct has a `Default` reproducing the reference two-site deployment
//! on one host; `main` overrides individual values from the command line and
//! environment.

use crate::security::CredentialTable;

use anyhow::{Result, anyhow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SECRET: &str = "biblioteca-2025-super-secreto";

const ROUTER_PORTS: [u16; 2] = [5555, 5556];
const LOAN_WORKER_PORTS: [u16; 2] = [5560, 5561];
const BUS_PORTS: [u16; 2] = [5570, 5571];
const STORAGE_PRIMARY_PORT: u16 = 5580;
const STORAGE_BACKUP_PORT: u16 = 5581;
const LIVENESS_PRIMARY_PORT: u16 = 5582;
const LIVENESS_BACKUP_PORT: u16 = 5583;

/// How the router admits client requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DispatchMode {
    /// One request fully handled before the next one is admitted.
    Serial,
    /// Up to `pool_size` requests handled at once.
    Concurrent,
}

/// Addresses of one deployment site's router, loan worker and bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub site: u8,
    pub router_addr: SocketAddr,
    pub loan_worker_addr: SocketAddr,
    pub bus_addr: SocketAddr,
}

impl SiteConfig {
    pub fn for_site(site: u8, host: IpAddr) -> Result<Self> {
        let idx = match site {
            1 => 0,
            2 => 1,
            other => return Err(anyhow!("unknown site {} (expected 1 or 2)", other)),
        };

        Ok(Self {
            site,
            router_addr: SocketAddr::new(host, ROUTER_PORTS[idx]),
            loan_worker_addr: SocketAddr::new(host, LOAN_WORKER_PORTS[idx]),
            bus_addr: SocketAddr::new(host, BUS_PORTS[idx]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub mode: DispatchMode,
    pub pool_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Serial,
            pool_size: 8,
        }
    }
}

/// Per-attempt timeouts of the failover protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverConfig {
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(3),
            receive_timeout: Duration::from_secs(3),
        }
    }
}

impl FailoverConfig {
    /// Upper bound of one attempt against one instance. The connection is
    /// bounded by `send_timeout` within the same window.
    pub fn attempt_budget(&self) -> Duration {
        self.receive_timeout
    }

    /// Upper bound of a full primary-then-backup delivery.
    pub fn delivery_budget(&self) -> Duration {
        self.attempt_budget() * 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub primary_addr: SocketAddr,
    pub backup_addr: SocketAddr,
    pub primary_liveness_addr: SocketAddr,
    pub backup_liveness_addr: SocketAddr,
    pub primary_snapshot: PathBuf,
    pub backup_snapshot: PathBuf,
    pub seed_path: Option<PathBuf>,
    pub settle_delay: Duration,
    pub reconcile_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::with_host(IpAddr::V4(Ipv4Addr::LOCALHOST), PathBuf::from("datos"))
    }
}

impl StorageConfig {
    pub fn with_host(host: IpAddr, data_dir: PathBuf) -> Self {
        Self {
            primary_addr: SocketAddr::new(host, STORAGE_PRIMARY_PORT),
            backup_addr: SocketAddr::new(host, STORAGE_BACKUP_PORT),
            primary_liveness_addr: SocketAddr::new(host, LIVENESS_PRIMARY_PORT),
            backup_liveness_addr: SocketAddr::new(host, LIVENESS_BACKUP_PORT),
            primary_snapshot: data_dir.join("bd_libros_primaria.json"),
            backup_snapshot: data_dir.join("bd_libros_replica.json"),
            seed_path: Some(data_dir.join("bd_libros_inicial.json")),
            settle_delay: crate::storage::replication::REPLICATION_SETTLE_DELAY,
            reconcile_on_start: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub secret: String,
    pub credentials: CredentialTable,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
            credentials: CredentialTable::default(),
        }
    }
}

impl SecurityConfig {
    /// Built-in tables unless a credentials file is given.
    pub fn load(secret: Option<String>, credentials: Option<&Path>) -> Result<Self> {
        let credentials = match credentials {
            Some(path) => CredentialTable::from_file(path)?,
            None => CredentialTable::default(),
        };

        Ok(Self {
            secret: secret.unwrap_or_else(|| DEFAULT_SECRET.to_string()),
            credentials,
        })
    }
}

/// Everything a node needs, whatever its role.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub host: IpAddr,
    pub router: RouterConfig,
    pub storage: StorageConfig,
    pub failover: FailoverConfig,
    pub security: SecurityConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            router: RouterConfig::default(),
            storage: StorageConfig::default(),
            failover: FailoverConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl ClusterConfig {
    pub fn site(&self, site: u8) -> Result<SiteConfig> {
        SiteConfig::for_site(site, self.host)
    }
}
