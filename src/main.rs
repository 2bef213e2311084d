use circulation_cluster::bus::Topic;
use circulation_cluster::client::{LibraryClient, read_operations};
use circulation_cluster::config::{
    ClusterConfig, DispatchMode, FailoverConfig, RouterConfig, SecurityConfig, StorageConfig,
};
use circulation_cluster::failover::{Failover, HttpTransport};
use circulation_cluster::router;
use circulation_cluster::security::SecurityGate;
use circulation_cluster::storage::engine::InstanceRole;
use circulation_cluster::storage::{liveness, node};
use circulation_cluster::workers::{DeferredWorker, LoanWorker, loan};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "circulation-node", about = "Library circulation cluster node")]
struct Cli {
    /// Host every component binds to and connects to.
    #[arg(long, global = true, env = "CIRCULATION_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Directory holding the snapshots and the seed dataset.
    #[arg(long, global = true, env = "CIRCULATION_DATA_DIR", default_value = "datos")]
    data_dir: PathBuf,

    /// Shared integrity secret.
    #[arg(long, global = true, env = "CIRCULATION_SECRET")]
    secret: Option<String>,

    /// JSON file with `tokens` and `roles` tables.
    #[arg(long, global = true, env = "CIRCULATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    #[arg(long, global = true, env = "CIRCULATION_SEND_TIMEOUT_MS", default_value_t = 3000)]
    send_timeout_ms: u64,

    #[arg(long, global = true, env = "CIRCULATION_RECEIVE_TIMEOUT_MS", default_value_t = 3000)]
    receive_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Client-facing request router of one site.
    Router {
        #[arg(long, default_value_t = 1)]
        site: u8,
        #[arg(long, value_enum, env = "CIRCULATION_ROUTER_MODE", default_value = "serial")]
        mode: DispatchMode,
        #[arg(long, env = "CIRCULATION_POOL_SIZE", default_value_t = 8)]
        pool_size: usize,
    },
    /// Synchronous loan worker of one site.
    LoanWorker {
        #[arg(long, default_value_t = 1)]
        site: u8,
    },
    /// Bus subscriber applying returns or renewals.
    DeferredWorker {
        #[arg(long, default_value_t = 1)]
        site: u8,
        #[arg(long, value_enum)]
        topic: Topic,
    },
    /// Storage engine instance.
    Storage {
        #[arg(long, default_value = "primary")]
        role: InstanceRole,
        /// Skip adopting a newer backup snapshot at start-up.
        #[arg(long)]
        no_reconcile: bool,
    },
    /// Checks a storage instance's liveness responder; fails when it stays silent.
    Liveness {
        #[arg(long, default_value = "primary")]
        role: InstanceRole,
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
    /// Submits an operations file to a site router.
    Client {
        #[arg(long, default_value_t = 1)]
        site: u8,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "ps_sede1")]
        identity: String,
    },
}

impl Cli {
    fn cluster_config(&self) -> Result<ClusterConfig> {
        Ok(ClusterConfig {
            host: self.host,
            router: RouterConfig::default(),
            storage: StorageConfig::with_host(self.host, self.data_dir.clone()),
            failover: FailoverConfig {
                send_timeout: Duration::from_millis(self.send_timeout_ms),
                receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            },
            security: SecurityConfig::load(self.secret.clone(), self.credentials.as_deref())?,
        })
    }
}

fn storage_failover(config: &ClusterConfig) -> Result<Failover> {
    let transport = Arc::new(HttpTransport::new(&config.failover)?);
    Ok(Failover::new(
        transport,
        config.storage.primary_addr.to_string(),
        config.storage.backup_addr.to_string(),
        &config.failover,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = cli.cluster_config()?;

    match cli.command {
        Command::Router {
            site,
            mode,
            pool_size,
        } => {
            config.router = RouterConfig { mode, pool_size };
            let gate = SecurityGate::new(config.security.secret.clone(), config.security.credentials.clone());
            router::run(config.site(site)?, config.router, gate, config.failover).await
        }
        Command::LoanWorker { site } => {
            let site = config.site(site)?;
            let worker = LoanWorker::new(storage_failover(&config)?);
            loan::run(site.loan_worker_addr, worker).await
        }
        Command::DeferredWorker { site, topic } => {
            let site = config.site(site)?;
            let worker = DeferredWorker::new(topic, storage_failover(&config)?);
            worker.run(site.bus_addr).await;
            Ok(())
        }
        Command::Storage { role, no_reconcile } => {
            config.storage.reconcile_on_start = !no_reconcile;
            node::run(role, config.storage).await
        }
        Command::Liveness { role, timeout_ms } => {
            let target = match role {
                InstanceRole::Primary => config.storage.primary_liveness_addr,
                InstanceRole::Backup => config.storage.backup_liveness_addr,
            };
            if liveness::probe(target, Duration::from_millis(timeout_ms)).await? {
                println!("{} {} alive", role, target);
                Ok(())
            } else {
                Err(anyhow!("{} {} did not answer within {}ms", role, target, timeout_ms))
            }
        }
        Command::Client {
            site,
            file,
            identity,
        } => {
            let site = config.site(site)?;
            let operations = read_operations(&file)?;
            tracing::info!("Read {} operations from {}", operations.len(), file.display());

            let client = LibraryClient::for_identity(
                &site.router_addr.to_string(),
                &identity,
                &config.security,
                config.failover.delivery_budget() * 2,
            )?;
            for reply in client.submit(&operations).await? {
                println!("{}", serde_json::to_string(&reply)?);
            }
            Ok(())
        }
    }
}
