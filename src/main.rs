// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod directory;
mod error;
mod exposition;
mod metrics;
mod registry;
mod runner;
mod server;
mod slurm;
mod telemetry;

use config::ExporterConfig;
use directory::UserDirectory;
use runner::CommandRunner;
use slurm::node_detail::NodeDetailFormat;
use slurm::AdapterContext;
use telemetry::Telemetry;

#[derive(Parser, Debug)]
#[command(name = "slurm-exporter")]
#[command(about = "Prometheus exporter for Slurm batch-scheduler metrics")]
#[command(version)]
pub struct Args {
    /// Address to listen on for scrapes (`host:port` or `:port`)
    #[arg(long, env = "SLURM_EXPORTER_LISTEN_ADDRESS", default_value = ":8080")]
    pub listen_address: String,

    /// Collect GPU usage through sinfo and sacct
    #[arg(long, env = "SLURM_EXPORTER_GPUS_ACCT")]
    pub gpus_acct: bool,

    /// Timeout for every external command, in seconds
    #[arg(long, env = "SLURM_EXPORTER_EXEC_TIMEOUT", default_value = "10")]
    pub exec_timeout: u64,

    /// Suffix appended to each node's address in the `address` label
    #[arg(long, env = "SLURM_EXPORTER_NODE_ADDRESS_SUFFIX", default_value = "")]
    pub node_address_suffix: String,

    /// Source format for per-node details
    #[arg(long, env = "SLURM_EXPORTER_NODE_DETAIL_FORMAT", value_enum, default_value = "json")]
    pub node_detail_format: NodeDetailFormat,

    /// LDAP server used to resolve job uids to user names
    #[arg(long, env = "SLURM_EXPORTER_LDAP_SERVER")]
    pub ldap_server: Option<String>,

    /// LDAP search base, required with --ldap-server
    #[arg(long, env = "SLURM_EXPORTER_LDAP_BASE_SEARCH")]
    pub ldap_base_search: Option<String>,

    /// Read command output from files in this directory instead of running commands
    #[arg(long, env = "SLURM_EXPORTER_FIXTURES_DIR")]
    pub fixtures_dir: Option<PathBuf>,

    /// Log filter directive, overrides RUST_LOG
    #[arg(long, env = "SLURM_EXPORTER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(directive) => EnvFilter::try_new(directive).context("Invalid log level")?,
        None => match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(_) => EnvFilter::from_default_env(),
            Err(_) => EnvFilter::new("slurm_exporter=info"),
        },
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let config = ExporterConfig::from_args(&args)?;

    let telemetry = Arc::new(Telemetry::new().context("Failed to create exporter telemetry")?);
    let runner = Arc::new(CommandRunner::new(config.exec_timeout, telemetry));
    let ctx = AdapterContext::new(runner, config.fixtures_dir.clone());

    let directory = match &config.ldap {
        Some(ldap) => UserDirectory::load(&ctx, &ldap.server, &ldap.base_search).await,
        None => UserDirectory::default(),
    };

    let registry = slurm::build_registry(&config, &ctx, Arc::new(directory))?;

    tracing::info!(
        listen_address = %config.listen_address,
        gpus_acct = config.gpus_acct,
        exec_timeout_secs = config.exec_timeout.as_secs(),
        node_detail_format = ?config.node_detail_format,
        fixtures = ?config.fixtures_dir,
        "Starting slurm-exporter"
    );

    server::serve(&config.listen_address, Arc::new(registry)).await
}
