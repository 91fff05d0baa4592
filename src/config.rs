// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Validated startup configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::runner::DEFAULT_TIMEOUT;
use crate::slurm::node_detail::NodeDetailFormat;
use crate::Args;

/// Directory server used to resolve uids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapConfig {
    pub server: String,
    pub base_search: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    /// `host:port`; the host may be a name resolved at bind time
    pub listen_address: String,
    pub gpus_acct: bool,
    pub exec_timeout: Duration,
    pub node_address_suffix: String,
    pub node_detail_format: NodeDetailFormat,
    pub ldap: Option<LdapConfig>,
    pub fixtures_dir: Option<PathBuf>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            gpus_acct: false,
            exec_timeout: DEFAULT_TIMEOUT,
            node_address_suffix: String::new(),
            node_detail_format: NodeDetailFormat::default(),
            ldap: None,
            fixtures_dir: None,
        }
    }
}

impl ExporterConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        if args.exec_timeout == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let ldap = match (&args.ldap_server, &args.ldap_base_search) {
            (Some(server), Some(base)) if !base.trim().is_empty() => Some(LdapConfig {
                server: server.clone(),
                base_search: base.clone(),
            }),
            (Some(server), _) => return Err(ConfigError::MissingLdapBaseSearch(server.clone())),
            (None, _) => None,
        };

        Ok(Self {
            listen_address: parse_listen_address(&args.listen_address)?,
            gpus_acct: args.gpus_acct,
            exec_timeout: Duration::from_secs(args.exec_timeout),
            node_address_suffix: args.node_address_suffix.clone(),
            node_detail_format: args.node_detail_format,
            ldap,
            fixtures_dir: args.fixtures_dir.clone(),
        })
    }
}

/// Accept `host:port`, or `:port` for all interfaces.
///
/// Literal addresses are checked fully. Host names only need a sane shape
/// here; resolution happens when the listener binds.
pub fn parse_listen_address(addr: &str) -> Result<String, ConfigError> {
    let addr = addr.trim();
    let normalized = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    };
    if normalized.parse::<SocketAddr>().is_ok() {
        return Ok(normalized);
    }
    match normalized.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(char::is_whitespace)
                && !host.contains(['[', ']'])
                && port.parse::<u16>().is_ok() =>
        {
            Ok(normalized)
        }
        _ => Err(ConfigError::InvalidListenAddress(addr.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Result<ExporterConfig, ConfigError> {
        let args = Args::try_parse_from(std::iter::once("slurm-exporter").chain(argv.iter().copied())).unwrap();
        ExporterConfig::from_args(&args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, ExporterConfig::default());
        assert_eq!(config.listen_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_listen_address_forms() {
        assert_eq!(parse_listen_address(":9341").unwrap(), "0.0.0.0:9341");
        assert_eq!(parse_listen_address("127.0.0.1:9341").unwrap(), "127.0.0.1:9341");
        assert_eq!(parse_listen_address("[::1]:9341").unwrap(), "[::1]:9341");
        assert_eq!(parse_listen_address("localhost:8080").unwrap(), "localhost:8080");
        assert_eq!(parse_listen_address("exporter.cluster.local:9341").unwrap(), "exporter.cluster.local:9341");
        for bad in ["nonsense", "localhost:", "localhost:99999", ":http", "my host:80", "[::1:80"] {
            assert!(
                matches!(parse_listen_address(bad), Err(ConfigError::InvalidListenAddress(_))),
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_listen_address_host_name_flag() {
        let config = parse(&["--listen-address", "localhost:9341"]).unwrap();
        assert_eq!(config.listen_address, "localhost:9341");
    }

    #[test]
    fn test_ldap_server_requires_base() {
        let err = parse(&["--ldap-server", "ldap://dc.example.org"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingLdapBaseSearch(_)));

        let config = parse(&["--ldap-server", "ldap://dc.example.org", "--ldap-base-search", "DC=example,DC=org"]).unwrap();
        assert_eq!(
            config.ldap,
            Some(LdapConfig {
                server: "ldap://dc.example.org".to_string(),
                base_search: "DC=example,DC=org".to_string(),
            })
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(parse(&["--exec-timeout", "0"]), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_flags() {
        let config = parse(&[
            "--gpus-acct",
            "--exec-timeout",
            "30",
            "--node-address-suffix",
            ".cluster.local",
            "--node-detail-format",
            "scontrol",
            "--fixtures-dir",
            "/tmp/fixtures",
        ])
        .unwrap();
        assert!(config.gpus_acct);
        assert_eq!(config.exec_timeout, Duration::from_secs(30));
        assert_eq!(config.node_address_suffix, ".cluster.local");
        assert_eq!(config.node_detail_format, NodeDetailFormat::Scontrol);
        assert_eq!(config.fixtures_dir, Some(PathBuf::from("/tmp/fixtures")));
    }
}
