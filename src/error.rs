// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Typed errors for the places where callers care about the variant.
//!
//! Everything else flows through `anyhow`.

use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single external command invocation or fixture read.
///
/// The `reason()` string is used as the `reason` label of
/// `slurm_exporter_errors_total`, so it must stay short and free of
/// per-invocation noise such as stderr contents or PIDs.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The command line had no program name.
    #[error("empty command line")]
    EmptyCommand,

    /// The program could not be started at all.
    #[error("failed to launch: {0}")]
    Launch(#[source] std::io::Error),

    /// The program did not finish within the configured timeout and was killed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The program ran but exited unsuccessfully.
    #[error("{status}")]
    ExitStatus {
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// Fixture mode: the substitute file could not be read.
    #[error("failed to read fixture {}: {source}", path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Short label value describing the failure class.
    pub fn reason(&self) -> String {
        match self {
            RunError::Timeout(_) => "timeout".to_string(),
            RunError::Launch(e) | RunError::Fixture { source: e, .. } => e.kind().to_string(),
            other => other.to_string(),
        }
    }
}

/// Registration-time conflicts between adapters.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two descriptors claim the same metric name.
    #[error("metric '{metric}' is described by both '{first}' and '{second}'")]
    DuplicateMetric {
        metric: String,
        first: String,
        second: String,
    },

    /// An adapter with the same name is already registered.
    #[error("adapter '{0}' is already registered")]
    DuplicateAdapter(String),
}

/// Inconsistent startup flags. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--ldap-server is set to '{0}' but --ldap-base-search is missing")]
    MissingLdapBaseSearch(String),

    #[error("--exec-timeout must be at least one second")]
    InvalidTimeout,

    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_reason_is_stable() {
        let a = RunError::Timeout(Duration::from_secs(1));
        let b = RunError::Timeout(Duration::from_secs(30));
        assert_eq!(a.reason(), "timeout");
        assert_eq!(a.reason(), b.reason());
    }

    #[test]
    fn test_launch_reason_uses_io_kind() {
        let err = RunError::Launch(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.reason(), std::io::ErrorKind::NotFound.to_string());
    }

    #[test]
    fn test_registry_error_names_both_adapters() {
        let err = RegistryError::DuplicateMetric {
            metric: "slurm_cpus_total".to_string(),
            first: "cpus".to_string(),
            second: "cpus_copy".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("slurm_cpus_total"));
        assert!(msg.contains("cpus_copy"));
    }
}
