// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! uid → username table, built once at startup from an LDAP directory.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::runner::Source;
use crate::slurm::AdapterContext;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);
const FIXTURE: &str = "ldapsearch.ldif";
const FILTER: &str = "(&(objectClass=user)(uidNumber=*)(sAMAccountName=*))";

/// Read-only mapping from numeric uid to account name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDirectory {
    users: HashMap<String, String>,
}

impl From<HashMap<String, String>> for UserDirectory {
    fn from(users: HashMap<String, String>) -> Self {
        Self { users }
    }
}

impl UserDirectory {
    /// Account name for `uid`, or `uid` itself when unknown.
    pub fn resolve(&self, uid: &str) -> String {
        self.users.get(uid).cloned().unwrap_or_else(|| uid.to_string())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Query the directory server. Failures are logged and recorded by the
    /// runner; the result is then empty and every uid resolves to itself.
    pub async fn load(ctx: &AdapterContext, server: &str, base: &str) -> Self {
        let argv = [
            "ldapsearch",
            "-LLL",
            "-E",
            "pr=1000/noprompt",
            "-H",
            server,
            "-b",
            base,
            FILTER,
        ];
        let source = ctx.source(&argv, FIXTURE);
        let data = match &source {
            Source::Command(cmd) => ctx.runner().run_with(cmd, LOOKUP_TIMEOUT).await,
            Source::Fixture(_) => ctx.fetch(&source).await,
        };

        let directory = Self::from(parse_ldif(&data));
        if directory.is_empty() {
            tracing::warn!(server, base, "User directory is empty, uids will not be resolved");
        } else {
            tracing::info!(server, users = directory.len(), "User directory loaded");
        }
        directory
    }
}

/// Join folded lines: a line starting with a single space continues the
/// previous one.
fn unfold(data: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in data.lines() {
        match (line.strip_prefix(' '), lines.last_mut()) {
            (Some(rest), Some(prev)) => prev.push_str(rest),
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

/// Split `attr: value` or `attr:: base64`, decoding the latter.
///
/// `attr:< url` references and undecodable values yield `None`.
fn attribute(line: &str) -> Option<(&str, String)> {
    let (attr, rest) = line.split_once(':')?;
    if let Some(encoded) = rest.strip_prefix(':') {
        return match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => Some((attr, String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) => {
                tracing::debug!(attr, error = %e, "Skipping undecodable LDIF value");
                None
            }
        };
    }
    if rest.starts_with('<') {
        return None;
    }
    Some((attr, rest.trim().to_string()))
}

/// Extract `uidNumber` → `sAMAccountName` from LDIF entries.
///
/// Entries are separated by blank lines. Entries missing either attribute
/// are skipped.
pub fn parse_ldif(data: &str) -> HashMap<String, String> {
    let mut users = HashMap::new();
    let mut uid: Option<String> = None;
    let mut account: Option<String> = None;

    let mut finish = |uid: &mut Option<String>, account: &mut Option<String>| {
        if let (Some(u), Some(a)) = (uid.take(), account.take()) {
            users.insert(u, a);
        }
    };

    for line in unfold(data) {
        if line.trim().is_empty() {
            finish(&mut uid, &mut account);
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some((attr, value)) = attribute(&line) else {
            continue;
        };
        match attr {
            "uidNumber" => uid = Some(value.trim().to_string()),
            "sAMAccountName" => account = Some(value.trim().to_string()),
            _ => {}
        }
    }
    finish(&mut uid, &mut account);
    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::runner::CommandRunner;
    use crate::slurm::test_support::fixture_context;
    use crate::telemetry::Telemetry;

    #[test]
    fn test_parse_entries() {
        let data = "dn: CN=Alice,OU=Users,DC=example,DC=org\nuidNumber: 1001\nsAMAccountName: alice\n\n\
                    dn: CN=Bob,OU=Users,DC=example,DC=org\nsAMAccountName: bob\nuidNumber: 1002\n";
        let users = parse_ldif(data);
        assert_eq!(users.len(), 2);
        assert_eq!(users["1001"], "alice");
        assert_eq!(users["1002"], "bob");
    }

    #[test]
    fn test_folded_lines() {
        let data = "dn: CN=Very Long Name,OU=Research Gr\n oup,DC=example,DC=org\nuidNumber: 10\n 05\nsAMAccountName: da\n ve\n";
        let users = parse_ldif(data);
        assert_eq!(users["1005"], "dave");
    }

    #[test]
    fn test_base64_values_decoded() {
        let data = "dn:: Q049w4lyaWMsT1U9VXNlcnM=\nuidNumber:: MTAwNw==\nsAMAccountName:: ZXZl\n\n\
                    dn: CN=Frank\nuidNumber: 1008\nsAMAccountName:: ZnLDpG5r\n";
        let users = parse_ldif(data);
        assert_eq!(users["1007"], "eve");
        assert_eq!(users["1008"], "fr\u{e4}nk");
    }

    #[test]
    fn test_undecodable_value_skips_attribute() {
        let data = "dn: CN=x\nuidNumber: 9\nsAMAccountName:: not*base64\n";
        assert!(parse_ldif(data).is_empty());
    }

    #[test]
    fn test_incomplete_entries_skipped() {
        let data = "dn: CN=svc\nsAMAccountName: svc\n\n# refldap://example.org\n\ndn: CN=x\nuidNumber: 7\n";
        assert!(parse_ldif(data).is_empty());
    }

    #[test]
    fn test_resolve_falls_back_to_uid() {
        let dir = UserDirectory::from(HashMap::from([("1001".to_string(), "alice".to_string())]));
        assert_eq!(dir.resolve("1001"), "alice");
        assert_eq!(dir.resolve("4242"), "4242");
    }

    #[tokio::test]
    async fn test_load_from_fixture() {
        let dir = UserDirectory::load(&fixture_context(), "ldap://dc.example.org", "DC=example,DC=org").await;
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.resolve("1005"), "dave");
    }

    #[tokio::test]
    async fn test_failed_lookup_yields_empty_directory() {
        let telemetry = Arc::new(Telemetry::new().unwrap());
        let runner = Arc::new(CommandRunner::new(Duration::from_secs(1), telemetry.clone()));
        let empty = tempfile::tempdir().unwrap();
        let ctx = AdapterContext::new(runner, Some(empty.path().to_path_buf()));

        let dir = UserDirectory::load(&ctx, "ldap://nowhere", "DC=x").await;
        assert!(dir.is_empty());
        assert_eq!(dir.resolve("1001"), "1001");
        let fixture = empty.path().join(FIXTURE).display().to_string();
        assert_eq!(telemetry.errors_for(&fixture), 1);
    }
}
