// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Canonical node state labels.
//!
//! Slurm reports a base state (`IDLE`, `MIXED`, ...) plus modifier flags
//! (`DRAIN`, `NOT_RESPONDING`, ...). Known combinations collapse to the
//! name operators use; anything else is surfaced verbatim as
//! `BASE-FLAG1_FLAG2`.

/// Compound states with a well-known name
const OVERRIDES: &[(&str, &str)] = &[
    ("IDLE-DRAIN", "DRAINED"),
    ("MIXED-DRAIN", "DRAINING"),
    ("ALLOCATED-DRAIN", "DRAINING"),
    ("DOWN-NOT_RESPONDING", "DOWN"),
];

/// Combine a base state token and its modifier flags into one uppercase label.
pub fn classify<S: AsRef<str>>(base: &str, flags: &[S]) -> String {
    let base = base.trim().to_uppercase();
    if flags.is_empty() {
        return base;
    }

    let flags: Vec<String> = flags.iter().map(|f| f.as_ref().trim().to_uppercase()).collect();
    let compound = format!("{}-{}", base, flags.join("_"));

    OVERRIDES
        .iter()
        .find(|(key, _)| *key == compound)
        .map(|(_, label)| label.to_string())
        .unwrap_or(compound)
}

/// Split a `scontrol` state such as `MIXED+DRAIN` or `DOWN*+DRAIN` into
/// base and flags.
///
/// A trailing `*` on the base means the node is not responding.
pub fn split_compound(state: &str) -> (String, Vec<String>) {
    let mut parts = state.trim().split('+').filter(|p| !p.is_empty());
    let raw_base = parts.next().unwrap_or("");
    let mut flags: Vec<String> = parts.map(str::to_string).collect();

    let base = match raw_base.strip_suffix('*') {
        Some(stripped) => {
            if !flags.iter().any(|f| f.eq_ignore_ascii_case("NOT_RESPONDING")) {
                flags.push("NOT_RESPONDING".to_string());
            }
            stripped
        }
        None => raw_base,
    };

    (base.to_string(), flags)
}
