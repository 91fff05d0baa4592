// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Best-effort parsing helpers shared by the adapters.
//!
//! Malformed numbers become `0.0` rather than failing a record: a partial
//! row still contributes the fields that did parse.

use serde::{Deserialize, Deserializer};

/// Split `data` into lines and each line on `delim`.
///
/// Lines that do not contain the delimiter (headers, trailers, blank lines)
/// are skipped.
pub fn delimited_lines(data: &str, delim: char) -> impl Iterator<Item = Vec<&str>> {
    data.lines()
        .filter(move |line| line.contains(delim))
        .map(move |line| line.split(delim).collect())
}

/// Parse a number, falling back to zero.
pub fn number(s: &str) -> f64 {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Field `idx` of a split line, or `""` when the row is short.
pub fn field<'a>(fields: &[&'a str], idx: usize) -> &'a str {
    fields.get(idx).copied().unwrap_or("")
}

/// CPU counts in Slurm's `allocated/idle/other/total` notation (`%C`)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuStates {
    pub allocated: f64,
    pub idle: f64,
    pub other: f64,
    pub total: f64,
}

impl CpuStates {
    pub fn parse(s: &str) -> Self {
        let parts: Vec<&str> = s.trim().split('/').collect();
        Self {
            allocated: number(field(&parts, 0)),
            idle: number(field(&parts, 1)),
            other: number(field(&parts, 2)),
            total: number(field(&parts, 3)),
        }
    }
}

/// Sum the GPU counts in a GRES string.
///
/// Accepts the comma separated forms Slurm prints, e.g. `gpu:nvidia:3`,
/// `gpu:2(S:0-1)`, `gpu:a100:4(IDX:0-3),mps:100`. Non-GPU resources are ignored.
pub fn gres_gpus(gres: &str) -> f64 {
    split_gres(gres)
        .into_iter()
        .filter(|res| *res == "gpu" || res.starts_with("gpu:"))
        .map(|res| {
            let without_index = res.split('(').next().unwrap_or(res);
            number(without_index.rsplit(':').next().unwrap_or(""))
        })
        .fold(0.0, |acc, n| acc + n)
}

/// Split on commas that are not inside parentheses (`gpu:2(IDX:0,2)` stays whole).
fn split_gres(gres: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in gres.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(gres[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(gres[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

/// A JSON number in any of the shapes Slurm's JSON output has used.
///
/// Older releases print plain numbers; newer ones wrap them as
/// `{"set": true, "infinite": false, "number": 42}`. Unset, infinite,
/// null and non-numeric values read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Number(pub f64);

impl Number {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Plain(f64),
            Wrapped {
                #[serde(default)]
                set: Option<bool>,
                #[serde(default)]
                infinite: bool,
                #[serde(default)]
                number: Option<f64>,
            },
            Text(String),
            Bool(bool),
        }

        let value = match Option::<Shape>::deserialize(deserializer)? {
            Some(Shape::Plain(v)) => v,
            Some(Shape::Wrapped { set, infinite, number }) => {
                if set == Some(false) || infinite {
                    0.0
                } else {
                    number.unwrap_or(0.0)
                }
            }
            Some(Shape::Text(s)) => self::number(&s),
            Some(Shape::Bool(_)) | None => 0.0,
        };
        Ok(Number(if value.is_finite() { value } else { 0.0 }))
    }
}

/// A list of state tokens given either as one string or as an array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tokens(pub Vec<String>);

impl<'de> Deserialize<'de> for Tokens {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            One(String),
            Many(Vec<String>),
        }

        Ok(Tokens(match Option::<Shape>::deserialize(deserializer)? {
            Some(Shape::One(s)) if s.is_empty() => Vec::new(),
            Some(Shape::One(s)) => vec![s],
            Some(Shape::Many(v)) => v,
            None => Vec::new(),
        }))
    }
}

/// A string that may be null or missing in the JSON document.
pub fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
