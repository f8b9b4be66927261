// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Assert that a `key=value` configuration was applied in at least one observed source

use std::collections::BTreeMap;

/// Observed configuration, one map per source (e.g. per config file or secret)
pub type ConfigEntries = [BTreeMap<String, Vec<u8>>];

/// True iff any map holds `key` with exactly the bytes of `value`.
///
/// `expected` is split on the first `=`; without one nothing matches.
pub fn matches(actual: &ConfigEntries, expected: &str) -> bool {
    let Some((key, value)) = expected.split_once('=') else {
        return false;
    };

    actual
        .iter()
        .any(|entries| entries.get(key).is_some_and(|v| v.as_slice() == value.as_bytes()))
}

/// A reusable expectation with assertion messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMatcher {
    expected: String,
}

impl ConfigMatcher {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    pub fn matches(&self, actual: &ConfigEntries) -> bool {
        matches(actual, &self.expected)
    }

    pub fn failure_message(&self, actual: &ConfigEntries) -> String {
        format!(
            "Expected {} to be equivalent to {}",
            render(actual),
            self.expected
        )
    }

    pub fn negated_failure_message(&self, actual: &ConfigEntries) -> String {
        format!(
            "Expected {} not to be equivalent to {}",
            render(actual),
            self.expected
        )
    }
}

fn render(actual: &ConfigEntries) -> String {
    let sources: Vec<String> = actual
        .iter()
        .map(|entries| {
            let pairs: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}={}", k, String::from_utf8_lossy(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        })
        .collect();
    format!("[{}]", sources.join(", "))
}
