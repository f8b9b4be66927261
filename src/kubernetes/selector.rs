// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed label selectors with a single serialization path

use crate::error::{AdmissionError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A single `key <op> values` term of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    pub fn new(key: impl Into<String>, operator: Operator, values: Vec<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AdmissionError::InvalidSelector(
                "requirement key must not be empty".to_string(),
            ));
        }

        let arity_ok = match operator {
            Operator::Equals | Operator::NotEquals => values.len() == 1,
            Operator::In | Operator::NotIn => !values.is_empty(),
            Operator::Exists | Operator::DoesNotExist => values.is_empty(),
        };
        if !arity_ok {
            return Err(AdmissionError::InvalidSelector(format!(
                "operator {:?} on key {} does not accept {} value(s)",
                operator,
                key,
                values.len()
            )));
        }
        if values.iter().any(|v| v.contains([',', '(', ')', '=', '!'])) {
            return Err(AdmissionError::InvalidSelector(format!(
                "values for key {} contain reserved characters",
                key
            )));
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, self.values[0]),
            Operator::NotEquals => write!(f, "{}!={}", self.key, self.values[0]),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Conjunction of requirements, serialized in the API server's query syntax
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Exact-match selector on a single label, e.g. `app=kubedb`
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Ok(Self {
            requirements: vec![Requirement::new(key, Operator::Equals, vec![value.into()])?],
        })
    }

    /// Equality selector matching every label in the map
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Result<Self> {
        let requirements = labels
            .iter()
            .map(|(k, v)| Requirement::new(k.clone(), Operator::Equals, vec![v.clone()]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }

    pub fn and(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}

impl FromStr for LabelSelector {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self> {
        let requirements = split_terms(s)?
            .into_iter()
            .filter(|term| !term.is_empty())
            .map(parse_term)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }
}

/// Split on commas that are not inside a value set
fn split_terms(s: &str) -> Result<Vec<&str>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    AdmissionError::InvalidSelector(format!("unbalanced ')' in {}", s))
                })?
            }
            ',' if depth == 0 => {
                terms.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(AdmissionError::InvalidSelector(format!("unclosed '(' in {}", s)));
    }
    terms.push(s[start..].trim());
    Ok(terms)
}

fn parse_term(term: &str) -> Result<Requirement> {
    if let Some(key) = term.strip_prefix('!') {
        return Requirement::new(key.trim(), Operator::DoesNotExist, vec![]);
    }
    if let Some((key, rest)) = term.split_once(" notin ") {
        return Requirement::new(key.trim(), Operator::NotIn, parse_set(rest)?);
    }
    if let Some((key, rest)) = term.split_once(" in ") {
        return Requirement::new(key.trim(), Operator::In, parse_set(rest)?);
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Requirement::new(key.trim(), Operator::NotEquals, vec![value.trim().to_string()]);
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Requirement::new(key.trim(), Operator::Equals, vec![value.trim().to_string()]);
    }
    Requirement::new(term, Operator::Exists, vec![])
}

fn parse_set(raw: &str) -> Result<Vec<String>> {
    let inner = raw
        .trim()
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| AdmissionError::InvalidSelector(format!("malformed value set {}", raw)))?;
    Ok(inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}
