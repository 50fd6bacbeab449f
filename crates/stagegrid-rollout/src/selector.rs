//! Selector resolution: label-equality selectors over the cluster registry.
//!
//! A selector is a comma-separated list of requirements:
//!
//! ```text
//! region=eu-west-1,tier!=canary
//! ```
//!
//! `=` and `==` require equality, `!=` requires the label to be absent or
//! different. An empty expression selects every cluster.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use stagegrid_state::{ClusterRecord, StateStore};

use crate::error::ResolutionError;

/// A single label requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals { key: String, value: String },
    NotEquals { key: String, value: String },
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals { key, value } => labels.get(key) == Some(value),
            Requirement::NotEquals { key, value } => labels.get(key) != Some(value),
        }
    }
}

/// A parsed label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// A selector matching every cluster.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse a selector expression.
    pub fn parse(expr: &str) -> Result<Self, ResolutionError> {
        let malformed = |reason: String| ResolutionError::Malformed {
            selector: expr.to_string(),
            reason,
        };

        let mut requirements = Vec::new();
        if expr.trim().is_empty() {
            return Ok(Self { requirements });
        }

        for term in expr.split(',') {
            let term = term.trim();
            if term.is_empty() {
                return Err(malformed("empty requirement".to_string()));
            }

            let (key, value, negated) = if let Some((k, v)) = term.split_once("!=") {
                (k, v, true)
            } else if let Some((k, v)) = term.split_once("==") {
                (k, v, false)
            } else if let Some((k, v)) = term.split_once('=') {
                (k, v, false)
            } else {
                return Err(malformed(format!("`{term}` has no `=`, `==` or `!=`")));
            };

            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                return Err(malformed(format!("`{term}` has an empty key")));
            }
            if !key.chars().all(is_key_char) {
                return Err(malformed(format!("invalid label key `{key}`")));
            }
            if !value.chars().all(is_value_char) {
                return Err(malformed(format!("invalid label value `{value}`")));
            }

            let (key, value) = (key.to_string(), value.to_string());
            requirements.push(if negated {
                Requirement::NotEquals { key, value }
            } else {
                Requirement::Equals { key, value }
            });
        }

        Ok(Self { requirements })
    }

    /// Whether every requirement holds for `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl FromStr for Selector {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match req {
                Requirement::Equals { key, value } => write!(f, "{key}={value}")?,
                Requirement::NotEquals { key, value } => write!(f, "{key}!={value}")?,
            }
        }
        Ok(())
    }
}

/// The cluster registry as seen by the controller.
pub trait ClusterRegistry: Send + Sync {
    /// Return every registered cluster matching `selector`.
    ///
    /// Zero matches is a valid, empty result.
    fn resolve(&self, selector: &Selector) -> Result<Vec<ClusterRecord>, ResolutionError>;
}

impl ClusterRegistry for StateStore {
    fn resolve(&self, selector: &Selector) -> Result<Vec<ClusterRecord>, ResolutionError> {
        let clusters = self
            .list_clusters()
            .map_err(|e| ResolutionError::Registry(e.to_string()))?;
        Ok(clusters
            .into_iter()
            .filter(|c| selector.matches(&c.labels))
            .collect())
    }
}

/// Parse `expr` and resolve it against `registry`.
pub fn resolve_expr(
    registry: &dyn ClusterRegistry,
    expr: &str,
) -> Result<Vec<ClusterRecord>, ResolutionError> {
    let selector = Selector::parse(expr)?;
    registry.resolve(&selector)
}
