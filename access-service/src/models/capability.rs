//! Capability matrix: HTTP method -> set of permitted actions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Methods a capability matrix may grant.
pub const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Unsupported HTTP method: {0}")]
    UnknownMethod(String),

    #[error("Invalid action name: {0:?}")]
    InvalidAction(String),

    #[error("Malformed capability entry: {0}")]
    MalformedEntry(String),
}

/// Which actions each HTTP method may perform.
///
/// An action is the terminal path segment of a resource URL, so
/// `GET /api/users` is the pair `("GET", "users")`. An empty matrix grants
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, BTreeSet<String>>",
    into = "BTreeMap<String, BTreeSet<String>>"
)]
pub struct CapabilityMatrix(BTreeMap<String, BTreeSet<String>>);

impl CapabilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `action` under `method`.
    pub fn grant(&mut self, method: &str, action: &str) -> Result<(), CapabilityError> {
        validate_method(method)?;
        validate_action(action)?;
        self.0
            .entry(method.to_string())
            .or_default()
            .insert(action.to_string());
        Ok(())
    }

    /// Builder form of [`grant`](Self::grant) for several actions at once.
    pub fn with<'a, I>(mut self, method: &str, actions: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        validate_method(method)?;
        let entry = self.0.entry(method.to_string()).or_default();
        for action in actions {
            validate_action(action)?;
            entry.insert(action.to_string());
        }
        Ok(self)
    }

    pub fn allows(&self, method: &str, action: &str) -> bool {
        self.0
            .get(method)
            .is_some_and(|actions| actions.contains(action))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    pub fn actions(&self, method: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(method)
            .into_iter()
            .flat_map(|actions| actions.iter().map(String::as_str))
    }
}

fn validate_method(method: &str) -> Result<(), CapabilityError> {
    if HTTP_METHODS.contains(&method) {
        Ok(())
    } else {
        Err(CapabilityError::UnknownMethod(method.to_string()))
    }
}

fn validate_action(action: &str) -> Result<(), CapabilityError> {
    if action.is_empty() || action.contains('/') || action.chars().any(char::is_whitespace) {
        return Err(CapabilityError::InvalidAction(action.to_string()));
    }
    Ok(())
}

impl TryFrom<BTreeMap<String, BTreeSet<String>>> for CapabilityMatrix {
    type Error = CapabilityError;

    fn try_from(raw: BTreeMap<String, BTreeSet<String>>) -> Result<Self, Self::Error> {
        let mut matrix = CapabilityMatrix::new();
        for (method, actions) in &raw {
            matrix = matrix.with(method, actions.iter().map(String::as_str))?;
        }
        Ok(matrix)
    }
}

impl From<CapabilityMatrix> for BTreeMap<String, BTreeSet<String>> {
    fn from(matrix: CapabilityMatrix) -> Self {
        matrix.0
    }
}

/// Parses the configuration form `GET=users,posts;POST=posts`.
impl FromStr for CapabilityMatrix {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut matrix = CapabilityMatrix::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (method, actions) = entry
                .split_once('=')
                .ok_or_else(|| CapabilityError::MalformedEntry(entry.to_string()))?;
            let actions = actions
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty());
            matrix = matrix.with(method.trim(), actions)?;
        }
        Ok(matrix)
    }
}

impl fmt::Display for CapabilityMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .0
            .iter()
            .map(|(method, actions)| {
                let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
                format!("{}={}", method, actions.join(","))
            })
            .collect();
        f.write_str(&entries.join(";"))
    }
}
