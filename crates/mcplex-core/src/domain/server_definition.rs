//! ServerDefinition entity - a registered backend server and how to launch it

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{MuxError, MuxResult};

lazy_static! {
    static ref UNIQUE_NAME_REGEX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap();
}

/// A backend server registered under a globally unique name
///
/// Immutable between add and delete: there is no partial update. The
/// connection manager only ever holds a read copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerDefinition {
    /// Identifier used as the namespace prefix (`[A-Za-z][A-Za-z0-9_-]*`)
    pub unique_name: String,

    /// Executable to launch
    pub command: String,

    /// Ordered arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for the process
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "Utc::now")]
    pub installed_at: DateTime<Utc>,
}

impl ServerDefinition {
    pub fn new(unique_name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            installed_at: Utc::now(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Check the identifier pattern and that a command is present
    pub fn validate(&self) -> MuxResult<()> {
        if !is_valid_unique_name(&self.unique_name) {
            return Err(MuxError::InvalidDefinition(format!(
                "uniqueName '{}' must match [A-Za-z][A-Za-z0-9_-]*",
                self.unique_name
            )));
        }
        if self.command.trim().is_empty() {
            return Err(MuxError::InvalidDefinition(format!(
                "command for '{}' must not be empty",
                self.unique_name
            )));
        }
        Ok(())
    }

    /// Whether both would launch the same backend
    pub fn same_launch(&self, other: &Self) -> bool {
        self.unique_name == other.unique_name
            && self.command == other.command
            && self.args == other.args
            && self.env == other.env
    }

    /// Short launch description for logs
    pub fn launch_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

pub fn is_valid_unique_name(name: &str) -> bool {
    UNIQUE_NAME_REGEX.is_match(name)
}
