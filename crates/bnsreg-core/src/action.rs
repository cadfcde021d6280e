use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// The bridge calls this service knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Register,
    Unregister,
    /// Provisions the naming entry that register/unregister operate on.
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Delete,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Register, Action::Unregister, Action::Create];

    /// Bridge API path and method for this action.
    pub fn route(self) -> (&'static str, HttpMethod) {
        match self {
            Action::Register => ("/addRMIports", HttpMethod::Post),
            Action::Unregister => ("/delRMIports", HttpMethod::Delete),
            Action::Create => ("/addServiceName", HttpMethod::Post),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::Unregister => "unregister",
            Action::Create => "create",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ProtocolError::UnsupportedAction(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub action: Action,
}

impl RequestOptions {
    pub fn new(action: Action) -> Self {
        Self { action }
    }
}
