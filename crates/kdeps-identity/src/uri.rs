use kdeps_error::{Error, ErrorCode};
use std::str::FromStr;

/// Operations recognised by the `agent://` reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOp {
    /// Canonicalize a possibly-non-canonical identifier (the default).
    Resolve,
    /// Return a `copy_all_resources` marker document for a path.
    List,
    /// Walk the filesystem layout and list installed agents.
    ListInstalled,
    /// Add a catalog row.
    Register,
    /// Remove a catalog row.
    Unregister,
}

impl FromStr for AgentOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolve" => Ok(Self::Resolve),
            "list" => Ok(Self::List),
            "list-installed" => Ok(Self::ListInstalled),
            "register" => Ok(Self::Register),
            "unregister" => Ok(Self::Unregister),
            other => Err(Error::new(
                ErrorCode::IdentityUnknownOp,
                format!("unrecognised agent op '{other}'"),
            )
            .with_context("op", other)),
        }
    }
}

/// A parsed `agent://` reader request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentUri {
    /// The path component — carries the action id being operated on.
    pub identifier: String,
    /// Which operation to perform.
    pub op: AgentOp,
    /// `agent` query parameter.
    pub agent: Option<String>,
    /// `version` query parameter.
    pub version: Option<String>,
    /// `path` query parameter (register/list).
    pub path: Option<String>,
}

impl AgentUri {
    /// Parse a raw `agent://...` (or `agent:...`) URI string.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let (identifier, params) = kdeps_core::split_scheme_and_query(raw, "agent");
        let op = match params.get("op") {
            Some(op) => op.parse()?,
            None => AgentOp::Resolve,
        };
        Ok(Self {
            identifier,
            op,
            agent: params.get("agent").cloned(),
            version: params.get("version").cloned(),
            path: params.get("path").cloned(),
        })
    }
}
