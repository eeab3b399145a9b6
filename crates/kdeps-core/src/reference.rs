use crate::version::Version;
use kdeps_error::{Error, ErrorCode};

/// An action/agent reference as parsed from its surface form, before
/// resolution against ambient context or the catalog.
///
/// Surface forms (see [`ParsedRef::parse`]):
/// - `@agent` — bare agent, no action, no explicit version
/// - `@agent:version`
/// - `@agent/action`
/// - `@agent/action:version`
/// - a legacy bare form with no leading `@`, resolved against ambient
///   current-agent context by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    /// Agent name, absent only for the legacy local form until the caller
    /// fills it in from ambient context.
    pub agent: Option<String>,
    /// Action name, when present in the surface form.
    pub action: Option<String>,
    /// Explicit version, when present in the surface form.
    pub version: Option<Version>,
    /// `true` when the original identifier had no leading `@` and must be
    /// resolved against ambient current-agent/version context.
    pub is_local: bool,
}

impl ParsedRef {
    /// Parse a raw identifier into its components.
    ///
    /// Does not consult ambient context or the catalog — purely syntactic.
    /// Returns [`ErrorCode::IdentityMalformedRef`] if an embedded version
    /// segment fails to parse.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if let Some(stripped) = raw.strip_prefix('@') {
            let (agent_part, action_part) = match stripped.split_once('/') {
                Some((a, b)) => (a, Some(b)),
                None => (stripped, None),
            };
            let (agent, agent_version) = split_version(agent_part)?;
            let (action, action_version) = match action_part {
                Some(p) => {
                    let (name, v) = split_version(p)?;
                    (Some(name), v)
                }
                None => (None, None),
            };
            Ok(Self {
                agent: Some(agent),
                action,
                version: action_version.or(agent_version),
                is_local: false,
            })
        } else {
            let (action, version) = split_version(raw)?;
            Ok(Self {
                agent: None,
                action: Some(action),
                version,
                is_local: true,
            })
        }
    }

    /// Render the canonical `@agent/action:version` (or `@agent:version`
    /// without an action) form. Returns `None` if `agent` or `version` is
    /// still unresolved.
    #[must_use]
    pub fn canonical(&self) -> Option<String> {
        let agent = self.agent.as_ref()?;
        let version = self.version?;
        Some(match &self.action {
            Some(action) => format!("@{agent}/{action}:{version}"),
            None => format!("@{agent}:{version}"),
        })
    }
}

/// Split a `name` or `name:version` fragment. An empty version suffix (a
/// trailing bare `:`) is treated as absent rather than malformed.
fn split_version(part: &str) -> Result<(String, Option<Version>), Error> {
    match part.split_once(':') {
        Some((name, v)) if !v.is_empty() => {
            let version = v.parse::<Version>().map_err(|e| {
                Error::new(
                    ErrorCode::IdentityMalformedRef,
                    format!("invalid version in '{part}'"),
                )
                .with_source(e)
            })?;
            Ok((name.to_string(), Some(version)))
        }
        Some((name, _)) => Ok((name.to_string(), None)),
        None => Ok((part.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_agent() {
        let r = ParsedRef::parse("@demo").unwrap();
        assert_eq!(r.agent.as_deref(), Some("demo"));
        assert!(r.action.is_none());
        assert!(r.version.is_none());
        assert!(!r.is_local);
    }

    #[test]
    fn parses_agent_with_version() {
        let r = ParsedRef::parse("@demo:1.2.0").unwrap();
        assert_eq!(r.agent.as_deref(), Some("demo"));
        assert_eq!(r.version, Some(Version::new(1, 2, 0)));
    }

    #[test]
    fn parses_agent_and_action() {
        let r = ParsedRef::parse("@demo/greet").unwrap();
        assert_eq!(r.agent.as_deref(), Some("demo"));
        assert_eq!(r.action.as_deref(), Some("greet"));
        assert!(r.version.is_none());
    }

    #[test]
    fn parses_agent_and_action_with_version() {
        let r = ParsedRef::parse("@demo/greet:2.0.1").unwrap();
        assert_eq!(r.agent.as_deref(), Some("demo"));
        assert_eq!(r.action.as_deref(), Some("greet"));
        assert_eq!(r.version, Some(Version::new(2, 0, 1)));
    }

    #[test]
    fn parses_legacy_local_form() {
        let r = ParsedRef::parse("greet").unwrap();
        assert!(r.is_local);
        assert!(r.agent.is_none());
        assert_eq!(r.action.as_deref(), Some("greet"));
    }

    #[test]
    fn parses_legacy_local_form_with_version() {
        let r = ParsedRef::parse("greet:1.0.0").unwrap();
        assert!(r.is_local);
        assert_eq!(r.action.as_deref(), Some("greet"));
        assert_eq!(r.version, Some(Version::new(1, 0, 0)));
    }

    #[test]
    fn rejects_malformed_version() {
        assert!(ParsedRef::parse("@demo:abc").is_err());
    }

    #[test]
    fn canonical_requires_agent_and_version() {
        let r = ParsedRef::parse("@demo/greet").unwrap();
        assert!(r.canonical().is_none());
    }

    #[test]
    fn canonical_with_action() {
        let mut r = ParsedRef::parse("@demo/greet").unwrap();
        r.version = Some(Version::new(1, 0, 0));
        assert_eq!(r.canonical().as_deref(), Some("@demo/greet:1.0.0"));
    }

    #[test]
    fn canonical_without_action() {
        let r = ParsedRef::parse("@demo:3.0.0").unwrap();
        assert_eq!(r.canonical().as_deref(), Some("@demo:3.0.0"));
    }
}
