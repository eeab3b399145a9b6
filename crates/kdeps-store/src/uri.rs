use kdeps_error::{Error, ErrorCode};
use std::str::FromStr;

/// Operations recognised by the `pklres://` reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PklresOp {
    /// Fetch a key from a collection.
    Get,
    /// Upsert a key in a collection.
    Set,
    /// List the keys in a collection.
    List,
    /// Block (up to a timeout) until a dependency's node is ready, then
    /// return it.
    AsyncResolve,
    /// Return a dependency node's current status without waiting.
    AsyncStatus,
}

impl FromStr for PklresOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            "list" => Ok(Self::List),
            "async_resolve" => Ok(Self::AsyncResolve),
            "async_status" => Ok(Self::AsyncStatus),
            other => Err(Error::new(
                ErrorCode::StoreUnknownOp,
                format!("unrecognised pklres op '{other}'"),
            )
            .with_context("op", other)),
        }
    }
}

/// A parsed `pklres://` reader request.
///
/// `identifier` carries the collection name for `get`/`set`/`list` and the
/// action id for `async_resolve`/`async_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PklresUri {
    /// The path component.
    pub identifier: String,
    /// Which operation to perform.
    pub op: PklresOp,
    /// `graph` query parameter — every operation is graph-scoped.
    pub graph: Option<String>,
    /// `key` query parameter (get/set).
    pub key: Option<String>,
    /// `value` query parameter (set).
    pub value: Option<String>,
    /// `timeout_ms` query parameter (async_resolve).
    pub timeout_ms: Option<u64>,
}

impl PklresUri {
    /// Parse a raw `pklres://...` (or `pklres:...`) URI string.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let (identifier, params) = kdeps_core::split_scheme_and_query(raw, "pklres");
        let op = match params.get("op") {
            Some(op) => op.parse()?,
            None => {
                return Err(Error::new(
                    ErrorCode::StoreUriInvalid,
                    "pklres:// URIs require an explicit 'op' query parameter",
                )
                .with_context("uri", raw))
            }
        };
        let timeout_ms = match params.get("timeout_ms") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                Error::new(ErrorCode::StoreUriInvalid, format!("invalid timeout_ms '{raw}'"))
                    .with_source(e)
            })?),
            None => None,
        };
        Ok(Self {
            identifier,
            op,
            graph: params.get("graph").cloned(),
            key: params.get("key").cloned(),
            value: params.get("value").cloned(),
            timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get() {
        let uri = PklresUri::parse("pklres://@demo:1.0.0?op=get&key=name&graph=g1").unwrap();
        assert_eq!(uri.op, PklresOp::Get);
        assert_eq!(uri.identifier, "@demo:1.0.0");
        assert_eq!(uri.key.as_deref(), Some("name"));
        assert_eq!(uri.graph.as_deref(), Some("g1"));
    }

    #[test]
    fn parses_set_with_value() {
        let uri =
            PklresUri::parse("pklres://@demo:1.0.0?op=set&key=name&value=alice&graph=g1").unwrap();
        assert_eq!(uri.op, PklresOp::Set);
        assert_eq!(uri.value.as_deref(), Some("alice"));
    }

    #[test]
    fn parses_async_resolve_with_timeout() {
        let uri = PklresUri::parse("pklres://@demo/greet:1.0.0?op=async_resolve&timeout_ms=2000&graph=g1")
            .unwrap();
        assert_eq!(uri.op, PklresOp::AsyncResolve);
        assert_eq!(uri.timeout_ms, Some(2000));
    }

    #[test]
    fn missing_op_is_an_error() {
        assert!(PklresUri::parse("pklres://x?graph=g1").is_err());
    }

    #[test]
    fn unknown_op_is_an_error() {
        assert!(PklresUri::parse("pklres://x?op=bogus").is_err());
    }

    #[test]
    fn invalid_timeout_is_an_error() {
        assert!(PklresUri::parse("pklres://x?op=async_resolve&timeout_ms=soon").is_err());
    }
}
