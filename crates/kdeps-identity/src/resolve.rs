use crate::catalog::Catalog;
use crate::context::AmbientContext;
use kdeps_core::{ParsedRef, Version};
use kdeps_error::{Error, ErrorCode};

/// `findLatest`: the greatest registered version for `agent`, by numeric
/// per-segment comparison (no semver prerelease awareness, ties resolve
/// equal). Only considers bare `@agent:version` catalog rows — action rows
/// (`@agent/action:version`) are excluded by the `@agent:` prefix match.
pub fn find_latest(catalog: &Catalog, agent: &str) -> Result<Version, Error> {
    let prefix = format!("@{agent}:");
    let rows = catalog.ids_with_prefix(&prefix)?;
    let mut best: Option<Version> = None;
    for (id, _) in rows {
        if let Ok(parsed) = ParsedRef::parse(&id) {
            if let Some(v) = parsed.version {
                best = Some(match best {
                    Some(b) if b >= v => b,
                    _ => v,
                });
            }
        }
    }
    best.ok_or_else(|| {
        Error::new(
            ErrorCode::IdentityNoVersions,
            format!("no versions registered for agent '{agent}'"),
        )
        .with_context("agent", agent)
    })
}

/// Resolve a possibly-non-canonical identifier to its canonical
/// `@agent/action:version` (or `@agent:version`) form.
///
/// `query_agent`/`query_version` are the `agent=`/`version=` query
/// parameters from an `agent://` URI, consulted only for the legacy local
/// form and as the fallback explicit version before `findLatest`.
pub fn resolve(
    catalog: &Catalog,
    ctx: &AmbientContext,
    identifier: &str,
    query_agent: Option<&str>,
    query_version: Option<&str>,
) -> Result<String, Error> {
    let parsed = ParsedRef::parse(identifier)?;

    let agent = if parsed.is_local {
        query_agent
            .map(str::to_string)
            .or_else(|| ctx.effective_agent())
            .ok_or_else(|| missing_context(identifier))?
    } else {
        parsed
            .agent
            .clone()
            .expect("non-local ParsedRef always carries an agent")
    };

    let version = match parsed.version {
        Some(v) => v,
        None => match query_version.and_then(|v| v.parse::<Version>().ok()) {
            Some(v) => v,
            None if parsed.is_local => match ctx.effective_version() {
                Some(v) => v,
                None => find_latest(catalog, &agent)?,
            },
            None => find_latest(catalog, &agent)?,
        },
    };

    Ok(match parsed.action {
        Some(action) => format!("@{agent}/{action}:{version}"),
        None => format!("@{agent}:{version}"),
    })
}

fn missing_context(identifier: &str) -> Error {
    Error::new(
        ErrorCode::IdentityMissingContext,
        format!("'{identifier}' has no leading '@' and no ambient agent context is set"),
    )
    .with_context("identifier", identifier)
}
