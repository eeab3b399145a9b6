use crate::request::UploadedFile;
use globset::Glob;
use kdeps_error::{Error, ErrorCode};
use serde_json::Value;

/// `true` when `key` should be routed through [`handle_glob_pattern`]
/// rather than treated as a plain accessor name: it contains a glob
/// wildcard, a path separator, or a dot-delimited extension.
#[must_use]
pub fn is_glob_pattern(key: &str) -> bool {
    key.contains('*') || key.contains('/') || key.contains('\\') || has_extension(key)
}

fn has_extension(key: &str) -> bool {
    let name = key.rsplit(['/', '\\']).next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && !ext.is_empty(),
        None => false,
    }
}

/// A terminal selector applied after pattern + MIME filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Contents of the first match.
    First,
    /// Contents of the last match.
    Last,
    /// The integer match count.
    Count,
    /// All match contents, as an array.
    All,
}

impl Selector {
    /// Parse a selector token; unrecognized tokens have no `Selector` and
    /// fall through to [`handle_glob_pattern`]'s default behavior.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            "count" => Some(Self::Count),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

fn mime_selector(selectors: &[String]) -> Option<&str> {
    selectors.iter().find_map(|s| s.strip_prefix("mime:"))
}

fn terminal_selector(selectors: &[String]) -> Option<Selector> {
    selectors.iter().find_map(|s| Selector::parse(s))
}

fn mime_matches(file_mime: &str, filter: &str) -> bool {
    let strip_charset = |m: &str| m.split(';').next().unwrap_or(m).trim();
    let file_mime = strip_charset(file_mime);
    let filter = strip_charset(filter);
    if let Some(prefix) = filter.strip_suffix("/*") {
        file_mime.split('/').next().is_some_and(|p| p == prefix)
    } else {
        file_mime.eq_ignore_ascii_case(filter)
    }
}

/// `HandleGlobPattern`: match `files` against `pattern`, optionally filter
/// by a `mime:<type>` selector, then apply the terminal selector.
///
/// `original_pattern` is reported in error messages (the caller may have
/// normalized `pattern` before calling in).
pub fn handle_glob_pattern(
    files: &[UploadedFile],
    pattern: &str,
    original_pattern: &str,
    selectors: &[String],
) -> Result<Value, Error> {
    let glob = Glob::new(pattern)
        .map_err(|e| {
            Error::new(ErrorCode::ContextLookupExhausted, "invalid glob pattern")
                .with_context("pattern", original_pattern)
                .with_source(e)
        })?
        .compile_matcher();

    let matched: Vec<&UploadedFile> = files.iter().filter(|f| glob.is_match(&f.name)).collect();

    let mime_filter = mime_selector(selectors);
    let filtered: Vec<&UploadedFile> = match mime_filter {
        Some(filter) => matched
            .into_iter()
            .filter(|f| mime_matches(&f.mime(), filter))
            .collect(),
        None => matched,
    };

    let selector = terminal_selector(selectors);
    match selector {
        Some(Selector::First) => filtered
            .first()
            .map(|f| Value::String(String::from_utf8_lossy(&f.bytes).into_owned()))
            .ok_or_else(|| no_match(original_pattern)),
        Some(Selector::Last) => filtered
            .last()
            .map(|f| Value::String(String::from_utf8_lossy(&f.bytes).into_owned()))
            .ok_or_else(|| no_match(original_pattern)),
        Some(Selector::Count) => Ok(Value::from(filtered.len())),
        Some(Selector::All) => Ok(Value::Array(
            filtered
                .iter()
                .map(|f| Value::String(String::from_utf8_lossy(&f.bytes).into_owned()))
                .collect(),
        )),
        None if mime_filter.is_some() => Ok(Value::Array(
            filtered
                .iter()
                .map(|f| Value::String(String::from_utf8_lossy(&f.bytes).into_owned()))
                .collect(),
        )),
        None => Ok(Value::Array(
            filtered.iter().map(|f| Value::String(f.name.clone())).collect(),
        )),
    }
}

fn no_match(pattern: &str) -> Error {
    Error::new(
        ErrorCode::ContextLookupExhausted,
        format!("no uploaded file matched pattern '{pattern}'"),
    )
    .with_context("pattern", pattern)
}
