use std::collections::BTreeMap;

/// Split an opaque-authority URI of the form `scheme://identifier?query` (or
/// the bare-colon form `scheme:identifier?query`) into its raw identifier and
/// a deterministically-ordered map of query parameters.
///
/// Both `kdeps-identity`'s `agent://` reader and `kdeps-store`'s `pklres://`
/// reader share this shape; neither scheme carries real host/authority
/// semantics, so no percent-decoding is applied to the identifier — callers
/// construct these URIs programmatically, not from untrusted network input.
#[must_use]
pub fn split_scheme_and_query(raw: &str, scheme: &str) -> (String, BTreeMap<String, String>) {
    let (head, query) = raw.split_once('?').unwrap_or((raw, ""));
    let double = format!("{scheme}://");
    let single = format!("{scheme}:");
    let identifier = head
        .strip_prefix(double.as_str())
        .or_else(|| head.strip_prefix(single.as_str()))
        .unwrap_or(head)
        .to_string();
    let params = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    (identifier, params)
}
