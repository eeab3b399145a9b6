use kdeps_error::{Error, ErrorCode};
use kdeps_identity::{resolve, AmbientContext, Catalog};

/// Canonicalize a collection name for a KV operation scoped to `graph_id`.
///
/// The literal `current` is special-cased to `@<currentAgent>/<graphID>`
/// (failing if no ambient current agent is set); every other name is
/// canonicalized through the identity resolver, same as an action
/// reference.
pub fn canonicalize_collection(
    catalog: &Catalog,
    ctx: &AmbientContext,
    graph_id: &str,
    collection: &str,
) -> Result<String, Error> {
    if collection == "current" {
        let agent = ctx.effective_agent().ok_or_else(|| {
            Error::new(
                ErrorCode::StoreMissingContext,
                "'current' collection requires an ambient current agent",
            )
            .with_context("graph_id", graph_id)
        })?;
        return Ok(format!("@{agent}/{graph_id}"));
    }
    resolve::resolve(catalog, ctx, collection, None, None)
}
