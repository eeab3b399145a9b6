//! Unified error taxonomy with stable error codes for the kdeps workflow
//! runtime.
//!
//! Every error carries an [`ErrorCode`] (a machine-readable, stable string
//! tag), a human-readable message, an optional cause chain, and arbitrary
//! key-value context. Use the builder returned by [`Error::new`] to construct
//! errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Agent/action identity resolution and catalog errors.
    Identity,
    /// Scoped key-value store errors.
    Store,
    /// Dependency registry errors.
    Dependency,
    /// Execution context lookup errors.
    Context,
    /// LLM executor and backend errors.
    Llm,
    /// Tool-call loop errors.
    Tool,
    /// File registry errors.
    FileRegistry,
    /// Configuration loading/validation errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Store => "store",
            Self::Dependency => "dependency",
            Self::Context => "context",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::FileRegistry => "file_registry",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Identity --
    /// A bare (non-`@`) identifier was given with no ambient agent context.
    IdentityMissingContext,
    /// `findLatest` found no versions registered for an agent.
    IdentityNoVersions,
    /// The identifier could not be parsed into agent/action/version parts.
    IdentityMalformedRef,
    /// The `op` query parameter is not one of the recognised operations.
    IdentityUnknownOp,
    /// Register/unregister failed against the underlying catalog database.
    IdentityCatalogFailed,

    // -- Store --
    /// `get`/`set`/`list` referenced a collection with no entries.
    StoreMissingCollection,
    /// `get`/`set` referenced a key not present in the collection.
    StoreMissingKey,
    /// The `current` collection was requested with no ambient agent/graph set.
    StoreMissingContext,
    /// The `op` query parameter is not one of the recognised operations.
    StoreUnknownOp,
    /// The store URI could not be parsed.
    StoreUriInvalid,

    // -- Dependency --
    /// A status update or readiness query named an action not in the graph.
    DependencyUnknownNode,
    /// The dependency registry has not been pre-resolved for this graph.
    DependencyRegistryUninitialized,
    /// `wait_for` exceeded its deadline before the node became ready.
    DependencyWaitTimeout,

    // -- Context --
    /// No accessor in the priority chain produced a value for the key.
    ContextLookupExhausted,
    /// The requested request-body/query parameter is not in `allowed_params`.
    ContextParamNotAllowed,
    /// The requested header is not in `allowed_headers`.
    ContextHeaderNotAllowed,
    /// A typed output accessor referenced a resource with no recorded output.
    ContextMissingResource,

    // -- Llm --
    /// `chatConfig.backend` does not name a registered backend.
    LlmUnknownBackend,
    /// An expression placeholder could not be evaluated.
    LlmEvaluationFailed,
    /// The provider request body could not be assembled.
    LlmRequestBuildFailed,
    /// The provider request body could not be serialized to JSON.
    LlmRequestMarshalFailed,

    // -- Tool --
    /// A tool call named a `script` with no matching resource.
    ToolScriptNotFound,
    /// The external tool executor reported a failure.
    ToolExecutionFailed,

    // -- FileRegistry --
    /// The base directory could not be walked (not missing — unreadable).
    FileRegistryWalkFailed,

    // -- Config --
    /// The requested configuration file does not exist.
    ConfigFileNotFound,
    /// The configuration file is not valid TOML.
    ConfigParseFailed,
    /// Configuration values failed semantic validation.
    ConfigValidationFailed,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::IdentityMissingContext
            | Self::IdentityNoVersions
            | Self::IdentityMalformedRef
            | Self::IdentityUnknownOp
            | Self::IdentityCatalogFailed => ErrorCategory::Identity,

            Self::StoreMissingCollection
            | Self::StoreMissingKey
            | Self::StoreMissingContext
            | Self::StoreUnknownOp
            | Self::StoreUriInvalid => ErrorCategory::Store,

            Self::DependencyUnknownNode
            | Self::DependencyRegistryUninitialized
            | Self::DependencyWaitTimeout => ErrorCategory::Dependency,

            Self::ContextLookupExhausted
            | Self::ContextParamNotAllowed
            | Self::ContextHeaderNotAllowed
            | Self::ContextMissingResource => ErrorCategory::Context,

            Self::LlmUnknownBackend
            | Self::LlmEvaluationFailed
            | Self::LlmRequestBuildFailed
            | Self::LlmRequestMarshalFailed => ErrorCategory::Llm,

            Self::ToolScriptNotFound | Self::ToolExecutionFailed => ErrorCategory::Tool,

            Self::FileRegistryWalkFailed => ErrorCategory::FileRegistry,

            Self::ConfigFileNotFound
            | Self::ConfigParseFailed
            | Self::ConfigValidationFailed => ErrorCategory::Config,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"IDENTITY_NO_VERSIONS"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityMissingContext => "IDENTITY_MISSING_CONTEXT",
            Self::IdentityNoVersions => "IDENTITY_NO_VERSIONS",
            Self::IdentityMalformedRef => "IDENTITY_MALFORMED_REF",
            Self::IdentityUnknownOp => "IDENTITY_UNKNOWN_OP",
            Self::IdentityCatalogFailed => "IDENTITY_CATALOG_FAILED",
            Self::StoreMissingCollection => "STORE_MISSING_COLLECTION",
            Self::StoreMissingKey => "STORE_MISSING_KEY",
            Self::StoreMissingContext => "STORE_MISSING_CONTEXT",
            Self::StoreUnknownOp => "STORE_UNKNOWN_OP",
            Self::StoreUriInvalid => "STORE_URI_INVALID",
            Self::DependencyUnknownNode => "DEPENDENCY_UNKNOWN_NODE",
            Self::DependencyRegistryUninitialized => "DEPENDENCY_REGISTRY_UNINITIALIZED",
            Self::DependencyWaitTimeout => "DEPENDENCY_WAIT_TIMEOUT",
            Self::ContextLookupExhausted => "CONTEXT_LOOKUP_EXHAUSTED",
            Self::ContextParamNotAllowed => "CONTEXT_PARAM_NOT_ALLOWED",
            Self::ContextHeaderNotAllowed => "CONTEXT_HEADER_NOT_ALLOWED",
            Self::ContextMissingResource => "CONTEXT_MISSING_RESOURCE",
            Self::LlmUnknownBackend => "LLM_UNKNOWN_BACKEND",
            Self::LlmEvaluationFailed => "LLM_EVALUATION_FAILED",
            Self::LlmRequestBuildFailed => "LLM_REQUEST_BUILD_FAILED",
            Self::LlmRequestMarshalFailed => "LLM_REQUEST_MARSHAL_FAILED",
            Self::ToolScriptNotFound => "TOOL_SCRIPT_NOT_FOUND",
            Self::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
            Self::FileRegistryWalkFailed => "FILE_REGISTRY_WALK_FAILED",
            Self::ConfigFileNotFound => "CONFIG_FILE_NOT_FOUND",
            Self::ConfigParseFailed => "CONFIG_PARSE_FAILED",
            Self::ConfigValidationFailed => "CONFIG_VALIDATION_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Unified kdeps runtime error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context (always
/// including, by convention, the `op` attempted and the identifier involved).
///
/// # Builder usage
///
/// ```
/// use kdeps_error::{Error, ErrorCode};
///
/// let err = Error::new(ErrorCode::IdentityNoVersions, "no versions registered")
///     .with_context("agent", "demo")
///     .with_context("op", "resolve");
/// ```
pub struct Error {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Error {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Error");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
