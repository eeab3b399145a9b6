use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// A single uploaded file attached to the inbound request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// The filename as given by the caller, e.g. `photo.png`.
    pub name: String,
    /// Absolute path on disk, if the upload was staged to the filesystem
    /// rather than held in memory.
    pub path: Option<PathBuf>,
    /// The raw file contents.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Best-effort MIME type, guessed from the filename extension.
    #[must_use]
    pub fn mime(&self) -> String {
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .to_string()
    }
}

/// Request-scoped input: method, path, headers, query, body, uploaded
/// files, caller IP, and a request id. `None` outside request-scoped
/// execution (see [`crate::ExecutionContext`]).
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// HTTP method, e.g. `"POST"`.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Header name -> value. Lookups go through [`Request::header`], which
    /// is case-insensitive.
    pub headers: HashMap<String, String>,
    /// Query-string parameters.
    pub query: HashMap<String, String>,
    /// Parsed request body.
    pub body: Value,
    /// Uploaded files, in request order.
    pub files: Vec<UploadedFile>,
    /// Caller IP address.
    pub ip: String,
    /// Request id, for correlation in logs.
    pub id: String,
}

impl Request {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body field lookup: only string/number/bool scalars, else `None` —
    /// callers that need the raw body use `.body` directly.
    #[must_use]
    pub fn body_field(&self, name: &str) -> Option<Value> {
        self.body.as_object()?.get(name).cloned()
    }
}
