use kdeps_core::Version;

/// The ambient "current agent" the legacy (non-`@`) local ref form resolves
/// against, plus the environment-variable fallback spec.md §4.1/§6 names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbientContext {
    /// Explicitly-configured current agent name, if set by the host.
    pub current_agent: Option<String>,
    /// Explicitly-configured current agent version, if set by the host.
    pub current_version: Option<Version>,
}

impl AmbientContext {
    /// An empty context — no current agent known.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context from explicit agent/version.
    #[must_use]
    pub fn new(agent: impl Into<String>, version: Version) -> Self {
        Self {
            current_agent: Some(agent.into()),
            current_version: Some(version),
        }
    }

    /// Resolve the effective current agent name: explicit field first, then
    /// `KDEPS_CURRENT_AGENT`.
    #[must_use]
    pub fn effective_agent(&self) -> Option<String> {
        self.current_agent
            .clone()
            .or_else(|| std::env::var("KDEPS_CURRENT_AGENT").ok())
    }

    /// Resolve the effective current version: explicit field first, then
    /// `KDEPS_CURRENT_VERSION`.
    #[must_use]
    pub fn effective_version(&self) -> Option<Version> {
        self.current_version.or_else(|| {
            std::env::var("KDEPS_CURRENT_VERSION")
                .ok()
                .and_then(|v| v.parse().ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_context_has_no_effective_values_without_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("KDEPS_CURRENT_AGENT");
        std::env::remove_var("KDEPS_CURRENT_VERSION");
        let ctx = AmbientContext::empty();
        assert!(ctx.effective_agent().is_none());
        assert!(ctx.effective_version().is_none());
    }

    #[test]
    fn explicit_fields_win_over_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("KDEPS_CURRENT_AGENT", "from-env");
        let ctx = AmbientContext::new("demo", Version::new(1, 0, 0));
        assert_eq!(ctx.effective_agent().as_deref(), Some("demo"));
        std::env::remove_var("KDEPS_CURRENT_AGENT");
    }

    #[test]
    fn env_fallback_used_when_field_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("KDEPS_CURRENT_AGENT", "from-env");
        std::env::set_var("KDEPS_CURRENT_VERSION", "2.3.0");
        let ctx = AmbientContext::empty();
        assert_eq!(ctx.effective_agent().as_deref(), Some("from-env"));
        assert_eq!(ctx.effective_version(), Some(Version::new(2, 3, 0)));
        std::env::remove_var("KDEPS_CURRENT_AGENT");
        std::env::remove_var("KDEPS_CURRENT_VERSION");
    }
}
