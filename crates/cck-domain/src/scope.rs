use std::sync::Arc;

// ── Reserved names ────────────────────────────────────────────────────────────

/// Separates a compiled scope name from a list name in a backend key.
/// Reserved: must not appear in user-supplied scope or list names.
pub const LIST_KEY_DELIMITER: &str = "<<<--->>>";

/// System scope holding the bucket-event notification config registry.
pub const MONITOR_SCOPE: &str = "MonitorBasedPubSub.FileService";

/// System scope for the singleton dispatch mutex of the file monitor.
pub const MONITOR_DISPATCH_SCOPE: &str = "MonitorBasedPubSub.ObserveFileServiceAndDispatchEvents";

// ── MemoryScope ───────────────────────────────────────────────────────────────

/// A namespace for a set of memory keys and lists.
///
/// Either a precomputed string or a function compiled on demand, so callers
/// can derive the namespace from ambient state (tenant, session) at call
/// time. `compile()` yields the on-the-wire name.
#[derive(Clone)]
pub enum MemoryScope {
    Static(String),
    Lazy(Arc<dyn Fn() -> String + Send + Sync>),
}

impl MemoryScope {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryScope::Static(name.into())
    }

    pub fn lazy(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        MemoryScope::Lazy(Arc::new(f))
    }

    pub fn compile(&self) -> String {
        match self {
            MemoryScope::Static(s) => s.clone(),
            MemoryScope::Lazy(f) => f(),
        }
    }

    /// The backend key of a named list under this scope.
    pub fn list_key(&self, list: &str) -> String {
        format!("{}{}{}", self.compile(), LIST_KEY_DELIMITER, list)
    }
}

impl std::fmt::Debug for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryScope::Static(s) => f.debug_tuple("Static").field(s).finish(),
            MemoryScope::Lazy(_) => f.debug_tuple("Lazy").field(&"<fn>").finish(),
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.compile())
    }
}

impl From<&str> for MemoryScope {
    fn from(s: &str) -> Self {
        MemoryScope::new(s)
    }
}

impl From<String> for MemoryScope {
    fn from(s: String) -> Self {
        MemoryScope::Static(s)
    }
}
