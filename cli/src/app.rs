//! Application context — unified state passed to every command handler.

use crate::infra::config::YamlConfigStore;
use crate::output::OutputContext;

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Machine-readable JSON output instead of terminal text.
    pub json: bool,
    /// Source of the vcdriver configuration.
    pub config_store: YamlConfigStore,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(flags: &OutputFlags) -> Self {
        Self {
            // JSON output owns stdout; progress lines would corrupt it.
            output: OutputContext::new(flags.no_color, flags.quiet || flags.json),
            json: flags.json,
            config_store: YamlConfigStore,
        }
    }
}
