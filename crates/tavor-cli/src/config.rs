//! Configuration for the `tavor` binary.
//!
//! The client settings come from the `TAVOR_*` environment variables (see
//! [`ClientConfig::from_env`]); command-line flags override them.

use crate::cli::GlobalFlags;
use tavor_core::ClientConfig;

/// Log directives used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "tavor_core=info,tavor_cli=info";

/// Log directives used with `--debug`.
pub const DEBUG_LOG_FILTER: &str = "tavor_core=debug,tavor_cli=debug";

/// Pick the log filter for this invocation.
pub fn log_filter(flags: &GlobalFlags) -> &'static str {
    if flags.debug {
        DEBUG_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Apply command-line overrides on top of an environment-derived config.
pub fn resolve(flags: &GlobalFlags, mut config: ClientConfig) -> ClientConfig {
    if let Some(url) = flags.base_url.as_deref().filter(|u| !u.is_empty()) {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavor_core::DEFAULT_BASE_URL;

    fn flags(debug: bool, base_url: Option<&str>) -> GlobalFlags {
        GlobalFlags {
            debug,
            base_url: base_url.map(String::from),
        }
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(&flags(false, None)), DEFAULT_LOG_FILTER);
        assert_eq!(log_filter(&flags(true, None)), DEBUG_LOG_FILTER);
    }

    #[test]
    fn test_resolve_keeps_env_without_flags() {
        let config = resolve(&flags(false, None), ClientConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_resolve_overrides_base_url() {
        let config = resolve(
            &flags(false, Some("http://localhost:4000/")),
            ClientConfig::default(),
        );
        assert_eq!(config.base_url, "http://localhost:4000");
    }

    #[test]
    fn test_resolve_ignores_empty_base_url() {
        let config = resolve(&flags(false, Some("")), ClientConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
