//! Runtime environment detection.
//!
//! Provides a single source of truth for determining the runtime environment
//! (test, development, production) based on the `BUTLER_ENV` environment variable.
//!
//! # Usage
//!
//! ```rust
//! use butler::env::{Environment, is_any_test};
//!
//! if Environment::current().is_test() {
//!     // Keep config and sockets under the temp dir
//! }
//!
//! if is_any_test() {
//!     // Test-specific behavior
//! }
//! ```
//!
//! # Environment Variable
//!
//! Set `BUTLER_ENV` to one of:
//! - `test` - Test mode (config and runtime files under the temp dir)
//! - `development` or `dev` - Development mode (debug logging by default)
//! - (anything else or unset) - Production mode

/// Runtime environment for the butler binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment.
    Test,
}

impl Environment {
    /// Detect current environment from `BUTLER_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("BUTLER_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Returns `true` if this is the production environment.
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Returns `true` if this is the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    /// Default `env_logger` filter for this environment.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Test => "info",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Returns `true` if running in test mode.
#[must_use]
pub fn is_any_test() -> bool {
    Environment::current().is_test()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_values() {
        assert_eq!(Environment::parse(Some("test")), Environment::Test);
        assert_eq!(Environment::parse(Some("dev")), Environment::Development);
        assert_eq!(Environment::parse(Some("development")), Environment::Development);
    }

    #[test]
    fn test_parse_defaults_to_production() {
        assert_eq!(Environment::parse(None), Environment::Production);
        assert_eq!(Environment::parse(Some("staging")), Environment::Production);
        assert!(Environment::parse(None).is_production());
    }

    #[test]
    fn test_display_and_log_filter() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.default_log_filter(), "debug");
        assert_eq!(Environment::Production.default_log_filter(), "info");
    }
}
