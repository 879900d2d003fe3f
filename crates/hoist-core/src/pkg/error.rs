//! Package manager error types.

use std::io;

/// Package manager error codes.
pub mod codes {
    /// The specifier could not be parsed.
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    /// No package with that name exists.
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    /// The package exists but no version satisfies the request.
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    /// Registry transport or status failure.
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    /// A package manifest could not be parsed.
    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";
    /// A lock descriptor could not be parsed.
    pub const PKG_LOCKFILE_INVALID: &str = "PKG_LOCKFILE_INVALID";
    /// Another install holds the project lock.
    pub const PKG_INSTALL_LOCKED: &str = "PKG_INSTALL_LOCKED";
    /// Writing requested packages back to the manifest failed.
    pub const PKG_SAVE_FAILED: &str = "PKG_SAVE_FAILED";
    /// Filesystem failure while reading the installed tree.
    pub const PKG_IO_ERROR: &str = "PKG_IO_ERROR";

    // Warning codes (never returned as errors)
    /// An optional dependency failed to resolve and was skipped.
    pub const PKG_OPTIONAL_SKIPPED: &str = "PKG_OPTIONAL_SKIPPED";
    /// A dependency range in a manifest was not a string.
    pub const PKG_DEP_RANGE_INVALID: &str = "PKG_DEP_RANGE_INVALID";
    /// An installed package directory had no readable manifest.
    pub const PKG_INSTALLED_UNREADABLE: &str = "PKG_INSTALLED_UNREADABLE";
}

/// Package manager error.
///
/// Carries a stable code, a message, and the chain of requesters
/// (`name@version`, innermost first) that led to the failing resolution.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}{}", chain_suffix(.required_by))]
pub struct PkgError {
    code: &'static str,
    message: String,
    required_by: Vec<String>,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            required_by: Vec::new(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Requester chain, innermost first. Empty when the error did not arise
    /// while resolving a dependency.
    #[must_use]
    pub fn required_by(&self) -> &[String] {
        &self.required_by
    }

    /// Attach the requester chain.
    ///
    /// The first chain attached wins: an error bubbling out of a nested
    /// resolution keeps the deepest (most specific) chain.
    #[must_use]
    pub fn with_required_by(mut self, chain: Vec<String>) -> Self {
        if self.required_by.is_empty() {
            self.required_by = chain;
        }
        self
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"))
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("No version of {name} satisfies range: {range}"),
        )
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// Create a manifest parse error.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_INVALID, msg)
    }

    /// Create a lock descriptor parse error.
    pub fn lockfile_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_LOCKFILE_INVALID, msg)
    }

    /// Create an install-locked error.
    #[must_use]
    pub fn install_locked(path: &std::path::Path) -> Self {
        Self::new(
            codes::PKG_INSTALL_LOCKED,
            format!("Another install is in progress (lock held: {})", path.display()),
        )
    }

    /// Create a save failed error.
    pub fn save_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SAVE_FAILED, msg)
    }

    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_IO_ERROR, msg)
    }
}

fn chain_suffix(chain: &[String]) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (required by {})", chain.join(" > "))
    }
}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_IO_ERROR, e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::new(codes::PKG_MANIFEST_INVALID, format!("Invalid registry response: {e}"))
        } else {
            Self::new(codes::PKG_REGISTRY_ERROR, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PKG_MANIFEST_INVALID, format!("Invalid JSON: {e}"))
    }
}

/// A recoverable condition found while planning.
///
/// The library does not log; warnings travel with the result and the CLI
/// decides how to report them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PkgWarning {
    /// Stable warning code.
    pub code: &'static str,
    /// What the warning is about (package name, path, or specifier).
    pub subject: String,
    /// Human-readable detail.
    pub message: String,
}

impl PkgWarning {
    /// Create a new warning.
    #[must_use]
    pub fn new(code: &'static str, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Warning for an optional dependency that could not be installed.
    #[must_use]
    pub fn optional_skipped(name: &str, err: &PkgError) -> Self {
        Self::new(
            codes::PKG_OPTIONAL_SKIPPED,
            name,
            format!("Couldn't install optional dependency: {err}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        let err = PkgError::spec_invalid("bad spec");
        assert_eq!(err.code(), codes::PKG_SPEC_INVALID);
        assert!(err.to_string().contains(codes::PKG_SPEC_INVALID));
    }

    #[test]
    fn test_required_by_display() {
        let err = PkgError::not_found("left-pad")
            .with_required_by(vec!["b@1.0.0".to_string(), "app@0.1.0".to_string()]);
        assert_eq!(
            err.to_string(),
            "PKG_NOT_FOUND: Package not found: left-pad (required by b@1.0.0 > app@0.1.0)"
        );
    }

    #[test]
    fn test_innermost_chain_wins() {
        let err = PkgError::not_found("x")
            .with_required_by(vec!["c@1.0.0".to_string(), "b@1.0.0".to_string()])
            .with_required_by(vec!["b@1.0.0".to_string()]);
        assert_eq!(err.required_by(), ["c@1.0.0", "b@1.0.0"]);
    }

    #[test]
    fn test_error_codes_uppercase() {
        // All codes should be SCREAMING_SNAKE_CASE
        let all_codes = [
            codes::PKG_SPEC_INVALID,
            codes::PKG_NOT_FOUND,
            codes::PKG_VERSION_NOT_FOUND,
            codes::PKG_REGISTRY_ERROR,
            codes::PKG_MANIFEST_INVALID,
            codes::PKG_LOCKFILE_INVALID,
            codes::PKG_INSTALL_LOCKED,
            codes::PKG_SAVE_FAILED,
            codes::PKG_IO_ERROR,
            codes::PKG_OPTIONAL_SKIPPED,
            codes::PKG_DEP_RANGE_INVALID,
            codes::PKG_INSTALLED_UNREADABLE,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
