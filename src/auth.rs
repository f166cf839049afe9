//! Heuristic detection of authentication failures.
//!
//! The agent reports missing credentials as ordinary command errors. Their
//! message text is matched against a small pattern set so callers can offer
//! interactive setup instead of a generic failure.

use std::sync::OnceLock;

use regex::RegexSet;

use crate::AppError;

const AUTH_PATTERNS: &[&str] = &[
    r"(?i)api[ _-]?key",
    r"(?i)\bcredential",
    r"(?i)\bunauthori[sz]ed\b",
    r"(?i)\bauthenticat",
    r"(?i)\bpermission denied\b",
    r"(?i)\bnot logged in\b",
    r"(?i)\blog ?in required\b",
    r"(?i)\b401\b",
    r"(?i)\b403\b",
];

fn patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(AUTH_PATTERNS).unwrap_or_else(|_| RegexSet::empty()))
}

/// Whether `message` looks like a credential or permission failure.
#[must_use]
pub fn looks_like_auth_failure(message: &str) -> bool {
    patterns().is_match(message)
}

/// Remap a command error into [`AppError::AuthRequired`] when its text
/// matches an authentication pattern. Every other error passes through.
#[must_use]
pub fn classify(err: AppError) -> AppError {
    match err {
        AppError::Command { message, .. } if looks_like_auth_failure(&message) => {
            AppError::AuthRequired(message)
        }
        other => other,
    }
}
