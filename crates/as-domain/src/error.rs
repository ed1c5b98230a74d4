/// Shared error type used across the runtime engine crates.
///
/// Variants map 1:1 onto the error *kind* taxonomy: HTTP-boundary kinds
/// (`InvalidInput`, `Unauthorized`, `RateLimited`, `NotFound`) are
/// surfaced as status codes by `as-server`; tool-boundary kinds
/// (`ToolError`, `SsrfBlocked`, `NoAllowlist`, `BinaryNotAllowed`,
/// `BinaryNotFound`) are never raised as HTTP errors — they become a
/// `ToolResult { is_error: true }` so the LLM can react; state-plane
/// kinds (`StateLocked`, `StateCorrupted`) only ever reach the CLI
/// surface, never HTTP.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tool error: {0}")]
    ToolError(String),

    #[error("SSRF blocked: {0}")]
    SsrfBlocked(String),

    #[error("no binary allowlist configured")]
    NoAllowlist,

    #[error("binary not allowed: {0}")]
    BinaryNotAllowed(String),

    #[error("binary not found: {0}")]
    BinaryNotFound(String),

    #[error("budget exhausted: used {used}, limit {limit}")]
    BudgetExhausted { used: u64, limit: u64 },

    #[error("state locked: {0}")]
    StateLocked(String),

    #[error("state corrupted: {0}")]
    StateCorrupted(String),

    #[error("secret unresolved: {0}")]
    SecretUnresolved(String),

    #[error("secret format unsupported: {0}")]
    SecretFormatUnsupported(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// The taxonomy "kind" tag, used for structured logging
    /// and metrics labels without matching on the full enum elsewhere.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "internal",
            Error::Json(_) => "invalid_input",
            Error::Http(_) => "internal",
            Error::Timeout(_) => "timeout",
            Error::Provider { .. } => "tool_error",
            Error::Config(_) => "internal",
            Error::InvalidInput(_) => "invalid_input",
            Error::Unauthorized(_) => "unauthorized",
            Error::RateLimited { .. } => "rate_limited",
            Error::NotFound(_) => "not_found",
            Error::ToolError(_) => "tool_error",
            Error::SsrfBlocked(_) => "ssrf_blocked",
            Error::NoAllowlist => "no_allowlist",
            Error::BinaryNotAllowed(_) => "binary_not_allowed",
            Error::BinaryNotFound(_) => "binary_not_found",
            Error::BudgetExhausted { .. } => "budget_exhausted",
            Error::StateLocked(_) => "state_locked",
            Error::StateCorrupted(_) => "state_corrupted",
            Error::SecretUnresolved(_) => "secret_unresolved",
            Error::SecretFormatUnsupported(_) => "secret_format_unsupported",
            Error::Auth(_) => "unauthorized",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether this error kind belongs to the tool boundary, i.e. should
    /// be reported back to the LLM as a `ToolResult` rather than
    /// propagated as an HTTP/CLI failure.
    pub fn is_tool_boundary(&self) -> bool {
        matches!(
            self,
            Error::ToolError(_)
                | Error::SsrfBlocked(_)
                | Error::NoAllowlist
                | Error::BinaryNotAllowed(_)
                | Error::BinaryNotFound(_)
                | Error::Provider { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_taxonomy() {
        assert_eq!(Error::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(Error::Unauthorized("x".into()).kind(), "unauthorized");
        assert_eq!(
            Error::RateLimited { retry_after_secs: 5 }.kind(),
            "rate_limited"
        );
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::SsrfBlocked("x".into()).kind(), "ssrf_blocked");
        assert_eq!(Error::NoAllowlist.kind(), "no_allowlist");
        assert_eq!(
            Error::BudgetExhausted { used: 1, limit: 1 }.kind(),
            "budget_exhausted"
        );
        assert_eq!(Error::StateLocked("x".into()).kind(), "state_locked");
    }

    #[test]
    fn tool_boundary_errors_are_flagged() {
        assert!(Error::SsrfBlocked("x".into()).is_tool_boundary());
        assert!(Error::NoAllowlist.is_tool_boundary());
        assert!(Error::BinaryNotAllowed("x".into()).is_tool_boundary());
        assert!(!Error::Unauthorized("x".into()).is_tool_boundary());
        assert!(!Error::StateLocked("x".into()).is_tool_boundary());
    }
}
