use std::fmt;

use crate::model::NagId;
use crate::replay::MalformedEvent;

/// Machine-readable error codes for scripts and `--json` consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AuthFailed,
    NotSignedIn,
    ConfigInvalid,
    CollectionNotFound,
    PermissionDenied,
    MalformedEvent,
    DecodeFailed,
    StaleResult,
    TransportFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AuthFailed => "E1001",
            Self::NotSignedIn => "E1002",
            Self::ConfigInvalid => "E1003",
            Self::CollectionNotFound => "E2001",
            Self::PermissionDenied => "E2002",
            Self::MalformedEvent => "E3001",
            Self::DecodeFailed => "E3002",
            Self::StaleResult => "E4001",
            Self::TransportFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::AuthFailed => "Authentication failed",
            Self::NotSignedIn => "Not signed in",
            Self::ConfigInvalid => "Configuration is incomplete or invalid",
            Self::CollectionNotFound => "Remote collection not found",
            Self::PermissionDenied => "Permission denied",
            Self::MalformedEvent => "Malformed event in history",
            Self::DecodeFailed => "Remote response could not be decoded",
            Self::StaleResult => "Result superseded by a newer request",
            Self::TransportFailed => "Network request failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::AuthFailed => Some("Check the email and password, then run `nag login` again."),
            Self::NotSignedIn => Some("Run `nag login --email <address>` first."),
            Self::ConfigInvalid => Some(
                "Set gateway.endpoint and gateway.api_key in ~/.config/nagme/config.toml \
                 or NAGME_ENDPOINT / NAGME_API_KEY.",
            ),
            Self::CollectionNotFound => {
                Some("Check the table names under [gateway.tables] in the config file.")
            }
            Self::PermissionDenied => Some(
                "Writes need gateway.mode = \"read-write\" (or NAGME_MODE=read-write) \
                 and a row-level policy that allows them.",
            ),
            Self::MalformedEvent => Some("The nag is hidden until a valid event supersedes it."),
            Self::DecodeFailed | Self::TransportFailed => {
                Some("Retry once. If persistent, check the endpoint and network.")
            }
            Self::StaleResult => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Domain failures surfaced by replay, the gateway and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum NagError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("nag '{nag_id}' has a malformed history: {source}")]
    MalformedEvent {
        nag_id: NagId,
        #[source]
        source: MalformedEvent,
    },

    #[error("stale result from request generation {generation} (latest is {latest})")]
    StaleResult { generation: u64, latest: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl NagError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(_) => ErrorCode::AuthFailed,
            Self::NotSignedIn => ErrorCode::NotSignedIn,
            Self::NotFound(_) => ErrorCode::CollectionNotFound,
            Self::Permission(_) => ErrorCode::PermissionDenied,
            Self::MalformedEvent { .. } => ErrorCode::MalformedEvent,
            Self::StaleResult { .. } => ErrorCode::StaleResult,
            Self::Transport(_) => ErrorCode::TransportFailed,
            Self::Decode(_) => ErrorCode::DecodeFailed,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Stale results are dropped silently; everything else reaches the user.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResult { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, NagError};
    use std::collections::HashSet;

    const ALL: [ErrorCode; 10] = [
        ErrorCode::AuthFailed,
        ErrorCode::NotSignedIn,
        ErrorCode::ConfigInvalid,
        ErrorCode::CollectionNotFound,
        ErrorCode::PermissionDenied,
        ErrorCode::MalformedEvent,
        ErrorCode::DecodeFailed,
        ErrorCode::StaleResult,
        ErrorCode::TransportFailed,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let text = code.code();
            assert_eq!(text.len(), 5);
            assert!(text.starts_with('E'));
            assert!(text.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn stale_results_are_not_user_visible() {
        let stale = NagError::StaleResult {
            generation: 1,
            latest: 2,
        };
        assert!(!stale.is_user_visible());
        assert_eq!(stale.code(), ErrorCode::StaleResult);
        assert!(NagError::Transport("reset".into()).is_user_visible());
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(NagError::NotFound("nag_state".into()).is_not_found());
        assert!(!NagError::Permission("nag_state".into()).is_not_found());
    }
}
