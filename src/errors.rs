//! Error types for the SIP ALG checker and network monitor.
//!
//! Only configuration problems and fatal setup failures are represented
//! here. Probe failures during monitoring are expected outcomes and are
//! modelled separately by [`crate::probe::ProbeFailure`].

use std::error::Error;
use std::fmt;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Network setup error (no route, socket could not be opened).
    pub const NETWORK_ERROR: i32 = 1;
    /// Insufficient privileges for the requested probe strategy.
    pub const PERMISSION_ERROR: i32 = 2;
    /// Configuration error (invalid arguments).
    pub const CONFIG_ERROR: i32 = 3;
    /// Failed to write a report or talk to the terminal.
    pub const IO_ERROR: i32 = 4;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of errors that can stop a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or arguments.
    Config,
    /// Network setup issues.
    Network,
    /// DNS resolver could not be set up.
    Dns,
    /// Missing privileges (raw sockets, low ports).
    Permission,
    /// File or terminal I/O.
    Io,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::Network | ErrorKind::Dns => exit_codes::NETWORK_ERROR,
            ErrorKind::Permission => exit_codes::PERMISSION_ERROR,
            ErrorKind::Io => exit_codes::IO_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Config => "Configuration error",
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolver error",
            ErrorKind::Permission => "Permission error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// A user-facing error raised while setting up or reporting a check.
#[derive(Debug)]
pub struct CheckError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl CheckError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Create a configuration error. These are raised at construction time
    /// and are never recovered internally.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
            .with_suggestion("Check that this machine has a working network route.")
    }

    pub fn dns(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dns, message).with_suggestion(
            "Check /etc/resolv.conf or pass the target as an IP address.",
        )
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message).with_suggestion(
            "Use --strategy tcp, or allow unprivileged ICMP with: \
             sudo sysctl -w net.ipv4.ping_group_range='0 2147483647'",
        )
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for CheckError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Classify an error into an ErrorKind based on its message.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("permission denied")
        || error_str.contains("operation not permitted")
    {
        return ErrorKind::Permission;
    }

    if error_str.contains("dns")
        || error_str.contains("resolv")
        || error_str.contains("no such host")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("connection refused")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("address not available")
    {
        return ErrorKind::Network;
    }

    if error_str.contains("no such file")
        || error_str.contains("is a directory")
        || error_str.contains("read-only file system")
    {
        return ErrorKind::Io;
    }

    ErrorKind::Unknown
}

/// Wrap an arbitrary error into a CheckError, classifying it by message.
pub fn to_check_error(
    error: Box<dyn Error + Send + Sync>,
    context: &str,
) -> CheckError {
    let kind = classify_error(error.as_ref());
    let message = format!("{}: {}", context, error);

    let mut check_error = match kind {
        ErrorKind::Network => CheckError::network(message),
        ErrorKind::Dns => CheckError::dns(message),
        ErrorKind::Permission => CheckError::permission(message),
        _ => CheckError::new(kind, message),
    };
    check_error.source = Some(error);

    check_error
}

/// Format an error for user display.
pub fn format_error_for_display(error: &CheckError) -> String {
    let mut output = format!("Error: {}", error.message);

    if let Some(ref suggestion) = error.suggestion {
        output.push_str(&format!("\n\nSuggestion: {}", suggestion));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::Network.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Dns.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(
            ErrorKind::Permission.exit_code(),
            exit_codes::PERMISSION_ERROR
        );
        assert_eq!(ErrorKind::Io.exit_code(), exit_codes::IO_ERROR);
    }

    #[test]
    fn test_config_error_display() {
        let error = CheckError::config("sample size must be positive");

        let display = format!("{}", error);
        assert!(display.starts_with("Configuration error"));
        assert!(display.contains("sample size"));
        assert!(!display.contains("Suggestion"));
        assert_eq!(error.exit_code(), exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn test_permission_error_has_suggestion() {
        let error = CheckError::permission("cannot open ICMP socket");
        assert!(error.suggestion.as_deref().unwrap().contains("--strategy"));
    }

    #[test]
    fn test_classify_error_permission() {
        let error = std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "Permission denied (os error 13)",
        );
        assert_eq!(classify_error(&error), ErrorKind::Permission);
    }

    #[test]
    fn test_classify_error_network() {
        let error = std::io::Error::new(
            std::io::ErrorKind::Other,
            "Network unreachable (os error 101)",
        );
        assert_eq!(classify_error(&error), ErrorKind::Network);
    }

    #[test]
    fn test_classify_error_unknown() {
        let error =
            std::io::Error::new(std::io::ErrorKind::Other, "something odd");
        assert_eq!(classify_error(&error), ErrorKind::Unknown);
    }

    #[test]
    fn test_to_check_error_keeps_source() {
        let error: Box<dyn Error + Send + Sync> =
            Box::new(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            ));

        let check_error = to_check_error(error, "opening ICMP socket");

        assert_eq!(check_error.kind, ErrorKind::Permission);
        assert!(check_error.message.contains("opening ICMP socket"));
        assert!(check_error.suggestion.is_some());
        assert!(check_error.source().is_some());
    }

    #[test]
    fn test_format_error_for_display() {
        let error = CheckError::io("could not write report.json");
        let output = format_error_for_display(&error);
        assert_eq!(output, "Error: could not write report.json");
    }
}
