//! Error handling for the job synchronization engine.
//!
//! This module provides:
//! - A single crate error type with machine-readable codes and context chaining
//! - Severity classification that drives log levels
//! - Retryability hints for the host that re-invokes the pulse
//! - Error metrics through the `metrics` facade
//!
//! Tenant- and operation-level failures are never surfaced through this type
//! from a cycle; they are turned into data (a batch error or a failed
//! operation result). `SyncError` escapes a cycle only for cancellation and
//! overlapping invocations, and escapes startup for configuration problems.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobsync_core::error::{ErrorCode, ErrorContext, Result, SyncError};
//!
//! fn load() -> Result<()> {
//!     read_seed_file()
//!         .with_error_code(ErrorCode::InvalidConfiguration)?;
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Reconciliation Errors (1000-1099)
    TenantFetchFailed,
    OperationFailed,
    InvalidScheduleExpression,
    HandlerUnresolved,
    CycleInProgress,
    Cancelled,

    // Collaborator Errors (2000-2099)
    RepositoryError,
    SchedulerError,
    RecordNotFound,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::TenantFetchFailed => 1000,
            Self::OperationFailed => 1001,
            Self::InvalidScheduleExpression => 1002,
            Self::HandlerUnresolved => 1003,
            Self::CycleInProgress => 1004,
            Self::Cancelled => 1005,

            Self::RepositoryError => 2000,
            Self::SchedulerError => 2001,
            Self::RecordNotFound => 2002,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::UnknownError => 9099,
        }
    }

    /// Check if this error is retryable on the next invocation.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TenantFetchFailed
                | Self::OperationFailed
                | Self::RepositoryError
                | Self::SchedulerError
                | Self::CycleInProgress
                | Self::Cancelled
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "reconciliation",
            2000..=2099 => "collaborator",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected conditions (bad expressions, overlapping invocations)
    Low,
    /// Recoverable operational issues
    Medium,
    /// Collaborator failures
    High,
    /// Startup or internal failures
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidScheduleExpression
            | ErrorCode::CycleInProgress
            | ErrorCode::Cancelled
            | ErrorCode::RecordNotFound => Self::Low,

            ErrorCode::TenantFetchFailed
            | ErrorCode::OperationFailed
            | ErrorCode::HandlerUnresolved => Self::Medium,

            ErrorCode::RepositoryError
            | ErrorCode::SchedulerError
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError => Self::High,

            ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration
            | ErrorCode::InternalError
            | ErrorCode::UnknownError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the synchronization engine.
#[derive(Error, Debug)]
pub struct SyncError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Short description, safe to persist in job status fields
    message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl SyncError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            message: message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both a message and an internal message.
    pub fn with_internal(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a repository (job store) error.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RepositoryError, message.into())
    }

    /// Create a scheduler error.
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchedulerError, message.into())
    }

    /// Create an error for a tenant whose desired or live state could not be read.
    pub fn tenant_fetch(tenant: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TenantFetchFailed,
            format!("Failed to read state for tenant {}: {}", tenant, message.into()),
        )
    }

    /// Create an error for an operation that was not applied.
    ///
    /// Keeps the cause's message, which ends up in the job status.
    pub fn operation_failed(kind: impl fmt::Display, target: impl fmt::Display, cause: SyncError) -> Self {
        Self::with_internal(
            ErrorCode::OperationFailed,
            cause.message().to_string(),
            format!("{} {}", kind, target),
        )
        .with_source(cause)
    }

    /// Create an error for an unresolvable job handler.
    pub fn handler_unresolved(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::HandlerUnresolved, message)
    }

    /// Create an invalid schedule expression error.
    pub fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InvalidScheduleExpression,
            format!("Invalid schedule expression: {}", expression),
            reason,
        )
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Synchronization cycle was cancelled")
    }

    /// Create an error for an invocation that overlaps a running cycle.
    pub fn cycle_in_progress() -> Self {
        Self::new(
            ErrorCode::CycleInProgress,
            "A synchronization cycle is already running",
        )
    }

    /// Create a missing configuration error.
    pub fn missing_configuration(what: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::MissingConfiguration,
            format!("Missing configuration: {}", what.into()),
        )
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the short message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Check if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    message = %self.message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "jobsync_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| SyncError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| SyncError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| SyncError::new(ErrorCode::RecordNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| SyncError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, message) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::RecordNotFound, "File or resource not found"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<cron::error::Error> for SyncError {
    fn from(error: cron::error::Error) -> Self {
        Self::with_internal(
            ErrorCode::InvalidScheduleExpression,
            "Invalid schedule expression",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<tokio::sync::AcquireError> for SyncError {
    fn from(error: tokio::sync::AcquireError) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "Resource acquisition failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<SyncError>() {
            Ok(sync_error) => sync_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(error: config::ConfigError) -> Self {
        let (code, message) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, message, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::TenantFetchFailed.is_retryable());
        assert!(ErrorCode::SchedulerError.is_retryable());
        assert!(!ErrorCode::InvalidScheduleExpression.is_retryable());
        assert!(!ErrorCode::MissingConfiguration.is_retryable());
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::OperationFailed.category(), "reconciliation");
        assert_eq!(ErrorCode::RepositoryError.category(), "collaborator");
        assert_eq!(ErrorCode::InvalidConfiguration.category(), "configuration");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::Cancelled),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::OperationFailed),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::SchedulerError),
            ErrorSeverity::High
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::MissingConfiguration),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_error_display() {
        let error = SyncError::with_internal(
            ErrorCode::SchedulerError,
            "Scheduler store unavailable",
            "connection refused",
        );

        let display = format!("{}", error);
        assert!(display.contains("SchedulerError"));
        assert!(display.contains("Scheduler store unavailable"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_tenant_fetch_message() {
        let error = SyncError::tenant_fetch(7, "timeout");
        assert_eq!(error.code(), ErrorCode::TenantFetchFailed);
        assert_eq!(error.message(), "Failed to read state for tenant 7: timeout");
    }

    #[test]
    fn test_operation_failed_keeps_cause_message() {
        let cause = SyncError::scheduler("trigger store locked");
        let error = SyncError::operation_failed("reschedule", "Nightly", cause);

        assert_eq!(error.code(), ErrorCode::OperationFailed);
        assert_eq!(error.message(), "trigger store locked");
        assert_eq!(error.internal_message(), Some("reschedule Nightly"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_cancelled() {
        let error = SyncError::cancelled();
        assert!(error.is_cancelled());
        assert!(error.is_retryable());
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let error = missing.context("job not found").unwrap_err();
        assert_eq!(error.code(), ErrorCode::RecordNotFound);
    }

    #[test]
    fn test_from_cron_error() {
        let parsed = "not a cron".parse::<cron::Schedule>();
        let error: SyncError = parsed.unwrap_err().into();
        assert_eq!(error.code(), ErrorCode::InvalidScheduleExpression);
    }
}
