//! Error types for the metrics pipeline.
//!
//! Every failure the store, sample builder, config loader or report writer can produce is an
//! [`Error`]. Downstream code branches on [`Error::code`] and [`Error::is_retryable`] rather than
//! on message text.

pub mod diagnostic;

pub use diagnostic::Diagnostic;

use serde::Serialize;
use std::fmt;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable validation codes (the part after `validation.`).
pub mod codes {
    pub const MISSING_FIELD: &str = "missing_field";
    pub const METRIC_TYPE_CONFLICT: &str = "metric_type_conflict";
    pub const VALUE_TYPE_MISMATCH: &str = "value_type_mismatch";
    pub const NON_FINITE_VALUE: &str = "non_finite_value";
    pub const DUPLICATE_VALUE: &str = "duplicate_value";
    pub const DUPLICATE_METRIC: &str = "duplicate_metric";
    pub const CONSTRAINT: &str = "constraint";
    pub const CONFIG_MISSING: &str = "config_missing";
    pub const CONFIG_PARSE: &str = "config_parse";
    pub const UNSUPPORTED_VERSION: &str = "unsupported_version";
    pub const INVALID_WINDOW: &str = "invalid_window";
    pub const INVALID_THRESHOLD: &str = "invalid_threshold";
    pub const INVALID_REGISTRY: &str = "invalid_registry";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
}

/// Classification of storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// Database could not be opened or reached.
    Connection,
    /// Database busy/locked past the busy timeout.
    Timeout,
    /// Remote transport failure.
    Network,
    /// Another run published the database first.
    Conflict,
    /// Credentials missing or rejected by the transport.
    Auth,
    /// Filesystem or database refuses access.
    Permission,
    /// Database file is not a valid or compatible trendgate database.
    Corrupted,
    /// Any other I/O or engine failure.
    Io,
}

impl StorageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorKind::Connection => "connection",
            StorageErrorKind::Timeout => "timeout",
            StorageErrorKind::Network => "network",
            StorageErrorKind::Conflict => "conflict",
            StorageErrorKind::Auth => "auth",
            StorageErrorKind::Permission => "permission",
            StorageErrorKind::Corrupted => "corrupted",
            StorageErrorKind::Io => "io",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageErrorKind::Connection
                | StorageErrorKind::Timeout
                | StorageErrorKind::Network
                | StorageErrorKind::Conflict
        )
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store or transport failure.
    #[error("storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
    },

    /// Malformed input, config or a violated data-model invariant.
    #[error("validation failed: {message}")]
    Validation {
        code: &'static str,
        message: String,
        field: Option<String>,
    },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    /// Upstream collector produced unusable input.
    #[error("collection failed for {source_name}: {message}")]
    Collection {
        source_name: String,
        message: String,
    },

    /// Report rendering or output failure.
    #[error("report error: {message}")]
    Report { message: String },
}

impl Error {
    pub fn storage(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self::Storage {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn invalid_field(
        code: &'static str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::invalid_field(
            codes::MISSING_FIELD,
            field,
            format!("required field `{}` is missing or blank", field),
        )
    }

    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            name: name.into(),
        }
    }

    pub fn collection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn report(message: impl Into<String>) -> Self {
        Self::Report {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, e.g. `storage.timeout` or `validation.duplicate_value`.
    pub fn code(&self) -> String {
        match self {
            Self::Storage { kind, .. } => format!("storage.{}", kind),
            Self::Validation { code, .. } => format!("validation.{}", code),
            Self::NotFound { entity, .. } => format!("not_found.{}", entity),
            Self::Collection { .. } => "collection.invalid_input".to_string(),
            Self::Report { .. } => "report.output".to_string(),
        }
    }

    /// Whether the caller may retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors caused by user input or configuration (as opposed to infrastructure).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NotFound { .. } | Self::Collection { .. }
        )
    }

    /// Structured context for machine consumers. Never contains secrets.
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Storage { kind, .. } => serde_json::json!({ "kind": kind }),
            Self::Validation { code, field, .. } => {
                serde_json::json!({ "code": code, "field": field })
            }
            Self::NotFound { entity, name } => serde_json::json!({ "entity": entity, "name": name }),
            Self::Collection { source_name, .. } => serde_json::json!({ "source": source_name }),
            Self::Report { .. } => serde_json::json!({}),
        }
    }

    /// Actionable guidance shown to the user alongside the message.
    pub fn fix_steps(&self) -> Vec<String> {
        match self {
            Self::Storage { kind, .. } => match kind {
                StorageErrorKind::Connection | StorageErrorKind::Timeout => vec![
                    "Retry the step; another process may hold the database lock".into(),
                ],
                StorageErrorKind::Network => {
                    vec!["Retry the step; the storage backend was unreachable".into()]
                }
                StorageErrorKind::Conflict => vec![
                    "Another run published the database first; rerun this job to record on top of it"
                        .into(),
                ],
                StorageErrorKind::Auth => vec![
                    "Check the storage credentials exposed to this job (e.g. AWS_* variables)"
                        .into(),
                ],
                StorageErrorKind::Permission => vec![
                    "Check that the database path (and its directory) is writable by this job"
                        .into(),
                ],
                StorageErrorKind::Corrupted => vec![
                    "The database is unreadable or was written by a newer trendgate".into(),
                    "Restore it from a previous artifact or point `database` at a fresh path"
                        .into(),
                ],
                StorageErrorKind::Io => vec!["Inspect the message above for the failing path".into()],
            },
            Self::Validation { field, .. } => match field {
                Some(field) => vec![format!("Fix `{}` and rerun", field)],
                None => vec!["Fix the reported input and rerun".into()],
            },
            Self::NotFound { entity, .. } => {
                vec![format!("Record at least one run containing this {} first", entity)]
            }
            Self::Collection { source_name, .. } => vec![format!(
                "Check the collector output for `{}`: numeric metrics need a number, label metrics a string",
                source_name
            )],
            Self::Report { .. } => {
                vec!["Check that the report output directory is writable".into()]
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let kind = match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageErrorKind::Timeout,
                ErrorCode::CannotOpen => StorageErrorKind::Connection,
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied => StorageErrorKind::Permission,
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    StorageErrorKind::Corrupted
                }
                ErrorCode::ConstraintViolation => {
                    return Error::validation(codes::CONSTRAINT, err.to_string());
                }
                _ => StorageErrorKind::Io,
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => StorageErrorKind::Corrupted,
            _ => StorageErrorKind::Io,
        };
        Error::storage(kind, err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::PermissionDenied => StorageErrorKind::Permission,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => StorageErrorKind::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => StorageErrorKind::Network,
            _ => StorageErrorKind::Io,
        };
        Error::storage(kind, err.to_string())
    }
}
