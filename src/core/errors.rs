//! DTK-prefixed error types with structured error codes.
//!
//! Grounded on the error taxonomy of spec.md §7: each variant maps to one
//! of `InvalidInput`, `PackNotFound`, `ProtectedFile`, `SymlinkConflict`,
//! `FilesystemConflict`, `IO`, or `UserCancelled`.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, DotkError>;

/// Top-level error type for dotkeeper.
#[derive(Debug, Error)]
pub enum DotkError {
    #[error("[DTK-1001] invalid input: {details}")]
    InvalidInput { details: String },

    #[error("[DTK-1002] pack(s) not found: {requested:?} (available: {available:?})")]
    PackNotFound {
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("[DTK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DTK-1004] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DTK-2001] refusing to link protected path: {path} ({reason})")]
    ProtectedFile { path: PathBuf, reason: String },

    #[error("[DTK-2002] symlink conflict: {target} is claimed by both {first} and {second}")]
    SymlinkConflict {
        target: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("[DTK-2003] existing content at {path} conflicts with managed state: {details}")]
    FilesystemConflict { path: PathBuf, details: String },

    #[error("[DTK-2004] sentinel already recorded for {pack}/{handler}/{sentinel}")]
    SentinelExists {
        pack: String,
        handler: String,
        sentinel: String,
    },

    #[error("[DTK-2005] command failed with status {status:?}: {command}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
    },

    #[error("[DTK-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[DTK-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DTK-3003] user cancelled: {details}")]
    UserCancelled { details: String },

    #[error("[DTK-3004] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },
}

impl DotkError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "DTK-1001",
            Self::PackNotFound { .. } => "DTK-1002",
            Self::ConfigParse { .. } => "DTK-1003",
            Self::MissingConfig { .. } => "DTK-1004",
            Self::ProtectedFile { .. } => "DTK-2001",
            Self::SymlinkConflict { .. } => "DTK-2002",
            Self::FilesystemConflict { .. } => "DTK-2003",
            Self::SentinelExists { .. } => "DTK-2004",
            Self::CommandFailed { .. } => "DTK-2005",
            Self::PermissionDenied { .. } => "DTK-3001",
            Self::Io { .. } => "DTK-3002",
            Self::UserCancelled { .. } => "DTK-3003",
            Self::Serialization { .. } => "DTK-3004",
        }
    }

    /// Whether this failure should abort the current batch (validation /
    /// conflict errors do), as opposed to being reported as a per-file skip.
    #[must_use]
    pub const fn is_fatal_to_batch(&self) -> bool {
        !matches!(self, Self::SentinelExists { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DotkError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DotkError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for DotkError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
