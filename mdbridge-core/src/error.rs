// ABOUTME: Error taxonomy surfaced to the host: session severities and per-send failures.
// ABOUTME: Send failures map to the numeric exit codes the host plugin expects.

use mdbridge_engine::JidError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Severity of an error reported through the host's error callback
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Session stays alive; the engine is expected to recover
    Transient,
    /// Session is torn down; the user must re-authenticate
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Exit code for a successful send
pub const EXIT_OK: i32 = 0;

/// Failure of a single outbound send; never affects session state
#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] JidError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload failed: {0:#}")]
    UploadFailed(anyhow::Error),

    #[error("send failed: {0:#}")]
    SendFailed(anyhow::Error),
}

impl SendError {
    /// errno-style code returned to the host
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidAddress(_) => 14, // EFAULT
            Self::Io { .. } => 5,          // EIO
            Self::UploadFailed(_) => 32,   // EPIPE
            Self::SendFailed(_) => 70,     // ECOMM
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_address",
            Self::Io { .. } => "io_error",
            Self::UploadFailed(_) => "upload_failed",
            Self::SendFailed(_) => "send_failed",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("account {0} already has an active session")]
    AlreadyConnected(String),

    #[error("no active session for account {0}")]
    UnknownAccount(String),
}
