// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use rowjournal_kernel::error::{DecodeError, KernelError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// Duplicate sequence number. Retrying the same write cannot succeed.
    #[error("Conflict: {persistence_id} already has sequence_nr in {from}..={to}")]
    Conflict {
        persistence_id: String,
        from: i64,
        to: i64,
    },

    /// Connection drop, timeout, busy database. The caller may retry.
    #[error("Transient failure during {context}: {message}")]
    Transient { context: String, message: String },

    #[error("Decode failed for {persistence_id} sequence_nr {sequence_nr}: {source}")]
    Decode {
        persistence_id: String,
        sequence_nr: i64,
        #[source]
        source: DecodeError,
    },

    #[error("Storage error during {context}: {message}")]
    Storage { context: String, message: String },

    #[error("Invalid write: {0}")]
    InvalidWrite(#[from] KernelError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl JournalError {
    pub fn transient(context: impl Into<String>, message: impl ToString) -> Self {
        JournalError::Transient {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(context: impl Into<String>, message: impl ToString) -> Self {
        JournalError::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JournalError::Transient { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, JournalError::Conflict { .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JournalError::Conflict { .. } => "conflict",
            JournalError::Transient { .. } => "transient",
            JournalError::Decode { .. } => "decode",
            JournalError::Storage { .. } => "storage",
            JournalError::InvalidWrite(_) => "invalid_write",
            JournalError::InvalidRequest(_) => "invalid_request",
            JournalError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
