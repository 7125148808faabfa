/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for retention jobs

use thiserror::Error;

/// Result type for retention operations
pub type Result<T> = std::result::Result<T, RetentionError>;

/// Errors that can occur while resolving or disposing partitions
#[derive(Error, Debug)]
pub enum RetentionError {
    /// A policy is malformed or lacks a field its strategy needs
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The database rejected a statement
    #[error("Statement execution failed: {reason} (statement: {statement})")]
    StatementExecution { statement: String, reason: String },

    /// Policies or partition metadata could not be read
    #[error("Resolution error: {0}")]
    Resolution(String),
}

impl RetentionError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        RetentionError::Configuration(reason.into())
    }

    pub fn resolution(reason: impl Into<String>) -> Self {
        RetentionError::Resolution(reason.into())
    }

    pub fn statement(statement: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RetentionError::StatementExecution {
            statement: statement.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the error aborts the whole job rather than a single partition
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RetentionError::StatementExecution { .. })
    }

    /// Get error category for logs and summaries
    pub fn category(&self) -> &'static str {
        match self {
            RetentionError::Configuration(_) => "configuration",
            RetentionError::StatementExecution { .. } => "statement_execution",
            RetentionError::Resolution(_) => "resolution",
        }
    }
}
