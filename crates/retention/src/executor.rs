/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Statement execution abstraction

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;

/// Runs disposal statements against the database.
///
/// Blocking semantics such as waiting for a snapshot to complete are part of
/// the statement text and handled by the database.
#[async_trait]
pub trait StatementExecutor: Send + Sync + std::fmt::Debug {
    /// Execute one statement, failing with a statement execution error when
    /// the database rejects it
    async fn execute(&self, statement: &str) -> Result<()>;
}

/// Executor that only logs and records statements
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    statements: RwLock<Vec<String>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements seen so far, in execution order
    pub async fn statements(&self) -> Vec<String> {
        self.statements.read().await.clone()
    }
}

#[async_trait]
impl StatementExecutor for DryRunExecutor {
    async fn execute(&self, statement: &str) -> Result<()> {
        info!(statement, "Dry run, not executing");
        self.statements.write().await.push(statement.to_string());
        Ok(())
    }
}
