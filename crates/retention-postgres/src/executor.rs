/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Statement executor running disposal statements over a connection pool

use async_trait::async_trait;
use deadpool_postgres::Pool;
use retention::{Result, RetentionError, StatementExecutor};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: Pool,
}

impl PostgresExecutor {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatementExecutor for PostgresExecutor {
    async fn execute(&self, statement: &str) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|err| RetentionError::statement(statement, err))?;

        // Simple query protocol, the statement carries no parameters
        client
            .batch_execute(statement)
            .await
            .map_err(|err| RetentionError::statement(statement, err))?;

        debug!(statement, "Statement executed");
        Ok(())
    }
}
