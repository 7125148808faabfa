/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Policy store backed by a table in the database

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_postgres::{Object, Pool};
use retention::{
    PartitionValue, PolicyStore, PolicyTableConfig, PolicyTemplate, Result, RetentionError, RetentionStrategy,
};
use serde_json::json;
use tokio_postgres::Row;
use tracing::{debug, info};

use crate::{into_resolution_error, sql};

/// Reads policies from the policy table and partition metadata from
/// `information_schema.table_partitions`
#[derive(Debug, Clone)]
pub struct PostgresPolicyStore {
    pool: Pool,
    table: PolicyTableConfig,
}

impl PostgresPolicyStore {
    pub fn new(pool: Pool, table: PolicyTableConfig) -> Self {
        Self { pool, table }
    }

    pub fn table(&self) -> &PolicyTableConfig {
        &self.table
    }

    /// Create the policy table when it does not exist yet
    pub async fn setup_schema(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(&sql::create_schema(&self.table))
            .await
            .map_err(into_resolution_error)?;

        info!("Created retention policy table {}", self.table);
        Ok(())
    }

    async fn client(&self) -> Result<Object> {
        self.pool.get().await.map_err(into_resolution_error)
    }

    async fn query_policies(&self, strategy: Option<RetentionStrategy>) -> Result<Vec<PolicyTemplate>> {
        let client = self.client().await?;
        let rows = match strategy {
            Some(strategy) => {
                client
                    .query(&sql::select_policies(&self.table, true), &[&strategy.as_str()])
                    .await
            }
            None => client.query(&sql::select_policies(&self.table, false), &[]).await,
        }
        .map_err(into_resolution_error)?;

        rows.iter().map(policy_from_row).collect()
    }
}

fn policy_from_row(row: &Row) -> Result<PolicyTemplate> {
    let mapping = json!({
        "id": row.try_get::<_, Option<String>>("id").map_err(into_resolution_error)?,
        "strategy": row.try_get::<_, String>("strategy").map_err(into_resolution_error)?,
        "tags": row.try_get::<_, Option<Vec<String>>>("tags").map_err(into_resolution_error)?,
        "table_schema": row.try_get::<_, Option<String>>("table_schema").map_err(into_resolution_error)?,
        "table_name": row.try_get::<_, String>("table_name").map_err(into_resolution_error)?,
        "partition_column": row.try_get::<_, String>("partition_column").map_err(into_resolution_error)?,
        "retention_period": row.try_get::<_, i32>("retention_period").map_err(into_resolution_error)?,
        "reallocation_attribute_name": row
            .try_get::<_, Option<String>>("reallocation_attribute_name")
            .map_err(into_resolution_error)?,
        "reallocation_attribute_value": row
            .try_get::<_, Option<String>>("reallocation_attribute_value")
            .map_err(into_resolution_error)?,
        "target_repository_name": row
            .try_get::<_, Option<String>>("target_repository_name")
            .map_err(into_resolution_error)?,
    });

    PolicyTemplate::from_row(mapping)
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    async fn list_policies(&self, strategy: RetentionStrategy, tags: &BTreeSet<String>) -> Result<Vec<PolicyTemplate>> {
        let mut policies = self.query_policies(Some(strategy)).await?;
        policies.retain(|policy| policy.matches_tags(tags));
        Ok(policies)
    }

    async fn list_expired_partitions(&self, policy: &PolicyTemplate, cutoff: NaiveDate) -> Result<Vec<PartitionValue>> {
        let client = self.client().await?;
        let rows = client
            .query(sql::SELECT_PARTITIONS, &[&policy.table_schema, &policy.table_name])
            .await
            .map_err(into_resolution_error)?;

        let partitions = rows
            .iter()
            .map(|row| row.try_get::<_, serde_json::Value>(0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(into_resolution_error)?;

        debug!(
            table = %policy.table_fullname(),
            partitions = partitions.len(),
            "Read partition metadata"
        );
        sql::expired_values(policy, cutoff, partitions)
    }

    async fn create_policy(&self, mut policy: PolicyTemplate) -> Result<String> {
        let id = policy
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let tags: Vec<String> = policy.tags.iter().cloned().collect();
        let retention_period = i32::try_from(policy.retention_period).map_err(|_| {
            RetentionError::configuration(format!("retention period {} is too large", policy.retention_period))
        })?;

        let client = self.client().await?;
        client
            .execute(
                &sql::insert_policy(&self.table),
                &[
                    &id,
                    &policy.strategy.as_str(),
                    &tags,
                    &policy.table_schema,
                    &policy.table_name,
                    &policy.partition_column,
                    &retention_period,
                    &policy.reallocation_attribute_name,
                    &policy.reallocation_attribute_value,
                    &policy.target_repository_name,
                ],
            )
            .await
            .map_err(into_resolution_error)?;
        client
            .batch_execute(&sql::refresh(&self.table))
            .await
            .map_err(into_resolution_error)?;

        info!("Created retention policy {}: {}", id, policy);
        Ok(id)
    }

    async fn delete_policy(&self, id: &str) -> Result<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute(&sql::delete_policy(&self.table), &[&id])
            .await
            .map_err(into_resolution_error)?;
        client
            .batch_execute(&sql::refresh(&self.table))
            .await
            .map_err(into_resolution_error)?;

        if deleted > 0 {
            info!("Deleted retention policy {}", id);
        }
        Ok(deleted > 0)
    }

    async fn list_all(&self) -> Result<Vec<PolicyTemplate>> {
        self.query_policies(None).await
    }
}
