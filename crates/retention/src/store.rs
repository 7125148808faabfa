/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Policy store abstraction and an in-memory implementation

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    error::{Result, RetentionError},
    model::{PartitionValue, PolicyTemplate, RetentionStrategy},
};

/// Source of retention policies and partition metadata
#[async_trait]
pub trait PolicyStore: Send + Sync + std::fmt::Debug {
    /// List policies of a strategy carrying every tag of the filter
    async fn list_policies(&self, strategy: RetentionStrategy, tags: &BTreeSet<String>) -> Result<Vec<PolicyTemplate>>;

    /// List partition values of the policy's table that expired at the cutoff day,
    /// in ascending order
    async fn list_expired_partitions(&self, policy: &PolicyTemplate, cutoff: NaiveDate) -> Result<Vec<PartitionValue>>;

    /// Store a policy and return its identifier
    async fn create_policy(&self, policy: PolicyTemplate) -> Result<String>;

    /// Delete a policy by identifier
    async fn delete_policy(&self, id: &str) -> Result<bool>;

    /// List every stored policy
    async fn list_all(&self) -> Result<Vec<PolicyTemplate>>;
}

/// Policy store keeping policies and partition metadata in memory
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    policies: RwLock<Vec<PolicyTemplate>>,
    partitions: RwLock<HashMap<(String, String), BTreeSet<PartitionValue>>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partition of a table
    pub async fn add_partition(&self, table_fullname: &str, partition_column: &str, value: PartitionValue) {
        self.partitions
            .write()
            .await
            .entry((table_fullname.to_string(), partition_column.to_string()))
            .or_default()
            .insert(value);
    }

    /// Forget a partition, returning whether it was known
    pub async fn remove_partition(&self, table_fullname: &str, partition_column: &str, value: PartitionValue) -> bool {
        self.partitions
            .write()
            .await
            .get_mut(&(table_fullname.to_string(), partition_column.to_string()))
            .is_some_and(|values| values.remove(&value))
    }

    fn sort(policies: &mut [PolicyTemplate]) {
        policies.sort_by(|a, b| {
            (a.table_fullname(), &a.partition_column, &a.id).cmp(&(b.table_fullname(), &b.partition_column, &b.id))
        });
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn list_policies(&self, strategy: RetentionStrategy, tags: &BTreeSet<String>) -> Result<Vec<PolicyTemplate>> {
        let mut policies: Vec<PolicyTemplate> = self
            .policies
            .read()
            .await
            .iter()
            .filter(|policy| policy.strategy == strategy && policy.matches_tags(tags))
            .cloned()
            .collect();
        Self::sort(&mut policies);
        Ok(policies)
    }

    async fn list_expired_partitions(&self, policy: &PolicyTemplate, cutoff: NaiveDate) -> Result<Vec<PartitionValue>> {
        let retained_since = policy.retained_since(cutoff);
        let partitions = self.partitions.read().await;
        let expired: Vec<PartitionValue> = partitions
            .get(&(policy.table_fullname(), policy.partition_column.clone()))
            .map(|values| {
                values
                    .iter()
                    .filter(|value| value.is_older_than(retained_since))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            table = %policy.table_fullname(),
            %retained_since,
            expired = expired.len(),
            "Listed expired partitions"
        );
        Ok(expired)
    }

    async fn create_policy(&self, mut policy: PolicyTemplate) -> Result<String> {
        let mut policies = self.policies.write().await;
        let id = policy
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();

        if policies.iter().any(|existing| existing.id.as_deref() == Some(id.as_str())) {
            return Err(RetentionError::configuration(format!("policy {id} already exists")));
        }

        info!("Created retention policy {}: {}", id, policy);
        policies.push(policy);
        Ok(id)
    }

    async fn delete_policy(&self, id: &str) -> Result<bool> {
        let mut policies = self.policies.write().await;
        let initial_len = policies.len();

        policies.retain(|policy| policy.id.as_deref() != Some(id));

        let removed = policies.len() < initial_len;
        if removed {
            info!("Deleted retention policy {}", id);
        }
        Ok(removed)
    }

    async fn list_all(&self) -> Result<Vec<PolicyTemplate>> {
        let mut policies = self.policies.read().await.clone();
        Self::sort(&mut policies);
        Ok(policies)
    }
}
