/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Snapshot expired partitions into a repository, then delete them

use crate::{
    action::RetentionAction,
    error::{Result, RetentionError},
    model::{ResolvedInstance, RetentionStrategy},
};

use super::{delete_partition, partition_clause};

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotAction;

impl SnapshotAction {
    /// Fully qualified snapshot name, unique per repository, table and partition
    pub fn snapshot_name(repository: &str, instance: &ResolvedInstance) -> String {
        format!(
            "\"{}\".\"{}-{}\"",
            repository,
            instance.table_fullname(),
            instance.partition_value()
        )
    }
}

impl RetentionAction for SnapshotAction {
    fn strategy(&self) -> RetentionStrategy {
        RetentionStrategy::Snapshot
    }

    fn render_statements(&self, instance: &ResolvedInstance) -> Result<Vec<String>> {
        let repository = instance
            .policy()
            .target_repository_name
            .as_deref()
            .ok_or_else(|| {
                RetentionError::configuration(format!(
                    "snapshot policy on {} has no target repository",
                    instance.table_fullname()
                ))
            })?;

        // The snapshot has to complete before the partition is deleted
        let create = format!(
            "CREATE SNAPSHOT {} TABLE {} {} WITH (\"wait_for_completion\" = true);",
            Self::snapshot_name(repository, instance),
            instance.table_fullname(),
            partition_clause(instance)
        );

        Ok(vec![create, delete_partition(instance)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PartitionValue, PolicyTemplate};
    use chrono::NaiveDate;

    fn instance(value: PartitionValue) -> ResolvedInstance {
        ResolvedInstance::resolve(
            PolicyTemplate::new(RetentionStrategy::Snapshot, "doc", "sensor_data", "ts", 365)
                .with_target_repository("export_cold"),
            value,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_then_delete() {
        let value = PartitionValue::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let statements = SnapshotAction.render_statements(&instance(value)).unwrap();

        assert_eq!(
            statements,
            vec![
                "CREATE SNAPSHOT \"export_cold\".\"doc.sensor_data-2021-01-01\" TABLE doc.sensor_data PARTITION (ts = 2021-01-01) WITH (\"wait_for_completion\" = true);".to_string(),
                "DELETE FROM doc.sensor_data WHERE ts = 2021-01-01;".to_string(),
            ]
        );
    }

    #[test]
    fn test_snapshot_statement_shape() {
        for value in [
            PartitionValue::Integer(1609459200000),
            PartitionValue::Integer(0),
            PartitionValue::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
        ] {
            let instance = instance(value);
            let statements = SnapshotAction.render_statements(&instance).unwrap();
            let snapshot_name = format!("\"export_cold\".\"doc.sensor_data-{value}\"");

            assert_eq!(statements.len(), 2);
            assert!(statements[0].starts_with(&format!("CREATE SNAPSHOT {snapshot_name} ")));
            assert!(statements[1].starts_with("DELETE FROM "));
        }
    }

    #[test]
    fn test_snapshot_requires_repository() {
        let instance = ResolvedInstance::resolve(
            PolicyTemplate::new(RetentionStrategy::Snapshot, "doc", "sensor_data", "ts", 365),
            PartitionValue::Integer(1),
        )
        .unwrap();

        assert!(matches!(
            SnapshotAction.render_statements(&instance),
            Err(RetentionError::Configuration(_))
        ));
    }
}
