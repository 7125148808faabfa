/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Statements reading and maintaining the policy table

use chrono::NaiveDate;
use retention::{PartitionValue, PolicyTableConfig, PolicyTemplate, Result};

pub(crate) const POLICY_COLUMNS: &str = "\"id\", \"strategy\", \"tags\", \"table_schema\", \"table_name\", \
     \"partition_column\", \"retention_period\", \"reallocation_attribute_name\", \
     \"reallocation_attribute_value\", \"target_repository_name\"";

pub(crate) fn create_schema(table: &PolicyTableConfig) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         \"id\" TEXT NOT NULL PRIMARY KEY, \
         \"strategy\" TEXT NOT NULL, \
         \"tags\" ARRAY(TEXT), \
         \"table_schema\" TEXT, \
         \"table_name\" TEXT NOT NULL, \
         \"partition_column\" TEXT NOT NULL, \
         \"retention_period\" INTEGER NOT NULL, \
         \"reallocation_attribute_name\" TEXT, \
         \"reallocation_attribute_value\" TEXT, \
         \"target_repository_name\" TEXT)",
        table.fullname()
    )
}

pub(crate) fn select_policies(table: &PolicyTableConfig, by_strategy: bool) -> String {
    format!(
        "SELECT {} FROM {}{} ORDER BY \"table_schema\", \"table_name\", \"partition_column\", \"id\"",
        POLICY_COLUMNS,
        table.fullname(),
        if by_strategy { " WHERE \"strategy\" = $1" } else { "" }
    )
}

pub(crate) fn insert_policy(table: &PolicyTableConfig) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        table.fullname(),
        POLICY_COLUMNS
    )
}

pub(crate) fn delete_policy(table: &PolicyTableConfig) -> String {
    format!("DELETE FROM {} WHERE \"id\" = $1", table.fullname())
}

/// Makes writes to the policy table visible to the next read
pub(crate) fn refresh(table: &PolicyTableConfig) -> String {
    format!("REFRESH TABLE {}", table.fullname())
}

pub(crate) const SELECT_PARTITIONS: &str =
    "SELECT \"values\" FROM information_schema.table_partitions WHERE \"table_schema\" = $1 AND \"table_name\" = $2";

/// Pick the expired values of the policy's partition column out of the
/// `values` objects of `information_schema.table_partitions`
pub(crate) fn expired_values(
    policy: &PolicyTemplate,
    cutoff: NaiveDate,
    partitions: impl IntoIterator<Item = serde_json::Value>,
) -> Result<Vec<PartitionValue>> {
    let retained_since = policy.retained_since(cutoff);
    let mut expired = Vec::new();

    for values in partitions {
        // Partitions of other columns (or with a NULL value) are not governed
        let Some(value) = values.get(&policy.partition_column).filter(|value| !value.is_null()) else {
            continue;
        };
        let value = PartitionValue::from_json(value)?;
        if value.is_older_than(retained_since) {
            expired.push(value);
        }
    }

    expired.sort();
    expired.dedup();
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retention::{RetentionError, RetentionStrategy};
    use serde_json::json;

    fn policy() -> PolicyTemplate {
        PolicyTemplate::new(RetentionStrategy::Delete, "doc", "sensor_data", "ts", 1)
    }

    #[test]
    fn test_policy_statements() {
        let table = PolicyTableConfig::default();

        assert!(create_schema(&table).starts_with("CREATE TABLE IF NOT EXISTS \"ext\".\"retention_policy\" ("));
        assert!(select_policies(&table, true).contains("FROM \"ext\".\"retention_policy\" WHERE \"strategy\" = $1 ORDER BY"));
        assert!(!select_policies(&table, false).contains("WHERE"));
        assert!(insert_policy(&table).ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"));
        assert_eq!(delete_policy(&table), "DELETE FROM \"ext\".\"retention_policy\" WHERE \"id\" = $1");
        assert_eq!(refresh(&table), "REFRESH TABLE \"ext\".\"retention_policy\"");
    }

    #[test]
    fn test_expired_values() {
        let cutoff = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap();
        let partitions = vec![
            json!({"ts": 1609459200000i64}),
            json!({"ts": 1577836800000i64}),
            json!({"ts": 1609545600000i64}),
            json!({"ts": null}),
            json!({"other": 1}),
            json!({"ts": 1577836800000i64}),
        ];

        // Retained since 2021-01-01
        assert_eq!(
            expired_values(&policy(), cutoff, partitions).unwrap(),
            vec![PartitionValue::Integer(1577836800000)]
        );
    }

    #[test]
    fn test_expired_values_rejects_text() {
        let cutoff = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap();
        assert!(matches!(
            expired_values(&policy(), cutoff, vec![json!({"ts": "eu-west"})]),
            Err(RetentionError::Configuration(_))
        ));
    }
}
