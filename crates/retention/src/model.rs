/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Retention policies, partition values and resolved instances

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, RetentionError};

/// Schema assumed for policies that do not name one
pub const DEFAULT_TABLE_SCHEMA: &str = "doc";

/// Disposal behavior applied to expired partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionStrategy {
    /// Snapshot the partition into a repository, then delete it
    Snapshot,
    /// Delete the partition without a backup
    Delete,
    /// Move the partition to nodes carrying a routing attribute
    Reallocate,
}

impl RetentionStrategy {
    pub const ALL: [RetentionStrategy; 3] = [
        RetentionStrategy::Snapshot,
        RetentionStrategy::Delete,
        RetentionStrategy::Reallocate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionStrategy::Snapshot => "snapshot",
            RetentionStrategy::Delete => "delete",
            RetentionStrategy::Reallocate => "reallocate",
        }
    }
}

impl fmt::Display for RetentionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionStrategy {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        RetentionStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RetentionError::configuration(format!("unknown retention strategy: {s}")))
    }
}

/// A stored retention rule.
///
/// Templates never carry a partition value. Binding one happens through
/// [`ResolvedInstance::resolve`] once a partition has been found to be expired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyTemplate {
    #[serde(default)]
    pub id: Option<String>,
    pub strategy: RetentionStrategy,
    #[serde(default, deserialize_with = "nullable_tags")]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_table_schema", deserialize_with = "nullable_schema")]
    pub table_schema: String,
    pub table_name: String,
    pub partition_column: String,
    /// Age in days after which a partition expires
    pub retention_period: u32,
    #[serde(default)]
    pub reallocation_attribute_name: Option<String>,
    #[serde(default)]
    pub reallocation_attribute_value: Option<String>,
    #[serde(default)]
    pub target_repository_name: Option<String>,
}

fn default_table_schema() -> String {
    DEFAULT_TABLE_SCHEMA.to_string()
}

fn nullable_tags<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_schema<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_table_schema))
}

impl PolicyTemplate {
    pub fn new(
        strategy: RetentionStrategy,
        table_schema: impl Into<String>,
        table_name: impl Into<String>,
        partition_column: impl Into<String>,
        retention_period: u32,
    ) -> Self {
        Self {
            id: None,
            strategy,
            tags: BTreeSet::new(),
            table_schema: table_schema.into(),
            table_name: table_name.into(),
            partition_column: partition_column.into(),
            retention_period,
            reallocation_attribute_name: None,
            reallocation_attribute_value: None,
            target_repository_name: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_target_repository(mut self, repository: impl Into<String>) -> Self {
        self.target_repository_name = Some(repository.into());
        self
    }

    pub fn with_reallocation(mut self, attribute_name: impl Into<String>, attribute_value: impl Into<String>) -> Self {
        self.reallocation_attribute_name = Some(attribute_name.into());
        self.reallocation_attribute_value = Some(attribute_value.into());
        self
    }

    /// Build a template from a row as returned by a policy store.
    ///
    /// Only type coercion happens here, malformed rows are reported as
    /// configuration errors.
    pub fn from_row(row: serde_json::Value) -> Result<Self> {
        serde_json::from_value(row)
            .map_err(|err| RetentionError::configuration(format!("invalid policy row: {err}")))
    }

    pub fn table_fullname(&self) -> String {
        format!("{}.{}", self.table_schema, self.table_name)
    }

    /// True when the policy carries every tag of the filter
    pub fn matches_tags(&self, filter: &BTreeSet<String>) -> bool {
        filter.is_subset(&self.tags)
    }

    /// First day that is still retained for the given cutoff day.
    ///
    /// Partitions strictly older than this day are expired.
    pub fn retained_since(&self, cutoff: NaiveDate) -> NaiveDate {
        cutoff
            .checked_sub_days(Days::new(u64::from(self.retention_period)))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for PolicyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} policy on {} by {} ({} days)",
            self.strategy,
            self.table_fullname(),
            self.partition_column,
            self.retention_period
        )
    }
}

/// Typed literal addressing one partition.
///
/// There is no free-form text variant: values are always numbers or dates
/// extracted from partition metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionValue {
    /// Integer column or timestamp in epoch milliseconds
    Integer(i64),
    Date(NaiveDate),
}

impl PartitionValue {
    /// Coerce a partition value as returned by partition metadata
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(PartitionValue::Integer)
                .ok_or_else(|| RetentionError::configuration(format!("partition value {number} is not an integer"))),
            serde_json::Value::String(text) => text.parse(),
            other => Err(RetentionError::configuration(format!(
                "unsupported partition value: {other}"
            ))),
        }
    }

    /// True when the partition lies strictly before the given day
    pub fn is_older_than(&self, day: NaiveDate) -> bool {
        match self {
            PartitionValue::Integer(millis) => *millis < day.and_time(NaiveTime::MIN).and_utc().timestamp_millis(),
            PartitionValue::Date(date) => *date < day,
        }
    }
}

impl FromStr for PartitionValue {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        let value = if let Ok(integer) = s.parse::<i64>() {
            PartitionValue::Integer(integer)
        } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            PartitionValue::Date(date)
        } else {
            return Err(RetentionError::configuration(format!(
                "partition value {s:?} is neither an integer nor a date"
            )));
        };

        // The rendered literal must address the same partition as the text
        if value.to_string() == s {
            Ok(value)
        } else {
            Err(RetentionError::configuration(format!(
                "partition value {s:?} is not in canonical form"
            )))
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionValue::Integer(integer) => write!(f, "{integer}"),
            PartitionValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<i64> for PartitionValue {
    fn from(value: i64) -> Self {
        PartitionValue::Integer(value)
    }
}

impl From<NaiveDate> for PartitionValue {
    fn from(value: NaiveDate) -> Self {
        PartitionValue::Date(value)
    }
}

/// A policy bound to one expired partition, ready for disposal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResolvedInstance {
    policy: PolicyTemplate,
    partition_value: PartitionValue,
}

impl ResolvedInstance {
    /// Bind a partition value to a policy.
    ///
    /// Every identifier that ends up in statement text must be a plain,
    /// lowercase SQL identifier. Statements emit them unquoted and the
    /// database folds unquoted identifiers to lowercase.
    pub fn resolve(policy: PolicyTemplate, partition_value: PartitionValue) -> Result<Self> {
        check_identifier("table schema", &policy.table_schema)?;
        check_identifier("table name", &policy.table_name)?;
        check_identifier("partition column", &policy.partition_column)?;
        if let Some(repository) = &policy.target_repository_name {
            check_identifier("target repository", repository)?;
        }
        if let Some(attribute) = &policy.reallocation_attribute_name {
            check_identifier("reallocation attribute", attribute)?;
        }

        Ok(Self {
            policy,
            partition_value,
        })
    }

    pub fn policy(&self) -> &PolicyTemplate {
        &self.policy
    }

    pub fn partition_value(&self) -> PartitionValue {
        self.partition_value
    }

    pub fn table_fullname(&self) -> String {
        self.policy.table_fullname()
    }
}

impl fmt::Display for ResolvedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} = {})",
            self.policy.table_fullname(),
            self.policy.partition_column,
            self.partition_value
        )
    }
}

fn check_identifier(kind: &str, identifier: &str) -> Result<()> {
    let mut chars = identifier.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RetentionError::configuration(format!(
            "{kind} {identifier:?} is not a plain lowercase identifier"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor_policy() -> PolicyTemplate {
        PolicyTemplate::new(RetentionStrategy::Snapshot, "doc", "sensor_data", "ts", 365)
            .with_target_repository("export_cold")
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("snapshot".parse::<RetentionStrategy>().unwrap(), RetentionStrategy::Snapshot);
        assert_eq!("Delete".parse::<RetentionStrategy>().unwrap(), RetentionStrategy::Delete);
        assert!(matches!(
            "shred".parse::<RetentionStrategy>(),
            Err(RetentionError::Configuration(_))
        ));
        assert_eq!(RetentionStrategy::Reallocate.to_string(), "reallocate");
    }

    #[test]
    fn test_table_fullname() {
        assert_eq!(sensor_policy().table_fullname(), "doc.sensor_data");
    }

    #[test]
    fn test_from_row() {
        let policy = PolicyTemplate::from_row(json!({
            "id": "c5a8e1f2",
            "strategy": "snapshot",
            "tags": ["sensors", "cold"],
            "table_schema": "doc",
            "table_name": "sensor_data",
            "partition_column": "ts",
            "retention_period": 365,
            "target_repository_name": "export_cold",
        }))
        .unwrap();

        assert_eq!(policy.id.as_deref(), Some("c5a8e1f2"));
        assert_eq!(policy.strategy, RetentionStrategy::Snapshot);
        assert!(policy.tags.contains("cold"));
        assert_eq!(policy.target_repository_name.as_deref(), Some("export_cold"));
        assert_eq!(policy.reallocation_attribute_name, None);
    }

    #[test]
    fn test_from_row_defaults() {
        let policy = PolicyTemplate::from_row(json!({
            "strategy": "delete",
            "tags": null,
            "table_schema": null,
            "table_name": "events",
            "partition_column": "day",
            "retention_period": 30,
        }))
        .unwrap();

        assert_eq!(policy.table_schema, DEFAULT_TABLE_SCHEMA);
        assert!(policy.tags.is_empty());
        assert_eq!(policy.table_fullname(), "doc.events");
    }

    #[test]
    fn test_from_row_malformed() {
        let missing_table = PolicyTemplate::from_row(json!({
            "strategy": "delete",
            "partition_column": "day",
            "retention_period": 30,
        }));
        assert!(matches!(missing_table, Err(RetentionError::Configuration(_))));

        let unknown_strategy = PolicyTemplate::from_row(json!({
            "strategy": "shred",
            "table_name": "events",
            "partition_column": "day",
            "retention_period": 30,
        }));
        assert!(matches!(unknown_strategy, Err(RetentionError::Configuration(_))));
    }

    #[test]
    fn test_tag_matching() {
        let policy = sensor_policy().with_tag("sensors").with_tag("cold");

        assert!(policy.matches_tags(&BTreeSet::new()));
        assert!(policy.matches_tags(&BTreeSet::from(["cold".to_string()])));
        assert!(!policy.matches_tags(&BTreeSet::from(["cold".to_string(), "hot".to_string()])));
    }

    #[test]
    fn test_retained_since() {
        let cutoff = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        assert_eq!(
            sensor_policy().retained_since(cutoff),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_partition_value_coercion() {
        assert_eq!(
            PartitionValue::from_json(&json!(1609459200000i64)).unwrap(),
            PartitionValue::Integer(1609459200000)
        );
        assert_eq!(
            PartitionValue::from_json(&json!("2021-01-01")).unwrap(),
            PartitionValue::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
        );
        assert_eq!(PartitionValue::from_json(&json!("42")).unwrap(), PartitionValue::Integer(42));
        assert!(PartitionValue::from_json(&json!("1; DROP TABLE doc.sensor_data")).is_err());
        assert!(PartitionValue::from_json(&json!(1.5)).is_err());
        assert!(PartitionValue::from_json(&json!(null)).is_err());
    }

    #[test]
    fn test_partition_value_requires_canonical_text() {
        for text in ["007", "+5", "2021-1-1", " 42", "-0"] {
            assert!(
                matches!(
                    PartitionValue::from_json(&json!(text)),
                    Err(RetentionError::Configuration(_))
                ),
                "{text:?} should be rejected"
            );
        }
        assert_eq!("-5".parse::<PartitionValue>().unwrap(), PartitionValue::Integer(-5));
    }

    #[test]
    fn test_partition_value_rendering() {
        assert_eq!(PartitionValue::Integer(1609459200000).to_string(), "1609459200000");
        assert_eq!(
            PartitionValue::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()).to_string(),
            "2021-01-01"
        );
    }

    #[test]
    fn test_partition_value_age() {
        let day = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();

        assert!(PartitionValue::Integer(1609459199999).is_older_than(day));
        assert!(!PartitionValue::Integer(1609459200000).is_older_than(day));
        assert!(PartitionValue::Date(NaiveDate::from_ymd_opt(2020, 12, 31).unwrap()).is_older_than(day));
        assert!(!PartitionValue::Date(day).is_older_than(day));
    }

    #[test]
    fn test_resolve_rejects_unsafe_identifiers() {
        let value = PartitionValue::Integer(1);

        let policy = PolicyTemplate::new(RetentionStrategy::Delete, "doc", "t; DROP TABLE x", "ts", 1);
        assert!(matches!(
            ResolvedInstance::resolve(policy, value),
            Err(RetentionError::Configuration(_))
        ));

        let policy = sensor_policy().with_target_repository("cold\"repo");
        assert!(ResolvedInstance::resolve(policy, value).is_err());

        assert!(ResolvedInstance::resolve(sensor_policy(), value).is_ok());
    }

    #[test]
    fn test_resolve_rejects_mixed_case_identifiers() {
        let value = PartitionValue::Integer(1);

        let policy = PolicyTemplate::new(RetentionStrategy::Delete, "doc", "SensorData", "ts", 1);
        assert!(matches!(
            ResolvedInstance::resolve(policy, value),
            Err(RetentionError::Configuration(_))
        ));

        let policy = PolicyTemplate::new(RetentionStrategy::Delete, "doc", "sensor_data", "Ts", 1);
        assert!(ResolvedInstance::resolve(policy, value).is_err());

        let policy = PolicyTemplate::new(RetentionStrategy::Reallocate, "doc", "sensor_data", "ts", 1)
            .with_reallocation("Storage", "warm");
        assert!(ResolvedInstance::resolve(policy, value).is_err());
    }

    #[test]
    fn test_resolved_instance_display() {
        let instance = ResolvedInstance::resolve(
            sensor_policy(),
            PartitionValue::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
        )
        .unwrap();

        assert_eq!(instance.to_string(), "doc.sensor_data (ts = 2021-01-01)");
        assert_eq!(instance.table_fullname(), "doc.sensor_data");
    }
}
