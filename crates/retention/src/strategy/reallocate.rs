/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Move expired partitions to nodes carrying a routing attribute

use crate::{
    action::RetentionAction,
    error::{Result, RetentionError},
    model::{ResolvedInstance, RetentionStrategy},
};

use super::partition_clause;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReallocateAction;

impl RetentionAction for ReallocateAction {
    fn strategy(&self) -> RetentionStrategy {
        RetentionStrategy::Reallocate
    }

    fn render_statements(&self, instance: &ResolvedInstance) -> Result<Vec<String>> {
        let policy = instance.policy();
        let (Some(name), Some(value)) = (
            policy.reallocation_attribute_name.as_deref(),
            policy.reallocation_attribute_value.as_deref(),
        ) else {
            return Err(RetentionError::configuration(format!(
                "reallocate policy on {} needs an attribute name and value",
                instance.table_fullname()
            )));
        };

        Ok(vec![format!(
            "ALTER TABLE {} {} SET (\"routing.allocation.require.{}\" = '{}');",
            instance.table_fullname(),
            partition_clause(instance),
            name,
            value.replace('\'', "''")
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PartitionValue, PolicyTemplate};

    fn policy() -> PolicyTemplate {
        PolicyTemplate::new(RetentionStrategy::Reallocate, "doc", "raw_metrics", "ts_day", 60)
    }

    #[test]
    fn test_reallocate_statement() {
        let instance = ResolvedInstance::resolve(
            policy().with_reallocation("storage", "warm"),
            PartitionValue::Integer(1609459200000),
        )
        .unwrap();

        assert_eq!(
            ReallocateAction.render_statements(&instance).unwrap(),
            vec!["ALTER TABLE doc.raw_metrics PARTITION (ts_day = 1609459200000) SET (\"routing.allocation.require.storage\" = 'warm');".to_string()]
        );
    }

    #[test]
    fn test_reallocate_escapes_value() {
        let instance = ResolvedInstance::resolve(
            policy().with_reallocation("storage", "o'warm"),
            PartitionValue::Integer(1),
        )
        .unwrap();

        let statements = ReallocateAction.render_statements(&instance).unwrap();
        assert!(statements[0].ends_with("= 'o''warm');"));
    }

    #[test]
    fn test_reallocate_requires_attribute() {
        let instance = ResolvedInstance::resolve(policy(), PartitionValue::Integer(1)).unwrap();

        assert!(matches!(
            ReallocateAction.render_statements(&instance),
            Err(RetentionError::Configuration(_))
        ));
    }
}
