/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Built-in retention strategies

pub mod delete;
pub mod reallocate;
pub mod snapshot;

pub use delete::DeleteAction;
pub use reallocate::ReallocateAction;
pub use snapshot::SnapshotAction;

use crate::model::ResolvedInstance;

/// `DELETE` statement removing the partition of an instance
pub(crate) fn delete_partition(instance: &ResolvedInstance) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {};",
        instance.table_fullname(),
        instance.policy().partition_column,
        instance.partition_value()
    )
}

/// `PARTITION (...)` clause addressing the partition of an instance
pub(crate) fn partition_clause(instance: &ResolvedInstance) -> String {
    format!(
        "PARTITION ({} = {})",
        instance.policy().partition_column,
        instance.partition_value()
    )
}
