/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Delete expired partitions without keeping a copy

use crate::{
    action::RetentionAction,
    error::Result,
    model::{ResolvedInstance, RetentionStrategy},
};

use super::delete_partition;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteAction;

impl RetentionAction for DeleteAction {
    fn strategy(&self) -> RetentionStrategy {
        RetentionStrategy::Delete
    }

    fn render_statements(&self, instance: &ResolvedInstance) -> Result<Vec<String>> {
        Ok(vec![delete_partition(instance)])
    }
}
