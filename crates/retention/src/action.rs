/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Disposal actions and the registry selecting them by strategy

use std::{collections::HashMap, sync::Arc};

use crate::{
    error::{Result, RetentionError},
    model::{ResolvedInstance, RetentionStrategy},
    strategy::{DeleteAction, ReallocateAction, SnapshotAction},
};

/// Renders the statements disposing of one resolved partition.
///
/// Implementations are pure. Statements are returned in execution order and
/// anything that prepares a disposal (such as copying data off the cluster)
/// must come before statements removing data.
pub trait RetentionAction: Send + Sync + std::fmt::Debug {
    /// Strategy this action implements
    fn strategy(&self) -> RetentionStrategy;

    /// Render the ordered, non-empty statement list for an instance
    fn render_statements(&self, instance: &ResolvedInstance) -> Result<Vec<String>>;
}

/// Maps each strategy to the action implementing it
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: HashMap<RetentionStrategy, Arc<dyn RetentionAction>>,
}

impl ActionRegistry {
    /// Create a registry without any action
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action, replacing the one registered for its strategy
    pub fn register(&mut self, action: Arc<dyn RetentionAction>) -> Option<Arc<dyn RetentionAction>> {
        self.actions.insert(action.strategy(), action)
    }

    pub fn get(&self, strategy: RetentionStrategy) -> Result<Arc<dyn RetentionAction>> {
        self.actions
            .get(&strategy)
            .cloned()
            .ok_or_else(|| RetentionError::configuration(format!("no action registered for strategy {strategy}")))
    }

    /// Render the statements of an instance with the action of its strategy
    pub fn render(&self, instance: &ResolvedInstance) -> Result<Vec<String>> {
        let statements = self.get(instance.policy().strategy)?.render_statements(instance)?;
        if statements.is_empty() {
            return Err(RetentionError::configuration(format!(
                "{} action rendered no statements for {instance}",
                instance.policy().strategy
            )));
        }
        Ok(statements)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SnapshotAction));
        registry.register(Arc::new(DeleteAction));
        registry.register(Arc::new(ReallocateAction));
        registry
    }
}
