/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Retention job driver

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::{
    action::ActionRegistry,
    error::{Result, RetentionError},
    executor::StatementExecutor,
    metrics::RetentionMetrics,
    model::{ResolvedInstance, RetentionStrategy},
    store::PolicyStore,
};

/// One retention run for a strategy and cutoff day
#[derive(Debug, Clone)]
pub struct GenericRetentionJob {
    strategy: RetentionStrategy,
    cutoff: NaiveDate,
    tags: BTreeSet<String>,
    store: Arc<dyn PolicyStore>,
    executor: Arc<dyn StatementExecutor>,
    registry: ActionRegistry,
    concurrency: usize,
    metrics: Option<Arc<RwLock<RetentionMetrics>>>,
    span: Span,
}

/// A resolved instance together with the statements disposing of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDisposal {
    pub instance: ResolvedInstance,
    pub statements: Vec<String>,
}

/// Disposal state of a single instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Pending,
    Succeeded,
    Failed,
}

/// Outcome of disposing of one instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceOutcome {
    pub instance: ResolvedInstance,
    pub state: InstanceState,
    pub statements_executed: usize,
    pub error: Option<String>,
}

/// Result of a retention run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub strategy: RetentionStrategy,
    pub cutoff: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcomes: Vec<InstanceOutcome>,
}

impl GenericRetentionJob {
    pub fn new(
        strategy: RetentionStrategy,
        cutoff: NaiveDate,
        store: Arc<dyn PolicyStore>,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        Self {
            strategy,
            cutoff,
            tags: BTreeSet::new(),
            store,
            executor,
            registry: ActionRegistry::default(),
            concurrency: 1,
            metrics: None,
            span: info_span!("retention_job", %strategy, %cutoff),
        }
    }

    /// Only process policies carrying all of these tags
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Number of instances disposed of concurrently
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RwLock<RetentionMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Span all log events of this run are recorded in
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn strategy(&self) -> RetentionStrategy {
        self.strategy
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    /// Find every expired partition governed by a matching policy.
    ///
    /// The result only depends on the stored policies, the partition
    /// metadata and the cutoff day.
    pub async fn resolve(&self) -> Result<Vec<ResolvedInstance>> {
        self.resolve_instances().instrument(self.span.clone()).await
    }

    /// Resolve instances and render their statements without executing them
    pub async fn plan(&self) -> Result<Vec<PlannedDisposal>> {
        self.plan_disposals().instrument(self.span.clone()).await
    }

    /// Resolve, render and execute.
    ///
    /// Configuration and resolution errors abort the run. A rejected statement
    /// only fails its own instance, the remaining instances are still processed.
    pub async fn run(&self) -> Result<RunSummary> {
        async {
            let started_at = Utc::now();
            info!(tags = ?self.tags, "Starting retention run");

            let planned = self.plan_disposals().await?;
            let outcomes: Vec<InstanceOutcome> = stream::iter(planned)
                .map(|disposal| self.dispose(disposal))
                .buffered(self.concurrency)
                .collect()
                .await;

            let summary = RunSummary {
                strategy: self.strategy,
                cutoff: self.cutoff,
                started_at,
                completed_at: Utc::now(),
                outcomes,
            };

            if let Some(metrics) = &self.metrics {
                metrics.write().await.record_run(&summary);
            }

            if summary.is_success() {
                info!(
                    instances = summary.outcomes.len(),
                    "Retention run completed"
                );
            } else {
                warn!(
                    succeeded = summary.succeeded().count(),
                    failed = summary.failed().count(),
                    "Retention run completed with failures"
                );
            }

            Ok::<_, RetentionError>(summary)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn resolve_instances(&self) -> Result<Vec<ResolvedInstance>> {
        // Fail before touching the store when the strategy cannot be rendered
        self.registry.get(self.strategy)?;

        let policies = self.store.list_policies(self.strategy, &self.tags).await?;
        debug!(policies = policies.len(), "Loaded retention policies");

        let mut instances = Vec::new();
        for policy in policies {
            let values = self.store.list_expired_partitions(&policy, self.cutoff).await?;
            if values.is_empty() {
                debug!(table = %policy.table_fullname(), "No expired partitions");
                continue;
            }

            info!(
                table = %policy.table_fullname(),
                expired = values.len(),
                "Found expired partitions"
            );
            for value in values {
                instances.push(ResolvedInstance::resolve(policy.clone(), value)?);
            }
        }

        Ok(instances)
    }

    async fn plan_disposals(&self) -> Result<Vec<PlannedDisposal>> {
        self.resolve_instances()
            .await?
            .into_iter()
            .map(|instance| -> Result<PlannedDisposal> {
                let statements = self.registry.render(&instance)?;
                Ok(PlannedDisposal { instance, statements })
            })
            .collect()
    }

    async fn dispose(&self, disposal: PlannedDisposal) -> InstanceOutcome {
        let PlannedDisposal { instance, statements } = disposal;
        let mut outcome = InstanceOutcome::pending(instance);

        for statement in &statements {
            debug!(instance = %outcome.instance, statement, "Executing statement");
            if let Err(err) = self.executor.execute(statement).await {
                error!(
                    instance = %outcome.instance,
                    statement,
                    error = %err,
                    "Disposal failed, skipping remaining statements"
                );
                outcome.fail(&err);
                return outcome;
            }
            outcome.statements_executed += 1;
        }

        info!(instance = %outcome.instance, "Partition disposed");
        outcome.succeed();
        outcome
    }
}

impl InstanceOutcome {
    fn pending(instance: ResolvedInstance) -> Self {
        Self {
            instance,
            state: InstanceState::Pending,
            statements_executed: 0,
            error: None,
        }
    }

    fn succeed(&mut self) {
        self.state = InstanceState::Succeeded;
    }

    fn fail(&mut self, err: &RetentionError) {
        self.state = InstanceState::Failed;
        self.error = Some(err.to_string());
    }
}

impl RunSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &InstanceOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == InstanceState::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &InstanceOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == InstanceState::Failed)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when no instance failed
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn statements_executed(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.statements_executed).sum()
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
