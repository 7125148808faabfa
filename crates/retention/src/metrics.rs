/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Metrics collection for retention runs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::RunSummary;

/// Counters accumulated over retention runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionMetrics {
    pub total_runs: u64,
    pub failed_runs: u64,
    pub instances_succeeded: u64,
    pub instances_failed: u64,
    pub statements_executed: u64,
    pub average_run_duration: f64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub runs_by_strategy: HashMap<String, u64>,
}

impl RetentionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run
    pub fn record_run(&mut self, summary: &RunSummary) {
        self.total_runs += 1;
        if !summary.is_success() {
            self.failed_runs += 1;
        }

        self.instances_succeeded += summary.succeeded().count() as u64;
        self.instances_failed += summary.failed().count() as u64;
        self.statements_executed += summary.statements_executed() as u64;

        // Update average duration
        let total_duration = self.average_run_duration * (self.total_runs - 1) as f64;
        self.average_run_duration = (total_duration + summary.duration_seconds()) / self.total_runs as f64;

        self.last_run_time = Some(summary.completed_at);
        *self
            .runs_by_strategy
            .entry(summary.strategy.to_string())
            .or_insert(0) += 1;
    }
}
