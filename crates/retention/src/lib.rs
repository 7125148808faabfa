/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Partition Retention
//!
//! Retention policies for partitioned CrateDB tables. A policy names a table,
//! its partition column, a retention period and a strategy. A retention job
//! finds the partitions that expired at a cutoff day and disposes of them.
//!
//! ## Strategies
//!
//! - **Snapshot**: copy the partition into a repository, then delete it
//! - **Delete**: delete the partition
//! - **Reallocate**: move the partition to nodes carrying a routing attribute
//!
//! ## Architecture
//!
//! - Policy Store: source of policies and partition metadata
//! - Actions: render the statements disposing of one partition
//! - Retention Job: resolves expired partitions and executes their statements
//! - Statement Executor: runs statements against the database
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use retention::{DryRunExecutor, GenericRetentionJob, MemoryPolicyStore, RetentionStrategy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryPolicyStore::new());
//!     let executor = Arc::new(DryRunExecutor::new());
//!     let cutoff = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
//!
//!     let summary = GenericRetentionJob::new(RetentionStrategy::Snapshot, cutoff, store, executor)
//!         .run()
//!         .await?;
//!     println!("{} partitions disposed", summary.succeeded().count());
//!
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod model;
pub mod store;
pub mod strategy;

pub use action::{ActionRegistry, RetentionAction};
pub use config::{PolicyTableConfig, RetentionConfig};
pub use error::{Result, RetentionError};
pub use executor::{DryRunExecutor, StatementExecutor};
pub use job::{GenericRetentionJob, InstanceOutcome, InstanceState, PlannedDisposal, RunSummary};
pub use metrics::RetentionMetrics;
pub use model::{PartitionValue, PolicyTemplate, ResolvedInstance, RetentionStrategy};
pub use store::{MemoryPolicyStore, PolicyStore};
pub use strategy::{DeleteAction, ReallocateAction, SnapshotAction};
