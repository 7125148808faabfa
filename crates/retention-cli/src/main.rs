/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use retention::{
    DryRunExecutor, GenericRetentionJob, PolicyStore, RetentionConfig, RetentionMetrics, StatementExecutor,
};
use retention_postgres::{PostgresExecutor, PostgresPolicyStore};
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, RunArgs};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = cli.load_config()?;
    let url = config
        .database_url
        .as_deref()
        .context("no database URL, use --database-url or set CRATEDB_URL")?;
    let pool = retention_postgres::connect(url, config.concurrency.max(retention_postgres::DEFAULT_POOL_SIZE))?;
    let store = PostgresPolicyStore::new(pool.clone(), config.policy_table.clone());

    match cli.command {
        Commands::Setup => {
            store.setup_schema().await?;
        }
        Commands::ListPolicies => {
            for policy in store.list_all().await? {
                println!("{}", serde_json::to_string(&policy)?);
            }
        }
        Commands::CreatePolicy(args) => {
            let id = store.create_policy(args.into_policy()?).await?;
            println!("{id}");
        }
        Commands::DeletePolicy { id } => {
            if !store.delete_policy(&id).await? {
                bail!("retention policy {id} does not exist");
            }
        }
        Commands::Run(args) => {
            let executor: Arc<dyn StatementExecutor> = if config.dry_run {
                Arc::new(DryRunExecutor::new())
            } else {
                Arc::new(PostgresExecutor::new(pool))
            };
            run(args, &config, Arc::new(store), executor).await?;
        }
    }

    Ok(())
}

async fn run(
    args: RunArgs,
    config: &RetentionConfig,
    store: Arc<dyn PolicyStore>,
    executor: Arc<dyn StatementExecutor>,
) -> anyhow::Result<()> {
    let cutoff = args.cutoff_day.unwrap_or_else(|| Utc::now().date_naive());
    let metrics = Arc::new(RwLock::new(RetentionMetrics::new()));

    let summary = GenericRetentionJob::new(args.strategy, cutoff, store, executor)
        .with_tags(config.default_tags.iter().cloned())
        .with_concurrency(config.concurrency)
        .with_metrics(metrics.clone())
        .run()
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    let metrics = metrics.read().await;
    info!(
        succeeded = metrics.instances_succeeded,
        failed = metrics.instances_failed,
        statements = metrics.statements_executed,
        duration = metrics.average_run_duration,
        "Retention run finished"
    );

    if metrics.instances_failed > 0 {
        error!("{} partitions could not be disposed of", metrics.instances_failed);
        bail!("retention run completed with failures");
    }
    Ok(())
}
