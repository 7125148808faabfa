/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use retention::{PolicyTemplate, RetentionConfig, RetentionStrategy};

/// Retention policies for partitioned CrateDB tables
#[derive(Parser, Debug)]
#[command(name = "cratedb-retention")]
#[command(about = "Apply retention policies to expired CrateDB partitions")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database URL, e.g. postgres://crate@localhost:5432/
    #[arg(long, env = "CRATEDB_URL")]
    pub database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the retention policy table
    Setup,

    /// Print all retention policies as JSON lines
    ListPolicies,

    /// Add a retention policy
    CreatePolicy(PolicyArgs),

    /// Delete a retention policy
    DeletePolicy {
        /// Policy identifier
        id: String,
    },

    /// Dispose of expired partitions
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Retention strategy (snapshot, delete, reallocate)
    #[arg(long)]
    pub strategy: RetentionStrategy,

    /// Table schema
    #[arg(long, default_value = "doc")]
    pub schema: String,

    /// Table name
    #[arg(long)]
    pub table: String,

    /// Partition column
    #[arg(long)]
    pub column: String,

    /// Retention period in days
    #[arg(long)]
    pub period: u32,

    /// Tag attached to the policy, may be repeated
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Snapshot repository (snapshot strategy)
    #[arg(long)]
    pub repository: Option<String>,

    /// Routing attribute name (reallocate strategy)
    #[arg(long)]
    pub attribute_name: Option<String>,

    /// Routing attribute value (reallocate strategy)
    #[arg(long)]
    pub attribute_value: Option<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Retention strategy to apply
    #[arg(long)]
    pub strategy: RetentionStrategy,

    /// Cutoff day (YYYY-MM-DD), defaults to today
    #[arg(long, value_name = "DAY")]
    pub cutoff_day: Option<NaiveDate>,

    /// Only apply policies carrying this tag, may be repeated
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Log statements instead of executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Number of partitions disposed of concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl Cli {
    /// Load the configuration file, if any, and apply command line overrides
    pub fn load_config(&self) -> anyhow::Result<RetentionConfig> {
        let mut config = match &self.config {
            Some(path) => RetentionConfig::load(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => RetentionConfig::default(),
        };

        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }

        if let Commands::Run(run) = &self.command {
            config.dry_run |= run.dry_run;
            if let Some(concurrency) = run.concurrency {
                config.concurrency = concurrency;
            }
            config.default_tags.extend(run.tags.iter().cloned());
        }

        Ok(config)
    }
}

impl PolicyArgs {
    /// Build a policy, checking the fields its strategy needs
    pub fn into_policy(self) -> anyhow::Result<PolicyTemplate> {
        let mut policy = PolicyTemplate::new(self.strategy, self.schema, self.table, self.column, self.period);
        policy.tags = self.tags.into_iter().collect();

        match self.strategy {
            RetentionStrategy::Snapshot => {
                let Some(repository) = self.repository else {
                    bail!("the snapshot strategy requires --repository");
                };
                policy = policy.with_target_repository(repository);
            }
            RetentionStrategy::Reallocate => {
                let (Some(name), Some(value)) = (self.attribute_name, self.attribute_value) else {
                    bail!("the reallocate strategy requires --attribute-name and --attribute-value");
                };
                policy = policy.with_reallocation(name, value);
            }
            RetentionStrategy::Delete => {}
        }

        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "cratedb-retention",
            "--database-url",
            "postgres://crate@localhost:5432/",
            "run",
            "--strategy",
            "snapshot",
            "--cutoff-day",
            "2023-01-01",
            "--tag",
            "sensors",
            "--dry-run",
            "--concurrency",
            "4",
        ])
        .unwrap();

        let Commands::Run(run) = &cli.command else {
            panic!("expected run command");
        };
        assert_eq!(run.strategy, RetentionStrategy::Snapshot);
        assert_eq!(run.cutoff_day, NaiveDate::from_ymd_opt(2023, 1, 1));

        let config = cli.load_config().unwrap();
        assert!(config.dry_run);
        assert_eq!(config.concurrency, 4);
        assert!(config.default_tags.contains("sensors"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://crate@localhost:5432/"));
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["cratedb-retention", "run", "--strategy", "shred"]).is_err());
    }

    #[test]
    fn test_create_policy() {
        let cli = Cli::try_parse_from([
            "cratedb-retention",
            "create-policy",
            "--strategy",
            "snapshot",
            "--table",
            "sensor_data",
            "--column",
            "ts",
            "--period",
            "365",
            "--repository",
            "export_cold",
        ])
        .unwrap();

        let Commands::CreatePolicy(args) = cli.command else {
            panic!("expected create-policy command");
        };
        let policy = args.into_policy().unwrap();
        assert_eq!(policy.table_fullname(), "doc.sensor_data");
        assert_eq!(policy.target_repository_name.as_deref(), Some("export_cold"));
    }

    #[test]
    fn test_create_policy_requires_strategy_fields() {
        let cli = Cli::try_parse_from([
            "cratedb-retention",
            "create-policy",
            "--strategy",
            "reallocate",
            "--table",
            "raw_metrics",
            "--column",
            "ts_day",
            "--period",
            "60",
            "--attribute-name",
            "storage",
        ])
        .unwrap();

        let Commands::CreatePolicy(args) = cli.command else {
            panic!("expected create-policy command");
        };
        assert!(args.into_policy().is_err());
    }
}
