/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Configuration for retention jobs

use std::{collections::BTreeSet, fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetentionError};

/// Main configuration for retention jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Connection string of the database, e.g. `postgres://crate@localhost:5432/`
    pub database_url: Option<String>,

    /// Table holding retention policies
    pub policy_table: PolicyTableConfig,

    /// Number of partitions disposed of concurrently
    pub concurrency: usize,

    /// Log statements instead of executing them
    pub dry_run: bool,

    /// Tags a policy must carry to be processed
    pub default_tags: BTreeSet<String>,
}

/// Location of the retention policy table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTableConfig {
    pub schema: String,
    pub name: String,
}

impl RetentionConfig {
    /// Load the configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            RetentionError::configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|err| RetentionError::configuration(format!("invalid configuration: {err}")))
    }
}

impl PolicyTableConfig {
    pub fn fullname(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }
}

impl fmt::Display for PolicyTableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            policy_table: PolicyTableConfig::default(),
            concurrency: 1,
            dry_run: false,
            default_tags: BTreeSet::new(),
        }
    }
}

impl Default for PolicyTableConfig {
    fn default() -> Self {
        Self {
            schema: "ext".to_string(),
            name: "retention_policy".to_string(),
        }
    }
}
