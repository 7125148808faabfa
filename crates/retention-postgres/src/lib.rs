/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Policy store and statement executor speaking the PostgreSQL wire protocol

pub mod executor;
mod sql;
pub mod store;

pub use executor::PostgresExecutor;
pub use store::PostgresPolicyStore;

use std::fmt::Display;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use retention::{Result, RetentionError};
use tokio_postgres::NoTls;

/// Connections kept open by the pool
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Create a connection pool for a `postgres://` URL
pub fn connect(url: &str, max_size: usize) -> Result<Pool> {
    let config: tokio_postgres::Config = url
        .parse()
        .map_err(|err| RetentionError::configuration(format!("invalid database URL: {err}")))?;
    let manager = Manager::from_config(
        config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(max_size.max(1))
        .build()
        .map_err(|err| RetentionError::configuration(format!("failed to create connection pool: {err}")))
}

#[inline(always)]
pub(crate) fn into_resolution_error(err: impl Display) -> RetentionError {
    RetentionError::resolution(err.to_string())
}
