// This file is part of wasm-indexer.
// Copyright (C) 2025 Wasm Indexer Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::{ops::Deref, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: SecretString,
    pub max_connections: u32,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
}

/// A Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PostgresPool(PgPool);

impl PostgresPool {
    /// Create a new [PostgresPool] with the given [Config].
    pub async fn new(config: Config) -> Result<Self, sqlx::Error> {
        let Config {
            host,
            port,
            dbname,
            user,
            password,
            max_connections,
            idle_timeout,
            max_lifetime,
        } = config;

        let options = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .database(&dbname)
            .username(&user)
            .password(password.expose_secret());

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .connect_with(options)
            .await?;

        Ok(Self(pool))
    }
}

impl Deref for PostgresPool {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<PgPool> for PostgresPool {
    fn from(pool: PgPool) -> Self {
        Self(pool)
    }
}
