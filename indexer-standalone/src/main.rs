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

use anyhow::Context;
use extract_worker::domain::{
    registry::ExtractorRegistry,
    sink::{NoopSearchSink, NoopWebhookSink},
};
use indexer_common::{
    config::ConfigExt,
    domain::{WasmCodeService, job::Topic},
    infra::{migrations, pool::postgres::PostgresPool, queue::in_mem::InMemJobQueue},
    telemetry,
};
use log::{error, info};
use serde::Deserialize;
use std::{collections::HashMap, panic, sync::Arc};
use tokio::{
    signal::unix::{SignalKind, signal},
    try_join,
};

#[derive(Debug, Clone, Deserialize)]
struct Config {
    run_migrations: bool,

    #[serde(rename = "chain")]
    chain_config: chain_indexer::application::Config,

    #[serde(rename = "worker")]
    worker_config: extract_worker::application::Config,

    #[serde(rename = "node")]
    node_config: chain_indexer::infra::comet_node::Config,

    #[serde(rename = "storage")]
    storage_config: indexer_common::infra::pool::postgres::Config,

    #[serde(rename = "queue", default)]
    queue_config: indexer_common::infra::queue::in_mem::Config,

    #[serde(rename = "telemetry")]
    telemetry_config: telemetry::Config,

    /// Code-id allow-lists keyed by code key, e.g. `bank-balances`.
    #[serde(default)]
    wasm_codes: HashMap<String, Vec<u64>>,
}

#[tokio::main]
async fn main() {
    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");

    let Config {
        run_migrations,
        chain_config,
        worker_config,
        node_config,
        storage_config,
        queue_config,
        telemetry_config,
        wasm_codes,
    } = config;

    telemetry::init_tracing(telemetry_config.tracing_config);
    telemetry::init_metrics(telemetry_config.metrics_config);

    let pool = PostgresPool::new(storage_config)
        .await
        .context("create DB pool for Postgres")?;
    if run_migrations {
        migrations::postgres::run(&pool)
            .await
            .context("run migrations for Postgres")?;
    }

    let wasm_codes = Arc::new(WasmCodeService::new(wasm_codes));
    let queue = InMemJobQueue::new(queue_config);

    let node =
        chain_indexer::infra::comet_node::CometNode::new(node_config.clone()).context("create node")?;
    let chain_storage = chain_indexer::infra::storage::postgres::PostgresStorage::new(pool.clone());

    let worker_storage =
        extract_worker::infra::storage::postgres::PostgresStorage::new(pool.clone());
    let chain_client = extract_worker::infra::chain_client::CometChainClient::new(
        extract_worker::infra::chain_client::Config {
            rpc_url: node_config.rpc_url,
        },
    )
    .context("create chain client")?;
    let registry = Arc::new(ExtractorRegistry::default());

    let chain_indexer = chain_indexer::application::run(
        chain_config,
        node,
        chain_storage,
        queue.clone(),
        signal(SignalKind::terminate()).context("register SIGTERM handler")?,
    );

    let extract_worker = extract_worker::application::run(
        worker_config.clone(),
        Topic::Extract,
        queue.clone(),
        registry.clone(),
        worker_storage.clone(),
        chain_client.clone(),
        wasm_codes.clone(),
        NoopSearchSink,
        NoopWebhookSink,
        signal(SignalKind::terminate()).context("register SIGTERM handler")?,
    );

    let background_extract_worker = extract_worker::application::run(
        worker_config,
        Topic::ExtractBackground,
        queue,
        registry,
        worker_storage,
        chain_client,
        wasm_codes,
        NoopSearchSink,
        NoopWebhookSink,
        signal(SignalKind::terminate()).context("register SIGTERM handler")?,
    );

    try_join!(chain_indexer, extract_worker, background_extract_worker)
        .map(|_| ())
        .context("run indexer")
}
