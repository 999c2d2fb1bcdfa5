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

mod metrics;

use crate::{
    application::metrics::Metrics,
    domain::{
        exporter::{self, TraceExporter},
        iterator::{self, BlockHandler, BlockIterator, IterationError},
        node::{BlockHeader, Node, TxData},
        storage::Storage,
        tip::TipTracker,
        trace::{BankTraceHandler, FeegrantTraceHandler, TraceHandler, WasmTraceHandler},
    },
};
use anyhow::Context;
use indexer_common::{
    domain::{Block, job::JobQueue},
    error::BoxError,
};
use log::{debug, info, warn};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::{select, signal::unix::Signal};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Absent: resume above the highest stored block, or from height 1 on an empty store.
    #[serde(default)]
    pub start_height: Option<u64>,

    #[serde(default)]
    pub end_height: Option<u64>,

    #[serde(default = "buffer_size_default")]
    pub buffer_size: usize,

    #[serde(default)]
    pub throw_errors: bool,

    #[serde(default = "tip_poll_interval_default", with = "humantime_serde")]
    pub tip_poll_interval: Duration,

    #[serde(rename = "exporter", default)]
    pub exporter_config: exporter::Config,
}

const fn buffer_size_default() -> usize {
    20
}

const fn tip_poll_interval_default() -> Duration {
    Duration::from_secs(3)
}

pub async fn run(
    config: Config,
    node: impl Node,
    storage: impl Storage,
    queue: impl JobQueue,
    mut sigterm: Signal,
) -> anyhow::Result<()> {
    let Config {
        start_height,
        end_height,
        buffer_size,
        throw_errors,
        tip_poll_interval,
        exporter_config,
    } = config;

    let status = node.status().await.context("get node status")?;
    storage
        .update_chain_id(&status.chain_id)
        .await
        .context("update chain id")?;

    let highest_block = storage
        .get_highest_block()
        .await
        .context("get highest block")?;
    let start_height = start_height
        .or_else(|| highest_block.map(|block| block.height + 1))
        .unwrap_or(1);

    let chain_state = storage.get_chain_state().await.context("get chain state")?;
    info!(
        chain_id:% = status.chain_id,
        start_height,
        end_height:?,
        highest_block_height:? = highest_block.map(|block| block.height),
        last_wasm_exported:? = chain_state.last_wasm_block_height_exported,
        last_bank_exported:? = chain_state.last_bank_block_height_exported,
        last_feegrant_exported:? = chain_state.last_feegrant_block_height_exported;
        "starting chain indexing"
    );

    let handlers: Arc<Vec<Box<dyn TraceHandler>>> = Arc::new(vec![
        Box::new(WasmTraceHandler),
        Box::new(BankTraceHandler),
        Box::new(FeegrantTraceHandler),
    ]);
    let background_handlers = handlers
        .iter()
        .filter(|handler| handler.background())
        .map(|handler| handler.name().to_string())
        .collect::<Vec<_>>();
    let exporter = Arc::new(TraceExporter::new(
        queue,
        storage.clone(),
        exporter_config,
        background_handlers,
    ));

    let tip = TipTracker::spawn(node.clone(), tip_poll_interval);
    let iterator = BlockIterator::new(
        node,
        tip,
        iterator::Config {
            start_height,
            end_height,
            buffer_size,
            throw_errors,
        },
    );

    let handler = IndexingHandler {
        storage: storage.clone(),
        exporter: exporter.clone(),
        handlers,
        metrics: Metrics::new(highest_block.map(|block| block.height)),
    };

    let iterate = iterator.iterate(handler);
    tokio::pin!(iterate);

    let result = select! {
        result = &mut iterate => result,

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            iterator.stop_fetching();
            iterate.await
        }
    };

    // Drain buffered trace items before returning.
    exporter.flush_all().await;

    result.context("iterate blocks")
}

/// Routes iterator callbacks into block persistence, the trace handlers and the exporter.
struct IndexingHandler<Q, S> {
    storage: S,
    exporter: Arc<TraceExporter<Q, S>>,
    handlers: Arc<Vec<Box<dyn TraceHandler>>>,
    metrics: Metrics,
}

impl<Q, S> BlockHandler for IndexingHandler<Q, S>
where
    Q: JobQueue,
    S: Storage,
{
    async fn on_block(&self, header: &BlockHeader) -> Result<(), BoxError> {
        self.storage
            .save_block(Block {
                height: header.height,
                time_unix_ms: header.time_unix_ms,
            })
            .await?;

        // Signal the block boundary even if no TX produces trace items.
        self.exporter.export_items(Vec::new(), header.height).await;

        self.metrics.block(header);
        debug!(height = header.height; "block indexed");

        Ok(())
    }

    async fn on_tx(&self, tx: &TxData, header: &BlockHeader) -> Result<(), BoxError> {
        // Failed TXs do not mutate chain state.
        if !tx.succeeded() {
            return Ok(());
        }

        let items = self
            .handlers
            .iter()
            .flat_map(|handler| handler.handle_tx(tx, header))
            .collect::<Vec<_>>();

        if !items.is_empty() {
            self.exporter.export_items(items, header.height).await;
        }

        self.metrics.tx();

        Ok(())
    }

    async fn on_error(&self, error: &IterationError) -> Result<(), BoxError> {
        warn!(error:%; "iteration error");
        self.metrics.error();
        Ok(())
    }
}
