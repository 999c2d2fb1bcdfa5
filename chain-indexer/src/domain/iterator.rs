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

use crate::domain::{
    node::{BlockData, BlockHeader, Node, NodeError, TxData, TxError},
    tip::TipTracker,
};
use indexer_common::{
    error::BoxError,
    retry::{Backoff, retry},
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    join, select,
    sync::{Notify, watch},
    task::JoinSet,
    time::sleep,
};

/// Blocks below `earliest_block_height + EARLIEST_OFFSET` are considered unsafe to index, e.g.
/// because state sync leaves them without results.
const EARLIEST_OFFSET: u64 = 10;

/// Attempt budget and base delay for one block fetch.
const FETCH_BACKOFF: Backoff =
    Backoff::new(30, Duration::from_secs(1)).with_max_delay(Duration::from_secs(30));

/// Delay before retrying a height the node has not committed yet; such retries are not counted.
const NOT_COMMITTED_DELAY: Duration = Duration::from_secs(1);

/// Fetcher/consumer wakeup tick when there is nothing else to wait for.
const IDLE_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub start_height: u64,
    pub end_height: Option<u64>,

    /// Upper bound for buffered plus in-flight block fetches.
    #[serde(default = "buffer_size_default")]
    pub buffer_size: usize,

    /// Re-raise the first error after reporting it, terminating the iteration.
    #[serde(default)]
    pub throw_errors: bool,
}

const fn buffer_size_default() -> usize {
    20
}

/// Non-fatal errors surfaced through [BlockHandler::on_error].
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("start height {requested} below earliest usable height, clamped to {clamped_to}")]
    StartHeightTooLow {
        requested: u64,
        earliest: u64,
        clamped_to: u64,
    },

    #[error("cannot fetch block at height {block_height}")]
    Block {
        block_height: u64,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    Tx(#[from] TxError),
}

/// Fatal errors terminating [BlockIterator::iterate].
#[derive(Debug, Error)]
pub enum IterateError {
    #[error("end height {end} below start height {start}")]
    InvalidRange { start: u64, end: u64 },

    #[error("cannot get node status")]
    Status(#[source] NodeError),

    #[error("block handler failed")]
    Handler(#[source] BoxError),

    #[error("iteration stopped on error")]
    Strict(#[source] IterationError),
}

/// Callbacks invoked by the consumer loop, strictly ordered: all callbacks for block `h` precede
/// any callback for `h + 1`, and `on_tx` is invoked in TX-index order within a block. Callbacks
/// run inline on the consumer task and must return promptly.
#[trait_variant::make(Send)]
pub trait BlockHandler
where
    Self: Send + Sync + 'static,
{
    async fn on_block(&self, header: &BlockHeader) -> Result<(), BoxError>;

    async fn on_tx(&self, tx: &TxData, header: &BlockHeader) -> Result<(), BoxError>;

    async fn on_error(&self, error: &IterationError) -> Result<(), BoxError>;
}

/// Pull-based block pipeline: fetches blocks in parallel, bounded by `buffer_size`, while
/// emitting them in strict height order. Fetching is gated by the [TipTracker] so only
/// committed heights are requested.
pub struct BlockIterator<N> {
    node: N,
    tip: TipTracker,
    config: Config,
    stop: watch::Sender<bool>,
}

impl<N> BlockIterator<N>
where
    N: Node,
{
    pub fn new(node: N, tip: TipTracker, config: Config) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            node,
            tip,
            config,
            stop,
        }
    }

    /// Signal a clean shutdown: the fetcher stops spawning fetches and awaits in-flight ones,
    /// the consumer drains buffered blocks, then [Self::iterate] returns.
    pub fn stop_fetching(&self) {
        let _ = self.stop.send(true);
    }

    /// Deliver every block in the configured range to the given handler, in ascending height
    /// order, with TXs in original order. Returns when the end height has been emitted, after
    /// [Self::stop_fetching], or on a fatal error.
    pub async fn iterate(&self, handler: impl BlockHandler) -> Result<(), IterateError> {
        self.stop.send_replace(false);

        let Config {
            start_height,
            end_height,
            buffer_size,
            throw_errors,
        } = self.config;

        if let Some(end_height) = end_height
            && end_height < start_height
        {
            return Err(IterateError::InvalidRange {
                start: start_height,
                end: end_height,
            });
        }

        let status = retry(FETCH_BACKOFF, |_| self.node.status())
            .await
            .map_err(IterateError::Status)?;

        let earliest_usable = status.earliest_block_height + EARLIEST_OFFSET;
        let mut start_height = start_height;
        let mut clamp_error = None;
        if start_height < earliest_usable {
            clamp_error = Some(IterationError::StartHeightTooLow {
                requested: start_height,
                earliest: status.earliest_block_height,
                clamped_to: earliest_usable,
            });
            start_height = earliest_usable;
        }

        info!(
            chain_id:% = status.chain_id,
            start_height,
            end_height:?,
            buffer_size;
            "starting block iteration"
        );

        let buffer = Arc::new(Mutex::new(BTreeMap::new()));
        let filled = Arc::new(Notify::new());
        let fetcher_done = Arc::new(AtomicBool::new(false));

        let fetcher = fetcher_loop(
            self.node.clone(),
            self.tip.clone(),
            self.stop.subscribe(),
            start_height,
            end_height,
            buffer_size,
            buffer.clone(),
            filled.clone(),
            fetcher_done.clone(),
        );

        let consumer = async {
            let result = consumer_loop(
                &handler,
                clamp_error,
                self.stop.subscribe(),
                start_height,
                end_height,
                throw_errors,
                buffer,
                filled,
                fetcher_done,
            )
            .await;

            // Natural completion and fatal errors both terminate the fetcher.
            let _ = self.stop.send(true);

            result
        };

        let ((), result) = join!(fetcher, consumer);
        result
    }
}

type Buffer = Arc<Mutex<BTreeMap<u64, Result<BlockData, NodeError>>>>;

#[allow(clippy::too_many_arguments)]
async fn fetcher_loop<N>(
    node: N,
    tip: TipTracker,
    mut stop: watch::Receiver<bool>,
    start_height: u64,
    end_height: Option<u64>,
    buffer_size: usize,
    buffer: Buffer,
    filled: Arc<Notify>,
    fetcher_done: Arc<AtomicBool>,
) where
    N: Node,
{
    let mut join_set = JoinSet::new();
    let mut next_height = start_height;

    loop {
        while join_set.try_join_next().is_some() {}

        if *stop.borrow() {
            break;
        }

        let at_end = end_height.is_some_and(|end| next_height > end);
        if at_end && join_set.is_empty() {
            break;
        }

        let occupied = join_set.len() + buffer.lock().len();
        let tip_allows = tip.latest().is_some_and(|tip| next_height <= tip);

        if !at_end && occupied < buffer_size && tip_allows {
            let height = next_height;
            next_height += 1;

            let node = node.clone();
            let buffer = buffer.clone();
            let filled = filled.clone();
            let mut stop = stop.clone();
            join_set.spawn(async move {
                // A completed fetch lands in the buffer atomically; shutdown abandons the
                // attempt instead of waiting out its retry budget.
                select! {
                    result = fetch_block(&node, height) => {
                        buffer.lock().insert(height, result);
                        filled.notify_one();
                    }

                    _ = stop.wait_for(|stop| *stop) => {}
                }
            });

            continue;
        }

        select! {
            _ = stop.changed() => {}
            _ = sleep(IDLE_TICK) => {}
            Some(_) = join_set.join_next(), if !join_set.is_empty() => {}
        }
    }

    // Await in-flight fetches so no partial block escapes the buffer.
    while join_set.join_next().await.is_some() {}

    fetcher_done.store(true, Ordering::SeqCst);
    filled.notify_one();
    debug!(next_height; "fetcher finished");
}

/// Fetch one block with the transient-error attempt budget. A "height too high" response means
/// the node has not committed the height yet; it is retried after a short delay without
/// counting against the budget.
async fn fetch_block<N>(node: &N, height: u64) -> Result<BlockData, NodeError>
where
    N: Node,
{
    retry(FETCH_BACKOFF, |_| async move {
        loop {
            match node.block(height).await {
                Err(NodeError::HeightTooHigh(height)) => {
                    debug!(height; "height not committed yet, retrying");
                    sleep(NOT_COMMITTED_DELAY).await;
                }

                result => return result,
            }
        }
    })
    .await
}

#[allow(clippy::too_many_arguments)]
async fn consumer_loop(
    handler: &impl BlockHandler,
    clamp_error: Option<IterationError>,
    mut stop: watch::Receiver<bool>,
    start_height: u64,
    end_height: Option<u64>,
    throw_errors: bool,
    buffer: Buffer,
    filled: Arc<Notify>,
    fetcher_done: Arc<AtomicBool>,
) -> Result<(), IterateError> {
    if let Some(error) = clamp_error {
        warn!(error:%; "start height too low");
        handler
            .on_error(&error)
            .await
            .map_err(IterateError::Handler)?;
    }

    let mut current_height = start_height;

    loop {
        if end_height.is_some_and(|end| current_height > end) {
            break;
        }

        let entry = buffer.lock().remove(&current_height);
        let Some(entry) = entry else {
            if fetcher_done.load(Ordering::SeqCst) {
                break;
            }

            select! {
                _ = filled.notified() => {}
                _ = stop.changed() => {}
                _ = sleep(IDLE_TICK) => {}
            }
            continue;
        };

        match entry {
            Ok(block) => {
                handler
                    .on_block(&block.header)
                    .await
                    .map_err(IterateError::Handler)?;

                for tx in &block.txs {
                    match tx {
                        Ok(tx) => {
                            handler
                                .on_tx(tx, &block.header)
                                .await
                                .map_err(IterateError::Handler)?;
                        }

                        Err(tx_error) => {
                            let error = IterationError::Tx(tx_error.clone());
                            handler
                                .on_error(&error)
                                .await
                                .map_err(IterateError::Handler)?;
                            if throw_errors {
                                return Err(IterateError::Strict(error));
                            }
                        }
                    }
                }
            }

            Err(node_error) => {
                let error = IterationError::Block {
                    block_height: current_height,
                    source: node_error,
                };
                handler
                    .on_error(&error)
                    .await
                    .map_err(IterateError::Handler)?;
                if throw_errors {
                    return Err(IterateError::Strict(error));
                }
            }
        }

        current_height += 1;
    }

    debug!(current_height; "consumer finished");
    Ok(())
}
