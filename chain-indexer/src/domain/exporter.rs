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

use crate::domain::{storage::Storage, trace::TraceItem};
use indexer_common::domain::{
    ExportModule,
    job::{ExtractJob, ExtractJobEnv, JobQueue, Topic},
};
use log::{debug, error, warn};
use metrics::counter;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::Notify,
    task::{self, JoinHandle},
    time::{Instant, sleep_until},
    try_join,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "max_batch_size_default")]
    pub max_batch_size: usize,

    #[serde(default = "debounce_default", with = "humantime_serde")]
    pub debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_size: max_batch_size_default(),
            debounce: debounce_default(),
        }
    }
}

const fn max_batch_size_default() -> usize {
    5_000
}

const fn debounce_default() -> Duration {
    Duration::from_millis(500)
}

/// Buffers [TraceItem]s and flushes them to the extract queues in batches which never mix
/// blocks and which collapse intra-block duplicates per `(handler, id)` to the last value.
/// Flush triggers: a block-height boundary crossing, `max_batch_size` buffered items, or the
/// debounce timer elapsing without new items. Flush failures are logged and counted; the
/// pending batch is retained for the next attempt.
pub struct TraceExporter<Q, S> {
    inner: Arc<Inner<Q, S>>,
    flusher: JoinHandle<()>,
}

struct Inner<Q, S> {
    queue: Q,
    storage: S,
    config: Config,
    background_handlers: HashSet<String>,
    pending: Mutex<Pending>,
    flush_lock: tokio::sync::Mutex<()>,
    activity: Notify,
}

#[derive(Default)]
struct Pending {
    /// Per-height batches; the lowest height flushes first.
    batches: BTreeMap<u64, Batch>,
    last_activity: Option<Instant>,
}

#[derive(Default)]
struct Batch {
    items: Vec<TraceItem>,
    index: HashMap<(String, String), usize>,
}

impl Batch {
    /// Insert keeping the first occurrence's position and the last occurrence's value.
    fn upsert(&mut self, item: TraceItem) {
        let key = (item.handler.clone(), item.id.clone());
        match self.index.get(&key) {
            Some(&at) => self.items[at] = item,
            None => {
                self.index.insert(key, self.items.len());
                self.items.push(item);
            }
        }
    }

    /// Merge a newer batch on top of this one; newer values win per key.
    fn merge_newer(&mut self, newer: Batch) {
        for item in newer.items {
            self.upsert(item);
        }
    }
}

enum FlushOutcome {
    Flushed,
    Empty,
    Failed,
}

impl<Q, S> TraceExporter<Q, S>
where
    Q: JobQueue,
    S: Storage,
{
    pub fn new(
        queue: Q,
        storage: S,
        config: Config,
        background_handlers: impl IntoIterator<Item = String>,
    ) -> Self {
        let inner = Arc::new(Inner {
            queue,
            storage,
            config,
            background_handlers: background_handlers.into_iter().collect(),
            pending: Mutex::new(Pending::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            activity: Notify::new(),
        });

        let flusher = task::spawn(run_flusher(inner.clone()));

        Self { inner, flusher }
    }

    /// Append items for the current block. Crossing a block-height boundary flushes the older
    /// batches first; reaching `max_batch_size` flushes immediately.
    pub async fn export_items(&self, items: Vec<TraceItem>, current_block_height: u64) {
        let crossed_boundary = {
            let pending = self.inner.pending.lock();
            pending
                .batches
                .first_key_value()
                .is_some_and(|(&height, _)| current_block_height > height)
        };
        if crossed_boundary {
            self.flush_below(current_block_height).await;
        }

        if items.is_empty() {
            return;
        }

        let batch_full = {
            let mut pending = self.inner.pending.lock();
            for item in items {
                pending
                    .batches
                    .entry(item.block.height)
                    .or_default()
                    .upsert(item);
            }
            pending.last_activity = Some(Instant::now());

            let max_batch_size = self.inner.config.max_batch_size;
            pending
                .batches
                .values()
                .any(|batch| batch.items.len() >= max_batch_size)
        };
        if batch_full {
            Inner::flush_next(&self.inner).await;
        }

        self.inner.activity.notify_one();
    }

    /// Flush everything currently pending, e.g. on shutdown.
    pub async fn flush_all(&self) {
        while matches!(Inner::flush_next(&self.inner).await, FlushOutcome::Flushed) {}
    }

    async fn flush_below(&self, height: u64) {
        loop {
            let lowest = {
                let pending = self.inner.pending.lock();
                pending.batches.first_key_value().map(|(&height, _)| height)
            };
            match lowest {
                Some(lowest) if lowest < height => {
                    if !matches!(Inner::flush_next(&self.inner).await, FlushOutcome::Flushed) {
                        break;
                    }
                }
                _ => break,
            }
        }
    }
}

impl<Q, S> Drop for TraceExporter<Q, S> {
    fn drop(&mut self) {
        self.flusher.abort();
    }
}

impl<Q, S> Inner<Q, S>
where
    Q: JobQueue,
    S: Storage,
{
    /// Flush the lowest-height pending batch. At most one flush runs at a time; the batch is
    /// restored on failure.
    async fn flush_next(inner: &Arc<Self>) -> FlushOutcome {
        let _guard = inner.flush_lock.lock().await;

        let Some((batch_height, batch)) = ({
            let mut pending = inner.pending.lock();
            pending.batches.pop_first()
        }) else {
            return FlushOutcome::Empty;
        };

        let item_count = batch.items.len();
        let (main_jobs, background_jobs) = batch_to_jobs(&batch, &inner.background_handlers);
        let modules = batch
            .items
            .iter()
            .filter_map(|item| ExportModule::for_handler(&item.handler))
            .collect::<HashSet<_>>();

        let enqueue_main = async {
            if main_jobs.is_empty() {
                Ok(())
            } else {
                inner.queue.enqueue(Topic::Extract, batch_height, main_jobs).await
            }
        };
        let enqueue_background = async {
            if background_jobs.is_empty() {
                Ok(())
            } else {
                inner
                    .queue
                    .enqueue(Topic::ExtractBackground, batch_height, background_jobs)
                    .await
            }
        };

        match try_join!(enqueue_main, enqueue_background) {
            Ok(_) => {
                for module in modules {
                    if let Err(error) = inner
                        .storage
                        .update_export_progress(module, batch_height)
                        .await
                    {
                        warn!(
                            error:%,
                            module:? = module,
                            batch_height;
                            "cannot update export high-water mark"
                        );
                    }
                }

                counter!("trace_exporter_items_flushed").increment(item_count as u64);
                debug!(batch_height, items = item_count; "trace batch flushed");

                FlushOutcome::Flushed
            }

            Err(error) => {
                error!(error:%, batch_height; "cannot flush trace batch, retaining");
                counter!("trace_exporter_flush_failures").increment(1);

                let mut pending = inner.pending.lock();
                let mut batch = batch;
                if let Some(newer) = pending.batches.remove(&batch_height) {
                    batch.merge_newer(newer);
                }
                pending.batches.insert(batch_height, batch);
                pending.last_activity = Some(Instant::now());

                FlushOutcome::Failed
            }
        }
    }
}

/// Group the batch into one job per handler, preserving the order of first appearance, and
/// partition by the handler's background flag.
fn batch_to_jobs(
    batch: &Batch,
    background_handlers: &HashSet<String>,
) -> (Vec<ExtractJob>, Vec<ExtractJob>) {
    let mut groups: Vec<(&str, Vec<&TraceItem>)> = Vec::new();
    let mut group_index: HashMap<&str, usize> = HashMap::new();

    for item in &batch.items {
        match group_index.get(item.handler.as_str()) {
            Some(&at) => groups[at].1.push(item),
            None => {
                group_index.insert(&item.handler, groups.len());
                groups.push((&item.handler, vec![item]));
            }
        }
    }

    let mut main_jobs = Vec::new();
    let mut background_jobs = Vec::new();

    for (handler, items) in groups {
        let block = items[0].block;
        let job = ExtractJob {
            extractor: handler.to_string(),
            data: json!({
                "items": items
                    .iter()
                    .map(|item| {
                        json!({
                            "id": item.id,
                            "value": item.value,
                            "tx_hash": item.tx_hash,
                        })
                    })
                    .collect::<Vec<_>>(),
            }),
            env: ExtractJobEnv {
                block,
                tx_hash: None,
            },
        };

        if background_handlers.contains(handler) {
            background_jobs.push(job);
        } else {
            main_jobs.push(job);
        }
    }

    (main_jobs, background_jobs)
}

async fn run_flusher<Q, S>(inner: Arc<Inner<Q, S>>)
where
    Q: JobQueue,
    S: Storage,
{
    loop {
        // Wait for pending items.
        loop {
            if !inner.pending.lock().batches.is_empty() {
                break;
            }
            inner.activity.notified().await;
        }

        // Wait until no new items arrived for the debounce window.
        loop {
            let deadline = {
                let pending = inner.pending.lock();
                match (pending.batches.is_empty(), pending.last_activity) {
                    (true, _) | (_, None) => None,
                    (false, Some(last_activity)) => Some(last_activity + inner.config.debounce),
                }
            };

            match deadline {
                Some(deadline) if Instant::now() < deadline => sleep_until(deadline).await,
                _ => break,
            }
        }

        // Flush everything pending; stop on failure so the debounce window delays the retry.
        loop {
            match Inner::flush_next(&inner).await {
                FlushOutcome::Flushed => {}
                FlushOutcome::Empty | FlushOutcome::Failed => break,
            }
        }
    }
}
