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
        chain_client::ChainClient,
        extractor::{ExtractError, ExtractorEnv, PersistedEvent},
        registry::ExtractorRegistry,
        sink::{SearchSink, WebhookSink},
        storage::Storage,
    },
};
use futures::StreamExt;
use indexer_common::{
    domain::{
        WasmCodeService,
        job::{Delivery, ExtractJob, JobQueue, Topic},
    },
    retry::{Backoff, RetryableError, retry},
};
use log::{debug, error, warn};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{join, select, signal::unix::Signal, time::timeout};

/// Retry policy for the extraction call only; downstream fan-out failures never roll back
/// persistence.
const EXTRACT_BACKOFF: Backoff = Backoff::new(3, Duration::from_millis(100));

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "concurrency_default")]
    pub concurrency: usize,

    #[serde(default = "extract_timeout_default", with = "humantime_serde")]
    pub extract_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: concurrency_default(),
            extract_timeout: extract_timeout_default(),
        }
    }
}

const fn concurrency_default() -> usize {
    5
}

const fn extract_timeout_default() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Error)]
enum JobError {
    /// Unknown extractor names are fatal; the job dead-letters without retrying.
    #[error("unknown extractor {0}")]
    ExtractorNotFound(String),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction failed")]
    Extraction(#[from] ExtractError),

    #[error("cannot persist block")]
    SaveBlock(#[source] sqlx::Error),
}

impl RetryableError for JobError {}

#[allow(clippy::too_many_arguments)]
pub async fn run<Q, S, C, SS, WS>(
    config: Config,
    topic: Topic,
    queue: Q,
    registry: Arc<ExtractorRegistry<S, C>>,
    storage: S,
    chain_client: C,
    wasm_codes: Arc<WasmCodeService>,
    search: SS,
    webhooks: WS,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    Q: JobQueue,
    S: Storage,
    C: ChainClient,
    SS: SearchSink,
    WS: WebhookSink,
{
    let concurrency = config.concurrency;
    let worker = Worker {
        config,
        registry,
        storage,
        chain_client,
        wasm_codes,
        search,
        webhooks,
        metrics: Arc::new(Metrics::new(topic)),
    };

    let process = queue.deliveries(topic).for_each_concurrent(concurrency, {
        let worker = worker.clone();
        move |delivery| {
            let worker = worker.clone();
            async move { worker.process_delivery(delivery).await }
        }
    });

    select! {
        _ = process => {
            warn!(topic:% = topic.as_str(); "deliveries stream ended");
            Ok(())
        }

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            Ok(())
        }
    }
}

#[derive(Clone)]
struct Worker<S, C, SS, WS> {
    config: Config,
    registry: Arc<ExtractorRegistry<S, C>>,
    storage: S,
    chain_client: C,
    wasm_codes: Arc<WasmCodeService>,
    search: SS,
    webhooks: WS,
    metrics: Arc<Metrics>,
}

impl<S, C, SS, WS> Worker<S, C, SS, WS>
where
    S: Storage,
    C: ChainClient,
    SS: SearchSink,
    WS: WebhookSink,
{
    async fn process_delivery(&self, delivery: Delivery) {
        let job = delivery.job().clone();
        let attempt = delivery.attempt();

        match self.process_job(&job).await {
            Ok(event_count) => {
                debug!(
                    extractor:% = job.extractor,
                    block_height = job.env.block.height,
                    event_count,
                    attempt;
                    "job done"
                );
                self.metrics.done();
                delivery.ack();
            }

            Err(job_error @ JobError::ExtractorNotFound(_)) => {
                error!(error:% = job_error, attempt; "fatal job failure");
                self.metrics.failed();
                delivery.fail(true);
            }

            Err(job_error) => {
                warn!(
                    error:% = job_error,
                    extractor:% = job.extractor,
                    attempt;
                    "job failed"
                );
                self.metrics.failed();
                delivery.fail(false);
            }
        }
    }

    async fn process_job(&self, job: &ExtractJob) -> Result<usize, JobError> {
        let env = ExtractorEnv {
            storage: self.storage.clone(),
            chain_client: self.chain_client.clone(),
            wasm_codes: self.wasm_codes.clone(),
            block: job.env.block,
            tx_hash: job.env.tx_hash.clone(),
        };

        let extractor = self
            .registry
            .instantiate(&job.extractor, env)
            .ok_or_else(|| JobError::ExtractorNotFound(job.extractor.clone()))?;

        // Only the extraction call retries; the extractor persists its rows itself and the
        // upserts are idempotent, so a replay is a no-op for rows already written.
        let extract_timeout = self.config.extract_timeout;
        let events = retry(EXTRACT_BACKOFF, |_| {
            let extractor = &extractor;
            async move {
                match timeout(extract_timeout, extractor.extract(&job.data)).await {
                    Ok(result) => result.map_err(JobError::Extraction),
                    Err(_) => Err(JobError::Timeout(extract_timeout)),
                }
            }
        })
        .await?;

        // Register the highest block seen in the returned models and advance the high-water
        // marks monotonically.
        if let Some(block) = events
            .iter()
            .map(PersistedEvent::block)
            .max_by_key(|block| block.height)
        {
            self.storage
                .save_block(block)
                .await
                .map_err(JobError::SaveBlock)?;
        }

        // Fan out concurrently; either sink being down does not fail the job.
        let (indexed, dispatched) =
            join!(self.search.index(&events), self.webhooks.dispatch(&events));
        match indexed {
            Ok(count) => debug!(count; "search index updated"),
            Err(sink_error) => warn!(error:% = sink_error; "search indexing failed"),
        }
        match dispatched {
            Ok(count) => debug!(count; "webhooks dispatched"),
            Err(sink_error) => warn!(error:% = sink_error; "webhook dispatch failed"),
        }

        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        extractor::Extractor,
        sink::{NoopSearchSink, NoopWebhookSink},
        testing::{MockChainClient, MockStorage},
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use indexer_common::{
        domain::{Block, Extraction, WasmStateEvent, job::ExtractJobEnv},
        error::BoxError,
    };
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::{
        sync::oneshot,
        time::{Instant, sleep},
    };

    struct FailingExtractor {
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Extractor for FailingExtractor {
        async fn extract(&self, _data: &Value) -> Result<Vec<PersistedEvent>, ExtractError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ExtractError::InvalidData("boom".to_string()))
        }
    }

    struct HangingExtractor;

    #[async_trait]
    impl Extractor for HangingExtractor {
        async fn extract(&self, _data: &Value) -> Result<Vec<PersistedEvent>, ExtractError> {
            sleep(Duration::from_secs(3_600)).await;
            Ok(Vec::new())
        }
    }

    struct HappyExtractor {
        storage: MockStorage,
    }

    #[async_trait]
    impl Extractor for HappyExtractor {
        async fn extract(&self, _data: &Value) -> Result<Vec<PersistedEvent>, ExtractError> {
            let extraction = Extraction {
                address: "wasm1contract".to_string(),
                name: "proposal".to_string(),
                data: json!({ "id": 1 }),
                block_height: 100,
                block_time_unix_ms: 600_000,
                tx_hash: Some("AB12".to_string()),
            };
            self.storage.upsert_extraction(&extraction).await?;

            let state_event = WasmStateEvent {
                contract_address: "wasm1contract".to_string(),
                key: "proposal:1".to_string(),
                value_json: json!({ "status": "open" }),
                deleted: false,
                block_height: 105,
                block_time_unix_ms: 630_000,
            };
            self.storage.upsert_wasm_state_event(&state_event).await?;

            Ok(vec![
                PersistedEvent::Extraction(extraction),
                PersistedEvent::WasmStateEvent(state_event),
            ])
        }
    }

    #[derive(Clone, Copy, Default)]
    struct FailingSearchSink;

    impl SearchSink for FailingSearchSink {
        async fn index(&self, _events: &[PersistedEvent]) -> Result<u64, BoxError> {
            Err("search is down".into())
        }
    }

    fn job(extractor: &str) -> ExtractJob {
        ExtractJob {
            extractor: extractor.to_string(),
            data: json!({ "items": [] }),
            env: ExtractJobEnv {
                block: Block {
                    height: 100,
                    time_unix_ms: 600_000,
                },
                tx_hash: None,
            },
        }
    }

    fn worker<SS>(
        registry: ExtractorRegistry<MockStorage, MockChainClient>,
        storage: MockStorage,
        search: SS,
    ) -> Worker<MockStorage, MockChainClient, SS, NoopWebhookSink>
    where
        SS: SearchSink,
    {
        Worker {
            config: Config::default(),
            registry: Arc::new(registry),
            storage,
            chain_client: MockChainClient::default(),
            wasm_codes: Arc::new(Default::default()),
            search,
            webhooks: NoopWebhookSink,
            metrics: Arc::new(Metrics::new(Topic::Extract)),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_retry_then_fail() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut registry = ExtractorRegistry::new();
        registry.register("flaky", {
            let attempts = attempts.clone();
            move |_env| {
                Box::new(FailingExtractor {
                    attempts: attempts.clone(),
                })
            }
        });

        let storage = MockStorage::default();
        let worker = worker(registry, storage.clone(), NoopSearchSink);

        let started_at = Instant::now();
        let result = worker.process_job(&job("flaky")).await;

        assert_matches!(result, Err(JobError::Extraction(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Backoff of 100ms and 200ms between the three attempts.
        assert_eq!(started_at.elapsed(), Duration::from_millis(300));
        // No rows were added, the latest block never advanced.
        assert_eq!(storage.row_count(), 0);
        assert_eq!(storage.latest_block(), Block::default());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_extract_timeout() {
        let mut registry = ExtractorRegistry::new();
        registry.register("hanging", |_env| Box::new(HangingExtractor));

        let worker = worker(registry, MockStorage::default(), NoopSearchSink);

        let started_at = Instant::now();
        let result = worker.process_job(&job("hanging")).await;

        assert_matches!(result, Err(JobError::Timeout(_)));
        // Three 30s deadlines plus 100ms and 200ms backoff.
        assert_eq!(
            started_at.elapsed(),
            Duration::from_secs(90) + Duration::from_millis(300)
        );
    }

    #[tokio::test]
    async fn test_unknown_extractor_is_fatal() {
        let worker = worker(
            ExtractorRegistry::new(),
            MockStorage::default(),
            NoopSearchSink,
        );

        let (outcome_sender, outcome_receiver) = oneshot::channel();
        let delivery = Delivery::new(job("unknown"), 1, outcome_sender);
        worker.process_delivery(delivery).await;

        let outcome = outcome_receiver.await.unwrap();
        assert_eq!(
            outcome,
            indexer_common::domain::job::JobOutcome::Failed { fatal: true }
        );
    }

    #[tokio::test]
    async fn test_happy_path_advances_state_and_suppresses_sink_failures() {
        let storage = MockStorage::default();
        let mut registry = ExtractorRegistry::new();
        registry.register("happy", {
            let storage = storage.clone();
            move |_env| {
                Box::new(HappyExtractor {
                    storage: storage.clone(),
                })
            }
        });

        // The failing search sink must not fail the job.
        let worker = worker(registry, storage.clone(), FailingSearchSink);

        let event_count = worker.process_job(&job("happy")).await.unwrap();
        assert_eq!(event_count, 2);

        // The highest block among the returned models was registered.
        assert_eq!(storage.latest_block().height, 105);
        assert_eq!(storage.blocks(), vec![105]);

        // Replaying the job changes nothing.
        let rows_before = storage.row_count();
        worker.process_job(&job("happy")).await.unwrap();
        assert_eq!(storage.row_count(), rows_before);
        assert_eq!(storage.latest_block().height, 105);
    }
}
