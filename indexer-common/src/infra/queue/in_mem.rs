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

use crate::{
    domain::job::{Delivery, ExtractJob, JobOutcome, JobQueue, Topic},
    retry::Backoff,
};
use async_stream::stream;
use futures::Stream;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    time::sleep,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub redelivery_base_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub redelivery_max_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            redelivery_base_delay: Duration::from_secs(1),
            redelivery_max_delay: Duration::from_secs(30),
        }
    }
}

/// In-process [JobQueue]: at-least-once delivery with delayed redelivery on failure and a
/// dead-letter store once the attempt budget is exhausted. Used by the standalone binary and
/// tests; networked backends live behind the same trait.
#[derive(Clone)]
pub struct InMemJobQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    extract: TopicChannel,
    extract_background: TopicChannel,
}

struct TopicChannel {
    sender: mpsc::UnboundedSender<QueuedJob>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueuedJob>>>,
    dead_letters: Mutex<Vec<ExtractJob>>,
}

#[derive(Debug)]
struct QueuedJob {
    job: ExtractJob,
    attempt: u32,
}

impl TopicChannel {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            dead_letters: Mutex::new(Vec::new()),
        }
    }
}

impl Inner {
    fn channel(&self, topic: Topic) -> &TopicChannel {
        match topic {
            Topic::Extract => &self.extract,
            Topic::ExtractBackground => &self.extract_background,
        }
    }
}

impl InMemJobQueue {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                extract: TopicChannel::new(),
                extract_background: TopicChannel::new(),
            }),
        }
    }

    /// The jobs which exhausted their attempt budget or failed fatally.
    pub fn dead_letters(&self, topic: Topic) -> Vec<ExtractJob> {
        self.inner.channel(topic).dead_letters.lock().clone()
    }
}

impl Default for InMemJobQueue {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue for topic {0} is closed")]
    Closed(&'static str),
}

impl JobQueue for InMemJobQueue {
    type Error = Error;

    async fn enqueue(
        &self,
        topic: Topic,
        batch_height: u64,
        jobs: Vec<ExtractJob>,
    ) -> Result<(), Self::Error> {
        let channel = self.inner.channel(topic);
        let len = jobs.len();

        for job in jobs {
            channel
                .sender
                .send(QueuedJob { job, attempt: 1 })
                .map_err(|_| Error::Closed(topic.as_str()))?;
        }

        debug!(topic:% = topic.as_str(), batch_height, jobs = len; "jobs enqueued");

        Ok(())
    }

    fn deliveries(&self, topic: Topic) -> impl Stream<Item = Delivery> + Send {
        let mut receiver = self
            .inner
            .channel(topic)
            .receiver
            .lock()
            .take()
            .expect("deliveries is consumed at most once per topic");
        let inner = self.inner.clone();

        stream! {
            while let Some(QueuedJob { job, attempt }) = receiver.recv().await {
                let (outcome_sender, outcome_receiver) = oneshot::channel();
                tokio::spawn(settle(inner.clone(), topic, job.clone(), attempt, outcome_receiver));
                yield Delivery::new(job, attempt, outcome_sender);
            }
        }
    }
}

/// Await the consumer's outcome for one delivery and either redeliver with backoff or move the
/// job to the dead-letter store.
async fn settle(
    inner: Arc<Inner>,
    topic: Topic,
    job: ExtractJob,
    attempt: u32,
    outcome: oneshot::Receiver<JobOutcome>,
) {
    // A dropped sender means the consumer vanished; treat as non-fatal failure.
    let outcome = outcome.await.unwrap_or(JobOutcome::Failed { fatal: false });

    let fatal = match outcome {
        JobOutcome::Done => return,
        JobOutcome::Failed { fatal } => fatal,
    };

    let config = &inner.config;
    if fatal || attempt >= config.max_attempts {
        warn!(
            topic:% = topic.as_str(),
            extractor:% = job.extractor,
            attempt,
            fatal;
            "job dead-lettered"
        );
        inner.channel(topic).dead_letters.lock().push(job);
        return;
    }

    let backoff = Backoff::new(config.max_attempts, config.redelivery_base_delay)
        .with_max_delay(config.redelivery_max_delay);
    sleep(backoff.delay(attempt)).await;

    let redelivered = inner.channel(topic).sender.send(QueuedJob {
        job,
        attempt: attempt + 1,
    });
    if redelivered.is_err() {
        warn!(topic:% = topic.as_str(); "cannot redeliver job, queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Block, job::ExtractJobEnv};
    use futures::StreamExt;
    use std::pin::pin;

    fn job(extractor: &str) -> ExtractJob {
        ExtractJob {
            extractor: extractor.to_string(),
            data: serde_json::json!({ "items": [] }),
            env: ExtractJobEnv {
                block: Block {
                    height: 100,
                    time_unix_ms: 1_700_000_000_000,
                },
                tx_hash: None,
            },
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_ack() {
        let queue = InMemJobQueue::default();

        queue
            .enqueue(Topic::Extract, 100, vec![job("wasm")])
            .await
            .unwrap();

        let mut deliveries = pin!(queue.deliveries(Topic::Extract));
        let delivery = deliveries.next().await.unwrap();
        assert_eq!(delivery.attempt(), 1);
        assert_eq!(delivery.job().extractor, "wasm");
        delivery.ack();

        assert!(queue.dead_letters(Topic::Extract).is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_redelivery_then_dead_letter() {
        let queue = InMemJobQueue::new(Config {
            max_attempts: 3,
            ..Default::default()
        });

        queue
            .enqueue(Topic::Extract, 100, vec![job("bank")])
            .await
            .unwrap();

        let mut deliveries = pin!(queue.deliveries(Topic::Extract));
        for attempt in 1..=3 {
            let delivery = deliveries.next().await.unwrap();
            assert_eq!(delivery.attempt(), attempt);
            delivery.fail(false);
        }

        // Let the final settle task run.
        tokio::task::yield_now().await;
        assert_eq!(queue.dead_letters(Topic::Extract), vec![job("bank")]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_fatal_failure_skips_retries() {
        let queue = InMemJobQueue::default();

        queue
            .enqueue(Topic::ExtractBackground, 100, vec![job("unknown")])
            .await
            .unwrap();

        let mut deliveries = pin!(queue.deliveries(Topic::ExtractBackground));
        deliveries.next().await.unwrap().fail(true);

        tokio::task::yield_now().await;
        assert_eq!(
            queue.dead_letters(Topic::ExtractBackground),
            vec![job("unknown")]
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_dropped_delivery_is_redelivered() {
        let queue = InMemJobQueue::default();

        queue
            .enqueue(Topic::Extract, 100, vec![job("feegrant")])
            .await
            .unwrap();

        let mut deliveries = pin!(queue.deliveries(Topic::Extract));
        drop(deliveries.next().await.unwrap());

        let delivery = deliveries.next().await.unwrap();
        assert_eq!(delivery.attempt(), 2);
        delivery.ack();
    }
}
