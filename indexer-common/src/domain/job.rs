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

use crate::domain::{Block, TxHash};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use tokio::sync::oneshot;

/// The queue topics published by the exporter. Background handlers get their own worker pool so
/// they cannot starve the critical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Extract,
    ExtractBackground,
}

impl Topic {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::ExtractBackground => "extract-background",
        }
    }
}

/// One unit of extract work: run the named extractor over `data` in the given environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractJob {
    pub extractor: String,
    pub data: Value,
    pub env: ExtractJobEnv,
}

/// The per-job environment handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractJobEnv {
    pub block: Block,
    pub tx_hash: Option<TxHash>,
}

/// Terminal outcome reported back to the queue for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    /// Fatal failures go straight to the dead-letter store without retrying.
    Failed {
        fatal: bool,
    },
}

/// One at-least-once delivery of an [ExtractJob]. Dropping a delivery without settling it counts
/// as a non-fatal failure, so a crashed consumer never loses a job.
#[derive(Debug)]
pub struct Delivery {
    job: ExtractJob,
    attempt: u32,
    outcome: Option<oneshot::Sender<JobOutcome>>,
}

impl Delivery {
    pub fn new(job: ExtractJob, attempt: u32, outcome: oneshot::Sender<JobOutcome>) -> Self {
        Self {
            job,
            attempt,
            outcome: Some(outcome),
        }
    }

    pub fn job(&self) -> &ExtractJob {
        &self.job
    }

    /// The 1-based delivery attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn ack(mut self) {
        self.settle(JobOutcome::Done);
    }

    pub fn fail(mut self, fatal: bool) {
        self.settle(JobOutcome::Failed { fatal });
    }

    fn settle(&mut self, outcome: JobOutcome) {
        if let Some(sender) = self.outcome.take() {
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.settle(JobOutcome::Failed { fatal: false });
    }
}

/// Job queue abstraction: at-least-once delivery, per-job bounded retry with exponential
/// backoff, dead-letter on exhaustion.
#[trait_variant::make(Send)]
pub trait JobQueue
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Enqueue a batch of jobs belonging to the given block height. The height is a logical
    /// batch key for downstream consumers; it does not affect delivery order.
    async fn enqueue(
        &self,
        topic: Topic,
        batch_height: u64,
        jobs: Vec<ExtractJob>,
    ) -> Result<(), Self::Error>;

    /// The stream of deliveries for the given topic. Must be consumed by a single consumer.
    fn deliveries(&self, topic: Topic) -> impl Stream<Item = Delivery> + Send;
}
