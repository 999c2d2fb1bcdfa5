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

use crate::domain::chain_client::ChainClientError;
use async_trait::async_trait;
use indexer_common::{
    domain::{
        BankDenomBalance, BankStateEvent, Block, Contract, Extraction, FeegrantAllowance, TxHash,
        WasmCodeService, WasmStateEvent, WasmStateEventTransformation,
    },
    retry::RetryableError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// One persisted event-table row, returned by extractors for downstream fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistedEvent {
    WasmStateEvent(WasmStateEvent),
    Transformation(WasmStateEventTransformation),
    Extraction(Extraction),
    BankStateEvent(BankStateEvent),
    BankDenomBalance(BankDenomBalance),
    FeegrantAllowance(FeegrantAllowance),
    Contract(Contract),
}

impl PersistedEvent {
    /// The block this row belongs to.
    pub fn block(&self) -> Block {
        let (height, time_unix_ms) = match self {
            Self::WasmStateEvent(event) => (event.block_height, event.block_time_unix_ms),
            Self::Transformation(event) => (event.block_height, event.block_time_unix_ms),
            Self::Extraction(event) => (event.block_height, event.block_time_unix_ms),
            Self::BankStateEvent(event) => (event.block_height, event.block_time_unix_ms),
            Self::BankDenomBalance(event) => (event.block_height, event.block_time_unix_ms),
            Self::FeegrantAllowance(event) => (event.block_height, event.block_time_unix_ms),
            Self::Contract(event) => (
                event.instantiated_at_block_height,
                event.instantiated_at_block_time_unix_ms,
            ),
        };

        Block {
            height,
            time_unix_ms,
        }
    }
}

/// The per-job environment an extractor is instantiated with.
#[derive(Debug, Clone)]
pub struct ExtractorEnv<S, C> {
    pub storage: S,
    pub chain_client: C,
    pub wasm_codes: Arc<WasmCodeService>,
    pub block: Block,
    pub tx_hash: Option<TxHash>,
}

/// A named module which consumes job data and persists typed event rows. Persistence is part of
/// `extract`; all writes are idempotent per-key upserts, so a retried job is a no-op for rows
/// already written.
#[async_trait]
pub trait Extractor
where
    Self: Send + Sync,
{
    async fn extract(&self, data: &Value) -> Result<Vec<PersistedEvent>, ExtractError>;
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid job data: {0}")]
    InvalidData(String),

    #[error("cannot persist events")]
    Storage(#[from] sqlx::Error),

    #[error("chain query failed")]
    ChainQuery(#[from] ChainClientError),
}

impl RetryableError for ExtractError {}

/// The job-data shape produced by the trace exporter: deduped items in arrival order.
#[derive(Debug, Deserialize)]
pub struct JobItems {
    pub items: Vec<JobItem>,
}

#[derive(Debug, Deserialize)]
pub struct JobItem {
    pub id: String,
    pub value: Value,

    #[serde(default)]
    pub tx_hash: Option<TxHash>,
}

impl JobItems {
    pub fn from_data(data: &Value) -> Result<Self, ExtractError> {
        serde_json::from_value(data.clone())
            .map_err(|error| ExtractError::InvalidData(error.to_string()))
    }
}
