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

use futures::Stream;
use indexer_common::{error::BoxError, retry::RetryableError};
use thiserror::Error;

/// Node abstraction over the remote CometBFT RPC and WebSocket endpoints.
#[trait_variant::make(Send)]
pub trait Node
where
    Self: Clone + Send + Sync + 'static,
{
    /// The node status: chain id and the earliest and latest block heights it serves.
    async fn status(&self) -> Result<NodeStatus, NodeError>;

    /// The latest block height known to the node.
    async fn height(&self) -> Result<u64, NodeError>;

    /// Fetch the block at the given height: header, per-TX execution results and decoded TXs.
    /// A TX which cannot be decoded yields an `Err` slot; the block itself still succeeds.
    async fn block(&self, height: u64) -> Result<BlockData, NodeError>;

    /// One WebSocket `NewBlock` subscription yielding block heights. The stream ends (possibly
    /// with a trailing `Err`) on disconnect; callers resubscribe with backoff.
    fn new_block_heights(&self) -> impl Stream<Item = Result<u64, NodeError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub chain_id: String,
    pub earliest_block_height: u64,
    pub latest_block_height: u64,
}

/// A block header reduced to what indexing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: u64,
    pub time_unix_ms: u64,
}

/// A fetched block with its TXs in original order. Decode failures are isolated per TX.
#[derive(Debug)]
pub struct BlockData {
    pub header: BlockHeader,
    pub txs: Vec<Result<TxData, TxError>>,
}

/// A decoded TX with its execution results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    pub index: u32,
    pub hash: String,
    pub code: u32,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub events: Vec<AbciEvent>,
    pub messages: Vec<TxMessage>,
}

impl TxData {
    /// Whether the TX executed successfully. Failed TXs do not mutate chain state.
    pub fn succeeded(&self) -> bool {
        self.code == 0
    }
}

/// A protobuf `Any` message from the TX body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMessage {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// An ABCI event emitted during TX execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbciEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl AbciEvent {
    /// The first attribute with the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A TX which could not be decoded or whose execution results are missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode TX {tx_index} at height {block_height}: {reason}")]
pub struct TxError {
    pub block_height: u64,
    pub tx_index: u32,
    pub tx_hash: Option<String>,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum NodeError {
    /// The requested height is not yet committed; retried without counting against the attempt
    /// budget.
    #[error("height {0} greater than the current blockchain height")]
    HeightTooHigh(u64),

    /// The remote endpoint is rate limiting; waits do not count against the attempt budget.
    #[error("rate limited")]
    RateLimited,

    #[error("node request failed: {0}")]
    Other(#[source] BoxError),
}

impl NodeError {
    pub fn other(error: impl Into<BoxError>) -> Self {
        Self::Other(error.into())
    }
}

impl RetryableError for NodeError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}
