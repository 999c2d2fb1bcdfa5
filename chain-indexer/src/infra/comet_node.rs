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

use crate::domain::node::{
    AbciEvent, BlockData, BlockHeader, Node, NodeError, NodeStatus, TxData, TxError, TxMessage,
};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use log::debug;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tendermint::{abci::types::ExecTxResult, block::Height};
use tendermint_rpc::{
    Client, HttpClient, SubscriptionClient, WebSocketClient,
    event::EventData,
    query::{EventType, Query},
};
use tokio::task::{self, JoinHandle};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The HTTP RPC endpoint, e.g. `http://localhost:26657`.
    pub rpc_url: String,

    /// The WebSocket endpoint, e.g. `ws://localhost:26657/websocket`.
    pub ws_url: String,
}

/// A [Node] implementation for a CometBFT node, using the HTTP RPC endpoints `status`,
/// `abci_info`, `block` and `block_results`, and one WebSocket `NewBlock` subscription per
/// [Node::new_block_heights] stream.
#[derive(Clone)]
pub struct CometNode {
    http_client: HttpClient,
    ws_url: String,
}

impl CometNode {
    /// Create a new [CometNode] with the given [Config].
    pub fn new(config: Config) -> Result<Self, NodeError> {
        let http_client = HttpClient::new(config.rpc_url.as_str()).map_err(NodeError::other)?;

        Ok(Self {
            http_client,
            ws_url: config.ws_url,
        })
    }
}

impl Node for CometNode {
    async fn status(&self) -> Result<NodeStatus, NodeError> {
        let status = self
            .http_client
            .status()
            .await
            .map_err(|error| map_rpc_error(None, error))?;

        Ok(NodeStatus {
            chain_id: status.node_info.network.to_string(),
            earliest_block_height: status.sync_info.earliest_block_height.value(),
            latest_block_height: status.sync_info.latest_block_height.value(),
        })
    }

    async fn height(&self) -> Result<u64, NodeError> {
        let info = self
            .http_client
            .abci_info()
            .await
            .map_err(|error| map_rpc_error(None, error))?;

        Ok(info.last_block_height.value())
    }

    async fn block(&self, height: u64) -> Result<BlockData, NodeError> {
        let height_value = height;
        let height = Height::try_from(height).map_err(NodeError::other)?;

        let block = self
            .http_client
            .block(height)
            .await
            .map_err(|error| map_rpc_error(Some(height_value), error))?;
        let block_results = self
            .http_client
            .block_results(height)
            .await
            .map_err(|error| map_rpc_error(Some(height_value), error))?;

        let header = &block.block.header;
        let time_unix_ms = (header.time.unix_timestamp_nanos() / 1_000_000) as u64;
        let header = BlockHeader {
            chain_id: header.chain_id.to_string(),
            height: height_value,
            time_unix_ms,
        };

        let txs_results = block_results.txs_results.unwrap_or_default();
        let txs = block
            .block
            .data
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                decode_tx(height_value, index as u32, raw, txs_results.get(index))
            })
            .collect();

        debug!(height = height_value; "block fetched");

        Ok(BlockData { header, txs })
    }

    fn new_block_heights(&self) -> impl Stream<Item = Result<u64, NodeError>> + Send {
        let ws_url = self.ws_url.clone();

        try_stream! {
            let (client, driver) = WebSocketClient::new(ws_url.as_str())
                .await
                .map_err(|error| map_rpc_error(None, error))?;
            let _driver = AbortOnDrop(task::spawn(driver.run()));

            let mut subscription = client
                .subscribe(Query::from(EventType::NewBlock))
                .await
                .map_err(|error| map_rpc_error(None, error))?;

            while let Some(event) = subscription.next().await {
                let event = event.map_err(|error| map_rpc_error(None, error))?;

                match event.data {
                    EventData::NewBlock {
                        block: Some(block), ..
                    } => yield block.header.height.value(),

                    EventData::LegacyNewBlock {
                        block: Some(block), ..
                    } => yield block.header.height.value(),

                    _ => {}
                }
            }
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn decode_tx(
    block_height: u64,
    index: u32,
    raw: &[u8],
    result: Option<&ExecTxResult>,
) -> Result<TxData, TxError> {
    let hash = const_hex::encode_upper(Sha256::digest(raw));

    let result = result.ok_or_else(|| TxError {
        block_height,
        tx_index: index,
        tx_hash: Some(hash.clone()),
        reason: "missing TX execution results".to_string(),
    })?;

    let tx = cosmrs::Tx::from_bytes(raw).map_err(|error| TxError {
        block_height,
        tx_index: index,
        tx_hash: Some(hash.clone()),
        reason: format!("cannot decode TX: {error}"),
    })?;

    let messages = tx
        .body
        .messages
        .into_iter()
        .map(|message| TxMessage {
            type_url: message.type_url,
            value: message.value,
        })
        .collect();

    let events = result
        .events
        .iter()
        .map(|event| AbciEvent {
            kind: event.kind.clone(),
            attributes: event
                .attributes
                .iter()
                .filter_map(|attribute| {
                    let key = attribute.key_str().ok()?;
                    let value = attribute.value_str().ok()?;
                    Some((key.to_string(), value.to_string()))
                })
                .collect(),
        })
        .collect();

    Ok(TxData {
        index,
        hash,
        code: result.code.value(),
        gas_wanted: result.gas_wanted,
        gas_used: result.gas_used,
        events,
        messages,
    })
}

/// Classify RPC errors: "height too high" responses mean the node has not committed the height
/// yet, rate limiting must not burn the attempt budget, everything else is opaque.
fn map_rpc_error(height: Option<u64>, error: tendermint_rpc::Error) -> NodeError {
    let message = error.to_string().to_lowercase();

    if let Some(height) = height
        && (message.contains("must be less than or equal to the current blockchain height")
            || message.contains("greater than the current blockchain height"))
    {
        return NodeError::HeightTooHigh(height);
    }

    if message.contains("too many requests") || message.contains("429") {
        return NodeError::RateLimited;
    }

    NodeError::other(error)
}
