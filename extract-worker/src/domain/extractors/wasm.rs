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
    chain_client::ChainClient,
    extractor::{ExtractError, Extractor, ExtractorEnv, JobItems, PersistedEvent},
    extractors::{str_field, u64_field},
    storage::Storage,
};
use async_trait::async_trait;
use indexer_common::domain::{Contract, WasmStateEvent, WasmStateEventTransformation};
use log::warn;
use serde_json::Value;

/// The raw state key whose value doubles as the `info` transformation.
const CONTRACT_INFO_KEY: &str = "contract_info";

/// Persists contract instantiations and per-key contract-state writes, deriving the `info`
/// transformation from `contract_info` writes.
pub struct WasmExtractor<S, C> {
    env: ExtractorEnv<S, C>,
}

impl<S, C> WasmExtractor<S, C> {
    pub fn new(env: ExtractorEnv<S, C>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl<S, C> Extractor for WasmExtractor<S, C>
where
    S: Storage,
    C: ChainClient,
{
    async fn extract(&self, data: &Value) -> Result<Vec<PersistedEvent>, ExtractError> {
        let JobItems { items } = JobItems::from_data(data)?;
        let block = self.env.block;
        let mut events = Vec::with_capacity(items.len());

        for item in items {
            match item.value["type"].as_str() {
                Some("instantiate") => {
                    let contract_address = str_field(&item.value, "contract_address")?;
                    let code_id = u64_field(&item.value, "code_id")?;

                    // Enrich with instantiation facts the event does not carry; a failed query
                    // leaves them empty rather than failing the job.
                    let info = match self.env.chain_client.contract_info(contract_address).await {
                        Ok(info) => info,
                        Err(error) => {
                            warn!(error:%, contract_address; "cannot query contract info");
                            None
                        }
                    };

                    let contract = Contract {
                        address: contract_address.to_string(),
                        code_id: info.as_ref().map(|info| info.code_id).unwrap_or(code_id),
                        admin: info.as_ref().and_then(|info| info.admin.clone()),
                        creator: info.as_ref().and_then(|info| info.creator.clone()),
                        label: info.as_ref().and_then(|info| info.label.clone()),
                        instantiated_at_block_height: block.height,
                        instantiated_at_block_time_unix_ms: block.time_unix_ms,
                        tx_hash: item.tx_hash,
                    };
                    self.env.storage.upsert_contract(&contract).await?;
                    events.push(PersistedEvent::Contract(contract));
                }

                Some("state") => {
                    let contract_address = str_field(&item.value, "contract_address")?;
                    let key = str_field(&item.value, "key")?;
                    let raw_value = str_field(&item.value, "value")?;

                    let value_json = serde_json::from_str(raw_value)
                        .unwrap_or_else(|_| Value::String(raw_value.to_string()));

                    let event = WasmStateEvent {
                        contract_address: contract_address.to_string(),
                        key: key.to_string(),
                        value_json: value_json.clone(),
                        deleted: raw_value.is_empty(),
                        block_height: block.height,
                        block_time_unix_ms: block.time_unix_ms,
                    };
                    self.env.storage.upsert_wasm_state_event(&event).await?;
                    events.push(PersistedEvent::WasmStateEvent(event));

                    if key == CONTRACT_INFO_KEY {
                        let transformation = WasmStateEventTransformation {
                            contract_address: contract_address.to_string(),
                            name: "info".to_string(),
                            value: value_json,
                            block_height: block.height,
                            block_time_unix_ms: block.time_unix_ms,
                        };
                        self.env
                            .storage
                            .upsert_transformation(&transformation)
                            .await?;
                        events.push(PersistedEvent::Transformation(transformation));
                    }
                }

                other => {
                    return Err(ExtractError::InvalidData(format!(
                        "unknown wasm item type {other:?}"
                    )));
                }
            }
        }

        Ok(events)
    }
}
