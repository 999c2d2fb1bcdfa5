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
    extractors::str_field,
    storage::Storage,
};
use async_trait::async_trait;
use indexer_common::domain::{BankDenomBalance, BankStateEvent};
use serde_json::Value;

/// The allow-list key holding the code ids whose contracts get their balances retained.
pub const BALANCE_CODE_IDS_KEY: &str = "bank-balances";

/// Persists per-denom balance snapshots for touched addresses, retained only for contracts
/// whose code id is on the balance allow-list, plus the guarded latest-balance projection.
pub struct BankExtractor<S, C> {
    env: ExtractorEnv<S, C>,
}

impl<S, C> BankExtractor<S, C> {
    pub fn new(env: ExtractorEnv<S, C>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl<S, C> Extractor for BankExtractor<S, C>
where
    S: Storage,
    C: ChainClient,
{
    async fn extract(&self, data: &Value) -> Result<Vec<PersistedEvent>, ExtractError> {
        let JobItems { items } = JobItems::from_data(data)?;
        let block = self.env.block;
        let mut events = Vec::new();

        for item in items {
            let address = str_field(&item.value, "address")?;
            let denom = str_field(&item.value, "denom")?;

            let Some(code_id) = self.env.storage.get_contract_code_id(address).await? else {
                continue;
            };
            if !self.env.wasm_codes.matches(code_id, &[BALANCE_CODE_IDS_KEY]) {
                continue;
            }

            let balance = self
                .env
                .chain_client
                .balance(address, denom, block.height)
                .await?;

            let event = BankStateEvent {
                address: address.to_string(),
                denom: denom.to_string(),
                balance: balance.clone(),
                block_height: block.height,
                block_time_unix_ms: block.time_unix_ms,
            };
            self.env.storage.upsert_bank_state_event(&event).await?;
            events.push(PersistedEvent::BankStateEvent(event));

            let projection = BankDenomBalance {
                address: address.to_string(),
                denom: denom.to_string(),
                balance,
                block_height: block.height,
                block_time_unix_ms: block.time_unix_ms,
            };
            self.env
                .storage
                .upsert_bank_denom_balance(&projection)
                .await?;
            events.push(PersistedEvent::BankDenomBalance(projection));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{MockChainClient, MockStorage};
    use indexer_common::domain::{Block, Contract, WasmCodeService};
    use serde_json::json;
    use std::sync::Arc;

    fn contract(address: &str, code_id: u64) -> Contract {
        Contract {
            address: address.to_string(),
            code_id,
            admin: None,
            creator: None,
            label: None,
            instantiated_at_block_height: 1,
            instantiated_at_block_time_unix_ms: 6_000,
            tx_hash: None,
        }
    }

    fn extractor(
        storage: MockStorage,
        chain_client: MockChainClient,
        block: Block,
    ) -> BankExtractor<MockStorage, MockChainClient> {
        BankExtractor::new(ExtractorEnv {
            storage,
            chain_client,
            wasm_codes: Arc::new(WasmCodeService::new([(
                BALANCE_CODE_IDS_KEY.to_string(),
                vec![7],
            )])),
            block,
            tx_hash: None,
        })
    }

    #[tokio::test]
    async fn test_allow_list_filtering() {
        let storage = MockStorage::default()
            .with_contract(contract("wasm1dao", 7))
            .with_contract(contract("wasm1other", 8));
        let chain_client = MockChainClient::default()
            .with_balance("wasm1dao", "ustake", "1000")
            .with_balance("wasm1other", "ustake", "2000");

        let extractor = extractor(
            storage.clone(),
            chain_client,
            Block {
                height: 100,
                time_unix_ms: 600_000,
            },
        );

        let data = json!({
            "items": [
                { "id": "wasm1dao:ustake", "value": { "address": "wasm1dao", "denom": "ustake" } },
                { "id": "wasm1other:ustake", "value": { "address": "wasm1other", "denom": "ustake" } },
                { "id": "wasm1eoa:ustake", "value": { "address": "wasm1eoa", "denom": "ustake" } },
            ],
        });

        let events = extractor.extract(&data).await.unwrap();

        // Only the allow-listed contract is retained.
        assert_eq!(events.len(), 2);
        let snapshots = storage.bank_state_events();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].address, "wasm1dao");
        assert_eq!(snapshots[0].balance, "1000");
    }

    #[tokio::test]
    async fn test_projection_never_regresses() {
        let storage = MockStorage::default().with_contract(contract("wasm1dao", 7));
        let chain_client = MockChainClient::default().with_balance("wasm1dao", "ustake", "1000");
        let data = json!({
            "items": [
                { "id": "wasm1dao:ustake", "value": { "address": "wasm1dao", "denom": "ustake" } },
            ],
        });

        // A job at height 200 first, then a laggy job at height 100.
        extractor(
            storage.clone(),
            chain_client.clone(),
            Block {
                height: 200,
                time_unix_ms: 1_200_000,
            },
        )
        .extract(&data)
        .await
        .unwrap();

        extractor(
            storage.clone(),
            chain_client,
            Block {
                height: 100,
                time_unix_ms: 600_000,
            },
        )
        .extract(&data)
        .await
        .unwrap();

        let projections = storage.bank_denom_balances();
        assert_eq!(projections.len(), 1);
        assert_eq!(projections[0].block_height, 200);

        // Both snapshots are retained in the append-only log.
        assert_eq!(storage.bank_state_events().len(), 2);
    }
}
