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

//! In-memory mocks mirroring the Postgres upsert semantics, shared by the extractor and
//! worker tests.

use crate::domain::{
    chain_client::{ChainClient, ChainClientError, ContractInfo},
    storage::Storage,
};
use indexer_common::domain::{
    BankDenomBalance, BankStateEvent, Block, Contract, Extraction, FeegrantAllowance,
    WasmStateEvent, WasmStateEventTransformation,
};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

#[derive(Clone, Default)]
pub struct MockStorage {
    inner: Arc<Mutex<MockStorageInner>>,
}

#[derive(Default)]
struct MockStorageInner {
    wasm_state_events: BTreeMap<(String, String, u64), WasmStateEvent>,
    transformations: BTreeMap<(String, String, u64), WasmStateEventTransformation>,
    extractions: BTreeMap<(String, String, u64), Extraction>,
    bank_state_events: BTreeMap<(String, String, u64), BankStateEvent>,
    bank_denom_balances: BTreeMap<(String, String), BankDenomBalance>,
    feegrant_allowances: BTreeMap<(String, String, u64), FeegrantAllowance>,
    contracts: BTreeMap<String, Contract>,
    blocks: BTreeMap<u64, u64>,
    latest_block: Block,
}

impl MockStorage {
    pub fn wasm_state_events(&self) -> Vec<WasmStateEvent> {
        self.inner.lock().wasm_state_events.values().cloned().collect()
    }

    pub fn transformations(&self) -> Vec<WasmStateEventTransformation> {
        self.inner.lock().transformations.values().cloned().collect()
    }

    pub fn extractions(&self) -> Vec<Extraction> {
        self.inner.lock().extractions.values().cloned().collect()
    }

    pub fn bank_state_events(&self) -> Vec<BankStateEvent> {
        self.inner.lock().bank_state_events.values().cloned().collect()
    }

    pub fn bank_denom_balances(&self) -> Vec<BankDenomBalance> {
        self.inner.lock().bank_denom_balances.values().cloned().collect()
    }

    pub fn feegrant_allowances(&self) -> Vec<FeegrantAllowance> {
        self.inner.lock().feegrant_allowances.values().cloned().collect()
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.inner.lock().contracts.values().cloned().collect()
    }

    pub fn blocks(&self) -> Vec<u64> {
        self.inner.lock().blocks.keys().copied().collect()
    }

    pub fn latest_block(&self) -> Block {
        self.inner.lock().latest_block
    }

    pub fn with_contract(self, contract: Contract) -> Self {
        self.inner
            .lock()
            .contracts
            .insert(contract.address.clone(), contract);
        self
    }

    /// The total number of stored event rows across all tables.
    pub fn row_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.wasm_state_events.len()
            + inner.transformations.len()
            + inner.extractions.len()
            + inner.bank_state_events.len()
            + inner.bank_denom_balances.len()
            + inner.feegrant_allowances.len()
            + inner.contracts.len()
    }
}

impl Storage for MockStorage {
    async fn upsert_wasm_state_event(&self, event: &WasmStateEvent) -> Result<(), sqlx::Error> {
        let key = (
            event.contract_address.clone(),
            event.key.clone(),
            event.block_height,
        );
        self.inner.lock().wasm_state_events.insert(key, event.clone());
        Ok(())
    }

    async fn upsert_transformation(
        &self,
        transformation: &WasmStateEventTransformation,
    ) -> Result<(), sqlx::Error> {
        let key = (
            transformation.contract_address.clone(),
            transformation.name.clone(),
            transformation.block_height,
        );
        self.inner
            .lock()
            .transformations
            .insert(key, transformation.clone());
        Ok(())
    }

    async fn upsert_extraction(&self, extraction: &Extraction) -> Result<(), sqlx::Error> {
        let key = (
            extraction.address.clone(),
            extraction.name.clone(),
            extraction.block_height,
        );
        self.inner.lock().extractions.insert(key, extraction.clone());
        Ok(())
    }

    async fn upsert_bank_state_event(&self, event: &BankStateEvent) -> Result<(), sqlx::Error> {
        let key = (event.address.clone(), event.denom.clone(), event.block_height);
        self.inner.lock().bank_state_events.insert(key, event.clone());
        Ok(())
    }

    async fn upsert_bank_denom_balance(
        &self,
        balance: &BankDenomBalance,
    ) -> Result<(), sqlx::Error> {
        let key = (balance.address.clone(), balance.denom.clone());
        let mut inner = self.inner.lock();
        let stored = inner.bank_denom_balances.get(&key);
        if stored.is_none_or(|stored| stored.block_height < balance.block_height) {
            inner.bank_denom_balances.insert(key, balance.clone());
        }
        Ok(())
    }

    async fn upsert_feegrant_allowance(
        &self,
        allowance: &FeegrantAllowance,
    ) -> Result<(), sqlx::Error> {
        let key = (
            allowance.granter.clone(),
            allowance.grantee.clone(),
            allowance.block_height,
        );
        self.inner
            .lock()
            .feegrant_allowances
            .insert(key, allowance.clone());
        Ok(())
    }

    async fn upsert_contract(&self, contract: &Contract) -> Result<(), sqlx::Error> {
        self.inner
            .lock()
            .contracts
            .entry(contract.address.clone())
            .or_insert_with(|| contract.clone());
        Ok(())
    }

    async fn get_contract_code_id(&self, address: &str) -> Result<Option<u64>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .contracts
            .get(address)
            .map(|contract| contract.code_id))
    }

    async fn save_block(&self, block: Block) -> Result<(), sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.blocks.entry(block.height).or_insert(block.time_unix_ms);
        if block.height > inner.latest_block.height {
            inner.latest_block = block;
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockChainClient {
    contracts: Arc<Mutex<HashMap<String, ContractInfo>>>,
    balances: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl MockChainClient {
    pub fn with_contract(
        self,
        address: &str,
        code_id: u64,
        admin: Option<&str>,
        creator: Option<&str>,
        label: Option<&str>,
    ) -> Self {
        self.contracts.lock().insert(
            address.to_string(),
            ContractInfo {
                code_id,
                admin: admin.map(str::to_string),
                creator: creator.map(str::to_string),
                label: label.map(str::to_string),
            },
        );
        self
    }

    pub fn with_balance(self, address: &str, denom: &str, amount: &str) -> Self {
        self.balances
            .lock()
            .insert((address.to_string(), denom.to_string()), amount.to_string());
        self
    }
}

impl ChainClient for MockChainClient {
    async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, ChainClientError> {
        Ok(self.contracts.lock().get(address).cloned())
    }

    async fn balance(
        &self,
        address: &str,
        denom: &str,
        _height: u64,
    ) -> Result<String, ChainClientError> {
        Ok(self
            .balances
            .lock()
            .get(&(address.to_string(), denom.to_string()))
            .cloned()
            .unwrap_or_else(|| "0".to_string()))
    }
}
