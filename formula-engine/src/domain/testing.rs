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

//! In-memory event log mirroring the point-in-time read semantics of the Postgres storage,
//! used by the engine and formula tests.

use crate::domain::storage::{FeegrantRole, MatchPagination, Storage};
use indexer_common::domain::{
    BankStateEvent, Block, Contract, Extraction, FeegrantAllowance, WasmStateEvent,
    WasmStateEventTransformation,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::VecDeque, sync::Arc};

#[derive(Clone, Default)]
pub struct MockStorage {
    inner: Arc<Mutex<MockStorageInner>>,
}

#[derive(Default)]
struct MockStorageInner {
    state_events: Vec<WasmStateEvent>,
    transformations: Vec<WasmStateEventTransformation>,
    extractions: Vec<Extraction>,
    bank_state_events: Vec<BankStateEvent>,
    feegrant_allowances: Vec<FeegrantAllowance>,
    contracts: Vec<Contract>,
    blocks: Vec<Block>,
    query_results: VecDeque<Vec<Value>>,
}

fn time_of(height: u64) -> u64 {
    height * 6_000
}

impl MockStorage {
    pub fn with_state_event(self, contract_address: &str, key: &str, height: u64, value: Value) -> Self {
        self.inner.lock().state_events.push(WasmStateEvent {
            contract_address: contract_address.to_string(),
            key: key.to_string(),
            value_json: value,
            deleted: false,
            block_height: height,
            block_time_unix_ms: time_of(height),
        });
        self
    }

    pub fn with_deleted_state_event(self, contract_address: &str, key: &str, height: u64) -> Self {
        self.inner.lock().state_events.push(WasmStateEvent {
            contract_address: contract_address.to_string(),
            key: key.to_string(),
            value_json: Value::Null,
            deleted: true,
            block_height: height,
            block_time_unix_ms: time_of(height),
        });
        self
    }

    pub fn with_transformation(self, contract_address: &str, name: &str, height: u64, value: Value) -> Self {
        self.inner
            .lock()
            .transformations
            .push(WasmStateEventTransformation {
                contract_address: contract_address.to_string(),
                name: name.to_string(),
                value,
                block_height: height,
                block_time_unix_ms: time_of(height),
            });
        self
    }

    pub fn with_extraction(self, address: &str, name: &str, height: u64, data: Value) -> Self {
        self.inner.lock().extractions.push(Extraction {
            address: address.to_string(),
            name: name.to_string(),
            data,
            block_height: height,
            block_time_unix_ms: time_of(height),
            tx_hash: None,
        });
        self
    }

    pub fn with_balance(self, address: &str, denom: &str, height: u64, balance: &str) -> Self {
        self.inner.lock().bank_state_events.push(BankStateEvent {
            address: address.to_string(),
            denom: denom.to_string(),
            balance: balance.to_string(),
            block_height: height,
            block_time_unix_ms: time_of(height),
        });
        self
    }

    pub fn with_feegrant_allowance(
        self,
        granter: &str,
        grantee: &str,
        height: u64,
        active: bool,
        expiration_unix_ms: Option<u64>,
    ) -> Self {
        self.inner.lock().feegrant_allowances.push(FeegrantAllowance {
            granter: granter.to_string(),
            grantee: grantee.to_string(),
            block_height: height,
            block_time_unix_ms: time_of(height),
            active,
            allowance_data: Value::Null,
            parsed_amount: Some("1000".to_string()),
            parsed_denom: Some("ustake".to_string()),
            parsed_allowance_type: Some("basic".to_string()),
            parsed_expiration_unix_ms: expiration_unix_ms,
            tx_hash: None,
        });
        self
    }

    pub fn with_contract(self, contract: Contract) -> Self {
        self.inner.lock().contracts.push(contract);
        self
    }

    pub fn with_block(self, height: u64) -> Self {
        self.inner.lock().blocks.push(Block {
            height,
            time_unix_ms: time_of(height),
        });
        self
    }

    pub fn with_query_result(self, rows: Vec<Value>) -> Self {
        self.inner.lock().query_results.push_back(rows);
        self
    }
}

/// A single-`*` wildcard match.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => name == pattern,
    }
}

/// JSONB-style containment: objects contain all needle entries, arrays contain each needle
/// element, scalars compare equal.
fn value_contains(value: &Value, needle: &Value) -> bool {
    match (value, needle) {
        (Value::Object(value), Value::Object(needle)) => needle
            .iter()
            .all(|(key, needle)| value.get(key).is_some_and(|value| value_contains(value, needle))),
        (Value::Array(value), Value::Array(needle)) => needle
            .iter()
            .all(|needle| value.iter().any(|value| value_contains(value, needle))),
        (value, needle) => value == needle,
    }
}

fn paginate<T>(
    mut rows: Vec<T>,
    name_of: impl Fn(&T) -> String,
    pagination: &MatchPagination,
) -> Vec<T> {
    rows.retain(|row| {
        let name = name_of(row);
        pagination.gt.as_ref().is_none_or(|gt| name > *gt)
            && pagination.lt.as_ref().is_none_or(|lt| name < *lt)
    });

    let descending = pagination.gt.is_none() && pagination.lt.is_some();
    rows.sort_by_key(&name_of);
    if descending {
        rows.reverse();
    }

    if let Some(limit) = pagination.limit {
        rows.truncate(limit as usize);
    }
    rows
}

impl Storage for MockStorage {
    async fn latest_state_event(
        &self,
        contract_address: &str,
        key: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEvent>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .state_events
            .iter()
            .filter(|event| {
                event.contract_address == contract_address
                    && event.key == key
                    && event.block_height <= max_height
            })
            .max_by_key(|event| event.block_height)
            .cloned())
    }

    async fn latest_state_events_by_prefix(
        &self,
        contract_address: &str,
        key_prefix: &str,
        max_height: u64,
    ) -> Result<Vec<WasmStateEvent>, sqlx::Error> {
        let inner = self.inner.lock();
        let mut latest: Vec<WasmStateEvent> = Vec::new();

        for event in inner.state_events.iter().filter(|event| {
            event.contract_address == contract_address
                && event.key.starts_with(key_prefix)
                && event.block_height <= max_height
        }) {
            match latest.iter_mut().find(|kept| kept.key == event.key) {
                Some(kept) if kept.block_height < event.block_height => *kept = event.clone(),
                Some(_) => {}
                None => latest.push(event.clone()),
            }
        }

        latest.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(latest)
    }

    async fn first_state_event(
        &self,
        contract_address: &str,
        key: &str,
        value_match: Option<&Value>,
        max_height: u64,
    ) -> Result<Option<WasmStateEvent>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .state_events
            .iter()
            .filter(|event| {
                event.contract_address == contract_address
                    && event.key == key
                    && event.block_height <= max_height
                    && value_match.is_none_or(|needle| value_contains(&event.value_json, needle))
            })
            .min_by_key(|event| event.block_height)
            .cloned())
    }

    async fn latest_transformation(
        &self,
        contract_address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEventTransformation>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .transformations
            .iter()
            .filter(|transformation| {
                transformation.contract_address == contract_address
                    && transformation.name == name
                    && transformation.block_height <= max_height
            })
            .max_by_key(|transformation| transformation.block_height)
            .cloned())
    }

    async fn latest_transformations_matching(
        &self,
        contract_address: Option<&str>,
        name_pattern: &str,
        max_height: u64,
        pagination: &MatchPagination,
    ) -> Result<Vec<WasmStateEventTransformation>, sqlx::Error> {
        let inner = self.inner.lock();
        let mut latest: Vec<WasmStateEventTransformation> = Vec::new();

        for transformation in inner.transformations.iter().filter(|transformation| {
            contract_address.is_none_or(|address| transformation.contract_address == address)
                && matches_pattern(&transformation.name, name_pattern)
                && transformation.block_height <= max_height
        }) {
            match latest.iter_mut().find(|kept| {
                kept.contract_address == transformation.contract_address
                    && kept.name == transformation.name
            }) {
                Some(kept) if kept.block_height < transformation.block_height => {
                    *kept = transformation.clone();
                }
                Some(_) => {}
                None => latest.push(transformation.clone()),
            }
        }

        Ok(paginate(
            latest,
            |transformation| transformation.name.clone(),
            pagination,
        ))
    }

    async fn first_transformation(
        &self,
        contract_address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEventTransformation>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .transformations
            .iter()
            .filter(|transformation| {
                transformation.contract_address == contract_address
                    && transformation.name == name
                    && transformation.block_height <= max_height
            })
            .min_by_key(|transformation| transformation.block_height)
            .cloned())
    }

    async fn latest_extraction(
        &self,
        address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<Extraction>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .extractions
            .iter()
            .filter(|extraction| {
                extraction.address == address
                    && extraction.name == name
                    && extraction.block_height <= max_height
            })
            .max_by_key(|extraction| extraction.block_height)
            .cloned())
    }

    async fn latest_extractions_matching(
        &self,
        address: Option<&str>,
        name_pattern: &str,
        max_height: u64,
        pagination: &MatchPagination,
    ) -> Result<Vec<Extraction>, sqlx::Error> {
        let inner = self.inner.lock();
        let mut latest: Vec<Extraction> = Vec::new();

        for extraction in inner.extractions.iter().filter(|extraction| {
            address.is_none_or(|address| extraction.address == address)
                && matches_pattern(&extraction.name, name_pattern)
                && extraction.block_height <= max_height
        }) {
            match latest.iter_mut().find(|kept| {
                kept.address == extraction.address && kept.name == extraction.name
            }) {
                Some(kept) if kept.block_height < extraction.block_height => {
                    *kept = extraction.clone();
                }
                Some(_) => {}
                None => latest.push(extraction.clone()),
            }
        }

        Ok(paginate(latest, |extraction| extraction.name.clone(), pagination))
    }

    async fn first_extraction(
        &self,
        address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<Extraction>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .extractions
            .iter()
            .filter(|extraction| {
                extraction.address == address
                    && extraction.name == name
                    && extraction.block_height <= max_height
            })
            .min_by_key(|extraction| extraction.block_height)
            .cloned())
    }

    async fn get_contract(&self, address: &str) -> Result<Option<Contract>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .contracts
            .iter()
            .find(|contract| contract.address == address)
            .cloned())
    }

    async fn get_block_at_or_below(&self, height: u64) -> Result<Option<Block>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .blocks
            .iter()
            .filter(|block| block.height <= height)
            .max_by_key(|block| block.height)
            .copied())
    }

    async fn latest_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
        max_height: u64,
    ) -> Result<Option<FeegrantAllowance>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .feegrant_allowances
            .iter()
            .filter(|allowance| {
                allowance.granter == granter
                    && allowance.grantee == grantee
                    && allowance.block_height <= max_height
            })
            .max_by_key(|allowance| allowance.block_height)
            .cloned())
    }

    async fn latest_feegrant_allowances(
        &self,
        address: &str,
        role: FeegrantRole,
        max_height: u64,
    ) -> Result<Vec<FeegrantAllowance>, sqlx::Error> {
        let inner = self.inner.lock();
        let mut latest: Vec<FeegrantAllowance> = Vec::new();

        for allowance in inner.feegrant_allowances.iter().filter(|allowance| {
            let side = match role {
                FeegrantRole::Granted => &allowance.granter,
                FeegrantRole::Received => &allowance.grantee,
            };
            side == address && allowance.block_height <= max_height
        }) {
            match latest.iter_mut().find(|kept| {
                kept.granter == allowance.granter && kept.grantee == allowance.grantee
            }) {
                Some(kept) if kept.block_height < allowance.block_height => {
                    *kept = allowance.clone();
                }
                Some(_) => {}
                None => latest.push(allowance.clone()),
            }
        }

        latest.retain(|allowance| allowance.active);
        Ok(latest)
    }

    async fn latest_balances(
        &self,
        address: &str,
        max_height: u64,
    ) -> Result<Vec<BankStateEvent>, sqlx::Error> {
        let inner = self.inner.lock();
        let mut latest: Vec<BankStateEvent> = Vec::new();

        for event in inner.bank_state_events.iter().filter(|event| {
            event.address == address && event.block_height <= max_height
        }) {
            match latest.iter_mut().find(|kept| kept.denom == event.denom) {
                Some(kept) if kept.block_height < event.block_height => *kept = event.clone(),
                Some(_) => {}
                None => latest.push(event.clone()),
            }
        }

        latest.sort_by(|a, b| a.denom.cmp(&b.denom));
        Ok(latest)
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Value>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .query_results
            .pop_front()
            .unwrap_or_default())
    }
}
