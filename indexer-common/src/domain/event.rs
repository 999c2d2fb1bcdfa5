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

use crate::domain::{Address, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw contract-state write (or delete) at a block height. `(contract_address, key,
/// block_height)` is unique; duplicate writes within a block coalesce to the last value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmStateEvent {
    pub contract_address: Address,
    pub key: String,
    pub value_json: Value,
    pub deleted: bool,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

/// A derived, named projection of one or more raw state events, named by the producing
/// extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmStateEventTransformation {
    pub contract_address: Address,
    pub name: String,
    pub value: Value,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

/// A TX-derived record emitted directly by an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub address: Address,
    pub name: String,
    pub data: Value,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
    pub tx_hash: Option<TxHash>,
}

/// A per-denom balance snapshot. Balances are decimal strings; they must never round-trip
/// through a float.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankStateEvent {
    pub address: Address,
    pub denom: String,
    pub balance: String,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

/// The latest-balance projection per `(address, denom)`. Its stored block height never goes
/// backward; out-of-order writers are rejected at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDenomBalance {
    pub address: Address,
    pub denom: String,
    pub balance: String,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
}

/// A per-grant allowance snapshot. The `parsed_*` fields are best-effort protobuf decodes and
/// are `None` when parsing fails; `allowance_data` always carries the raw grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeegrantAllowance {
    pub granter: Address,
    pub grantee: Address,
    pub block_height: u64,
    pub block_time_unix_ms: u64,
    pub active: bool,
    pub allowance_data: Value,
    pub parsed_amount: Option<String>,
    pub parsed_denom: Option<String>,
    pub parsed_allowance_type: Option<String>,
    pub parsed_expiration_unix_ms: Option<u64>,
    pub tx_hash: Option<TxHash>,
}

/// Wasm instantiation facts for a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: Address,
    pub code_id: u64,
    pub admin: Option<Address>,
    pub creator: Option<Address>,
    pub label: Option<String>,
    pub instantiated_at_block_height: u64,
    pub instantiated_at_block_time_unix_ms: u64,
    pub tx_hash: Option<TxHash>,
}
