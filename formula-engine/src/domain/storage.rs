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

use indexer_common::domain::{
    BankStateEvent, Block, Contract, Extraction, FeegrantAllowance, WasmStateEvent,
    WasmStateEventTransformation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key pagination for match reads: `gt`/`lt` bound the key range, `limit` caps the result.
/// Results are ordered ascending by key unless only `lt` is given, then descending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPagination {
    pub gt: Option<String>,
    pub lt: Option<String>,
    pub limit: Option<u32>,
}

/// Which side of a grant an address is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeegrantRole {
    Granted,
    Received,
}

/// Translate a single-`*` wildcard pattern into a SQL `LIKE` pattern with `\` escaping.
pub fn pattern_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '\\' => like.push_str("\\\\"),
            '%' => like.push_str("\\%"),
            '_' => like.push_str("\\_"),
            '*' => like.push('%'),
            c => like.push(c),
        }
    }
    like
}

/// Read side of the event store: point-in-time lookups over the append-only log, all bounded by
/// a maximum block height. The query engine only reads; the extract worker owns all writes.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// The latest state event for the key with `block_height <= max_height`.
    async fn latest_state_event(
        &self,
        contract_address: &str,
        key: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEvent>, sqlx::Error>;

    /// The latest state event per key for all keys starting with the prefix.
    async fn latest_state_events_by_prefix(
        &self,
        contract_address: &str,
        key_prefix: &str,
        max_height: u64,
    ) -> Result<Vec<WasmStateEvent>, sqlx::Error>;

    /// The first state event for the key, optionally restricted to values containing
    /// `value_match` (JSONB containment).
    async fn first_state_event(
        &self,
        contract_address: &str,
        key: &str,
        value_match: Option<&Value>,
        max_height: u64,
    ) -> Result<Option<WasmStateEvent>, sqlx::Error>;

    /// The latest transformation with the exact name.
    async fn latest_transformation(
        &self,
        contract_address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEventTransformation>, sqlx::Error>;

    /// The latest transformation per name for names matching the single-`*` wildcard pattern,
    /// optionally across all contracts.
    async fn latest_transformations_matching(
        &self,
        contract_address: Option<&str>,
        name_pattern: &str,
        max_height: u64,
        pagination: &MatchPagination,
    ) -> Result<Vec<WasmStateEventTransformation>, sqlx::Error>;

    /// The first transformation with the exact name.
    async fn first_transformation(
        &self,
        contract_address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEventTransformation>, sqlx::Error>;

    /// The latest extraction with the exact name.
    async fn latest_extraction(
        &self,
        address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<Extraction>, sqlx::Error>;

    /// The latest extraction per name for names matching the single-`*` wildcard pattern.
    async fn latest_extractions_matching(
        &self,
        address: Option<&str>,
        name_pattern: &str,
        max_height: u64,
        pagination: &MatchPagination,
    ) -> Result<Vec<Extraction>, sqlx::Error>;

    /// The first extraction with the exact name.
    async fn first_extraction(
        &self,
        address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<Extraction>, sqlx::Error>;

    /// The contract's instantiation facts.
    async fn get_contract(&self, address: &str) -> Result<Option<Contract>, sqlx::Error>;

    /// The stored block nearest at or below the given height.
    async fn get_block_at_or_below(&self, height: u64) -> Result<Option<Block>, sqlx::Error>;

    /// The latest per-grant snapshot for the pair.
    async fn latest_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
        max_height: u64,
    ) -> Result<Option<FeegrantAllowance>, sqlx::Error>;

    /// The latest per-grant snapshots on the given side of the address, active ones only.
    async fn latest_feegrant_allowances(
        &self,
        address: &str,
        role: FeegrantRole,
        max_height: u64,
    ) -> Result<Vec<FeegrantAllowance>, sqlx::Error>;

    /// The latest balance per denom for the address.
    async fn latest_balances(
        &self,
        address: &str,
        max_height: u64,
    ) -> Result<Vec<BankStateEvent>, sqlx::Error>;

    /// Escape hatch for set-oriented formulas. Each result row is returned as a JSON object;
    /// callers are expected to constrain by block height themselves.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, sqlx::Error>;
}
